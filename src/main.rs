use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rust_minute_bars::api::{SlidingWindowRateLimiter, TushareClient};
use rust_minute_bars::calendar::load_trade_date_chunks;
use rust_minute_bars::concurrent_fetcher::fetch_stocks_concurrently;
use rust_minute_bars::context::RunContext;
use rust_minute_bars::models::{
    parse_date, split_list, Adjustment, Config, FetchSettings, Frequency,
};
use rust_minute_bars::roster::{load_roster, parse_stock_list};
use rust_minute_bars::storage::ArtifactStore;

/// Bulk minute-bar downloader
#[derive(Parser, Debug)]
#[command(name = "rust-minute-bars")]
#[command(version = "0.1.0")]
#[command(about = "Download historical bars for a roster of stocks, one CSV per stock")]
#[command(long_about = "
Fetches historical bars for every stock in the roster from the Tushare Pro API.
Each stock's date range is split into chunks of trading days, stocks are fetched
concurrently under a shared rate limit, and each stock ends up as one sorted,
de-duplicated CSV. Stocks whose CSV already exists are skipped, so an
interrupted run can simply be restarted.

Settings default to environment variables (see .env), which the flags override.

Examples:
  cargo run -- --stocks 000001.SZ,600000.SH
  cargo run -- -s 20240101 -e 20241231 --freq 5min --workers 4
")]
struct Args {
    /// Comma-separated stock codes, bypassing the roster file
    #[arg(long)]
    stocks: Option<String>,

    /// Start date in YYYYMMDD format
    #[arg(long, short = 's')]
    start_date: Option<String>,

    /// End date in YYYYMMDD format
    #[arg(long, short = 'e')]
    end_date: Option<String>,

    /// Bar frequency: 1min, 5min, 15min, 30min, 60min or D
    #[arg(long)]
    freq: Option<Frequency>,

    /// Price adjustment: none, qfq or hfq
    #[arg(long)]
    adj: Option<Adjustment>,

    /// Directory receiving one CSV per stock
    #[arg(long, short = 'o')]
    output_dir: Option<PathBuf>,

    /// Roster CSV file
    #[arg(long, short = 'i')]
    input_file: Option<PathBuf>,

    /// Column of the roster file holding stock codes
    #[arg(long)]
    roster_column: Option<String>,

    /// Number of stocks fetched concurrently
    #[arg(long, short = 'w')]
    workers: Option<usize>,

    /// API calls allowed per rate-limit period
    #[arg(long)]
    calls_per_period: Option<usize>,

    /// Rate-limit period in seconds
    #[arg(long)]
    period_secs: Option<u64>,

    /// Exchange whose trading calendar drives chunking
    #[arg(long)]
    exchange: Option<String>,

    /// Trading days per request
    #[arg(long)]
    chunk_days: Option<usize>,

    /// Timestamp columns to sort by, in priority order (comma-separated)
    #[arg(long)]
    timestamp_columns: Option<String>,

    /// Only process the first N stocks of the roster
    #[arg(long)]
    limit: Option<usize>,
}

impl Args {
    fn apply(self, settings: &mut FetchSettings) -> Result<()> {
        if let Some(raw) = self.start_date {
            settings.start_date = parse_date("--start-date", &raw)?;
        }
        if let Some(raw) = self.end_date {
            settings.end_date = parse_date("--end-date", &raw)?;
        }
        if let Some(freq) = self.freq {
            settings.freq = freq;
        }
        if let Some(adj) = self.adj {
            settings.adj = adj;
        }
        if let Some(dir) = self.output_dir {
            settings.output_dir = dir;
        }
        if let Some(file) = self.input_file {
            settings.input_file = file;
        }
        if let Some(column) = self.roster_column {
            settings.roster_column = column;
        }
        if let Some(workers) = self.workers {
            settings.num_workers = workers;
        }
        if let Some(calls) = self.calls_per_period {
            settings.rate_limit_calls = calls;
        }
        if let Some(secs) = self.period_secs {
            settings.rate_limit_period = std::time::Duration::from_secs(secs);
        }
        if let Some(exchange) = self.exchange {
            settings.exchange = exchange;
        }
        if let Some(days) = self.chunk_days {
            settings.chunk_days = days;
        }
        if let Some(raw) = self.timestamp_columns {
            settings.timestamp_columns = split_list(&raw);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rust_minute_bars=info")),
        )
        .init();

    let args = Args::parse();
    let stocks_override = args.stocks.clone();
    let limit = args.limit;

    let config = Config::from_env()
        .context("Make sure TUSHARE_TOKEN is set in the environment or a .env file")?;
    let mut settings = FetchSettings::from_env()?;
    args.apply(&mut settings)?;
    settings.validate()?;

    let mut roster = match stocks_override {
        Some(raw) => {
            let codes = parse_stock_list(&raw);
            info!("📋 Using {} stock codes from --stocks", codes.len());
            codes
        }
        None => load_roster(&settings.input_file, &settings.roster_column)?,
    };
    if let Some(limit) = limit {
        roster.truncate(limit);
        info!("🔢 Limiting to {} stocks", roster.len());
    }
    if roster.is_empty() {
        bail!("No stock codes to process");
    }

    let store = ArtifactStore::new(&settings.output_dir);
    store.ensure_output_dir()?;

    let rate_limiter = Arc::new(SlidingWindowRateLimiter::new(
        settings.rate_limit_calls,
        settings.rate_limit_period,
    ));
    let client = TushareClient::new(&config, Arc::clone(&rate_limiter))?;

    let ctx = Arc::new(RunContext::new(
        Arc::new(client),
        rate_limiter,
        store,
        settings.fetch_params(),
        settings.timestamp_columns.clone(),
        settings.num_workers,
    ));

    info!(
        "⚙️  {} to {}, freq {}, adj {}, {} workers, {} calls per {:?}",
        settings.start_date,
        settings.end_date,
        settings.freq,
        settings.adj,
        settings.num_workers,
        settings.rate_limit_calls,
        settings.rate_limit_period
    );

    let chunks = match load_trade_date_chunks(&ctx, &settings.exchange, settings.chunk_days).await {
        Ok(chunks) => chunks,
        Err(e) => {
            error!("Cannot build trading-day chunks: {:#}", e);
            return Err(e);
        }
    };

    let report = fetch_stocks_concurrently(Arc::clone(&ctx), roster, chunks).await?;

    for outcome in &report.outcomes {
        println!("{}", outcome);
    }
    println!();
    println!(
        "Done: {} stocks ({} saved, {} skipped, {} without data, {} failed), {} rows, {} API calls",
        report.total_stocks(),
        report.succeeded(),
        report.skipped(),
        report.no_data(),
        report.failed(),
        report.total_rows(),
        report.api_calls
    );
    println!("Total time: {:.2} seconds", report.elapsed.as_secs_f64());

    Ok(())
}
