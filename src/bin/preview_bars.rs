//! Fetch one stock's bars in a single request and print the first rows

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use rust_minute_bars::api::{
    BarRequest, MarketDataProvider, SlidingWindowRateLimiter, TushareClient,
};
use rust_minute_bars::models::{parse_date, Adjustment, Config, Frequency};
use rust_minute_bars::storage::write_csv_atomic;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Stock code, e.g. 002602.SZ
    #[arg(long)]
    stock: String,

    /// Start date in YYYYMMDD format
    #[arg(short, long)]
    start_date: String,

    /// End date in YYYYMMDD format
    #[arg(short, long)]
    end_date: String,

    #[arg(long, default_value = "1min")]
    freq: Frequency,

    #[arg(long, default_value = "qfq")]
    adj: Adjustment,

    /// Number of rows to print
    #[arg(long, default_value_t = 10)]
    rows: usize,

    /// Also save the bars to this CSV file
    #[arg(long)]
    out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::from_env()?;
    // Adjustment factors are a second call; allow both right away
    let rate_limiter = Arc::new(SlidingWindowRateLimiter::new(2, Duration::from_secs(60)));
    let client = TushareClient::new(&config, Arc::clone(&rate_limiter))?;

    let request = BarRequest {
        ts_code: args.stock.clone(),
        start_date: parse_date("--start-date", &args.start_date)?,
        end_date: parse_date("--end-date", &args.end_date)?,
        freq: args.freq,
        adj: args.adj,
    };

    info!(
        "📈 Fetching {} {} bars ({}) from {} to {}",
        request.ts_code, request.freq, request.adj, request.start_date, request.end_date
    );

    rate_limiter.acquire().await;
    let Some(table) = client.get_bar_series(&request).await? else {
        println!("No bars returned for {}", request.ts_code);
        return Ok(());
    };

    println!("{}", table.columns.join(" | "));
    for row in table.rows.iter().take(args.rows) {
        println!("{}", row.join(" | "));
    }
    println!("... {} rows total", table.len());

    if let Some(out) = args.out {
        write_csv_atomic(&out, &table)?;
        info!("✅ Saved {} rows to {}", table.len(), out.display());
    }

    Ok(())
}
