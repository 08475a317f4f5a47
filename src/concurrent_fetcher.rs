//! Concurrent stock data fetching module
//!
//! Fans the roster out over a bounded pool of workers. Every stock runs
//! as its own task, so a failure or panic in one never touches the others;
//! all of them share the run's rate limiter.

use anyhow::{bail, Result};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::context::RunContext;
use crate::data_collector::collect_stock;
use crate::models::{DateChunk, FetchResult, FetchTask, StockOutcome};

/// Summary of a whole run, outcomes in completion order
#[derive(Debug, Clone)]
pub struct RunReport {
    pub elapsed: Duration,
    pub api_calls: u64,
    pub outcomes: Vec<StockOutcome>,
}

impl RunReport {
    pub fn total_stocks(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|r| matches!(r, FetchResult::Success { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|r| matches!(r, FetchResult::Skipped { .. }))
    }

    pub fn no_data(&self) -> usize {
        self.count(|r| matches!(r, FetchResult::NoData { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(FetchResult::is_error)
    }

    pub fn total_rows(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o.result {
                FetchResult::Success { rows, .. } => rows,
                _ => 0,
            })
            .sum()
    }

    pub fn outcome(&self, ts_code: &str) -> Option<&FetchResult> {
        self.outcomes
            .iter()
            .find(|o| o.ts_code == ts_code)
            .map(|o| &o.result)
    }

    fn count(&self, predicate: impl Fn(&FetchResult) -> bool) -> usize {
        self.outcomes.iter().filter(|o| predicate(&o.result)).count()
    }
}

/// Fetch every stock in `roster` over `chunks`, at most `ctx.num_workers`
/// at a time. Fails only if there is nothing to fetch; per-stock problems
/// are reported in the returned outcomes.
pub async fn fetch_stocks_concurrently(
    ctx: Arc<RunContext>,
    roster: Vec<String>,
    chunks: Vec<DateChunk>,
) -> Result<RunReport> {
    if chunks.is_empty() {
        bail!("no trading-day chunks to fetch; refusing to start workers");
    }

    let total_stocks = roster.len();
    let num_workers = ctx.num_workers;
    let grants_before = ctx.rate_limiter.total_grants();
    info!("🚀 Starting concurrent fetch of {} stocks with {} workers", total_stocks, num_workers);
    info!(
        "📅 Date range: {} to {} ({} chunks)",
        ctx.params.start_date,
        ctx.params.end_date,
        chunks.len()
    );

    let start = Instant::now();
    let chunks: Arc<[DateChunk]> = Arc::from(chunks);

    let mut results = stream::iter(roster)
        .map(|ts_code| {
            let ctx = Arc::clone(&ctx);
            let task = FetchTask {
                ts_code: ts_code.clone(),
                chunks: Arc::clone(&chunks),
                params: Arc::clone(&ctx.params),
            };

            async move {
                let handle = tokio::spawn(async move { collect_stock(&ctx, &task).await });
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        error!("❌ Task for {} did not complete: {}", ts_code, e);
                        FetchResult::Error {
                            detail: format!("task for {} did not complete: {}", ts_code, e),
                        }
                    }
                };
                StockOutcome { ts_code, result }
            }
        })
        .buffer_unordered(num_workers);

    let mut outcomes = Vec::with_capacity(total_stocks);
    while let Some(outcome) = results.next().await {
        info!("{}/{}: {}", outcomes.len() + 1, total_stocks, outcome);
        outcomes.push(outcome);

        if outcomes.len() % 25 == 0 {
            let failed = outcomes.iter().filter(|o| o.result.is_error()).count();
            info!(
                "📊 Progress: {}/{} stocks finished, {} failed",
                outcomes.len(),
                total_stocks,
                failed
            );
        }
    }

    let report = RunReport {
        elapsed: start.elapsed(),
        api_calls: ctx.rate_limiter.total_grants() - grants_before,
        outcomes,
    };

    info!("✅ Concurrent fetch completed in {:.2?}", report.elapsed);
    info!(
        "📊 Results: {} saved, {} skipped, {} without data, {} failed, {} rows written",
        report.succeeded(),
        report.skipped(),
        report.no_data(),
        report.failed(),
        report.total_rows()
    );

    Ok(report)
}
