//! Per-stock collection: skip if already persisted, fetch every chunk
//! through the shared rate limiter, merge, sort, de-duplicate and write.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::api::BarRequest;
use crate::bars::BarTable;
use crate::context::RunContext;
use crate::models::{DateChunk, FetchResult, FetchTask};

/// Collect one stock. Never returns an error: failures become
/// `FetchResult::Error` carrying the stock code and the cause chain.
pub async fn collect_stock(ctx: &RunContext, task: &FetchTask) -> FetchResult {
    match try_collect_stock(ctx, task).await {
        Ok(result) => result,
        Err(e) => {
            let detail = format!("{:#}", e);
            warn!("❌ {} failed: {}", task.ts_code, detail);
            FetchResult::Error { detail }
        }
    }
}

async fn try_collect_stock(ctx: &RunContext, task: &FetchTask) -> Result<FetchResult> {
    let ts_code = task.ts_code.as_str();
    let params = task.params.as_ref();

    let path = ctx.store.artifact_path(ts_code, params);
    if path.is_file() {
        info!("⏭️  {} already persisted at {}, skipping", ts_code, path.display());
        return Ok(FetchResult::Skipped { path });
    }

    if task.chunks.is_empty() {
        return Ok(FetchResult::NoData {
            reason: "no trading-day chunks to fetch".to_string(),
        });
    }

    info!("🔄 Fetching {} ({} chunks)", ts_code, task.chunks.len());

    // Any error here drops everything fetched so far
    let frames = fetch_chunks(ctx, task).await?;

    if frames.is_empty() {
        info!("⚪ {} has no data between {} and {}", ts_code, params.start_date, params.end_date);
        return Ok(FetchResult::NoData {
            reason: format!("no bars between {} and {}", params.start_date, params.end_date),
        });
    }

    let mut merged = BarTable::concat(frames);
    let sort_column = merged
        .sort_by_first_present(&ctx.timestamp_columns)
        .with_context(|| format!("cannot order bars for {}", ts_code))?;
    let duplicates = merged.dedup_rows();
    debug!(
        "{}: sorted by {}, dropped {} duplicate rows, {} rows remain",
        ts_code,
        sort_column,
        duplicates,
        merged.len()
    );

    let path = ctx
        .store
        .write_atomic(ts_code, params, &merged)
        .with_context(|| format!("failed to persist {}", ts_code))?;

    info!("✅ Saved {} rows for {} to {}", merged.len(), ts_code, path.display());
    Ok(FetchResult::Success {
        rows: merged.len(),
        path,
    })
}

/// Fetch the chunks strictly in order, one rate-limited call each.
/// Empty chunks are dropped; the first failing chunk aborts the stock.
async fn fetch_chunks(ctx: &RunContext, task: &FetchTask) -> Result<Vec<BarTable>> {
    let mut frames = Vec::new();
    let total = task.chunks.len();

    for chunk in task.chunks.iter() {
        let request = chunk_request(task, chunk);

        ctx.rate_limiter.acquire().await;
        let bars = ctx
            .provider
            .get_bar_series(&request)
            .await
            .with_context(|| {
                format!(
                    "{} chunk {}/{} ({} to {})",
                    task.ts_code, chunk.chunk_number, total, chunk.start_date, chunk.end_date
                )
            })?;

        match bars {
            Some(table) if !table.is_empty() => {
                let rows = table.len();
                debug!("{} chunk {}/{}: {} rows", task.ts_code, chunk.chunk_number, total, rows);
                frames.push(table);
            }
            _ => debug!("{} chunk {}/{}: no rows", task.ts_code, chunk.chunk_number, total),
        }
    }

    Ok(frames)
}

fn chunk_request(task: &FetchTask, chunk: &DateChunk) -> BarRequest {
    BarRequest {
        ts_code: task.ts_code.clone(),
        start_date: chunk.start_date,
        end_date: chunk.end_date,
        freq: task.params.freq,
        adj: task.params.adj,
    }
}
