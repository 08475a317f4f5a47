//! Trading-calendar chunking: split the open days of a date range into
//! contiguous runs of at most `chunk_days` trading days each.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use tracing::info;

use crate::context::RunContext;
use crate::models::{DateChunk, TradingDay};

/// Split the open days of `calendar` into ordered chunks of at most
/// `chunk_days` days. Dates are sorted and de-duplicated first, so the
/// chunks together cover every open date exactly once. The last chunk may
/// be shorter.
pub fn chunk_trading_days(calendar: &[TradingDay], chunk_days: usize) -> Vec<DateChunk> {
    let mut open_dates: Vec<NaiveDate> = calendar
        .iter()
        .filter(|day| day.is_open)
        .map(|day| day.cal_date)
        .collect();
    open_dates.sort_unstable();
    open_dates.dedup();

    open_dates
        .chunks(chunk_days.max(1))
        .enumerate()
        .filter_map(|(i, dates)| {
            Some(DateChunk {
                chunk_number: i + 1,
                start_date: *dates.first()?,
                end_date: *dates.last()?,
                trading_days: dates.len(),
            })
        })
        .collect()
}

/// Fetch the exchange calendar through the shared rate limiter and chunk it.
/// An empty result is fatal for the run: nothing can be fetched without it.
pub async fn load_trade_date_chunks(
    ctx: &RunContext,
    exchange: &str,
    chunk_days: usize,
) -> Result<Vec<DateChunk>> {
    let params = &ctx.params;

    ctx.rate_limiter.acquire().await;
    let calendar = ctx
        .provider
        .get_trading_calendar(exchange, params.start_date, params.end_date)
        .await
        .with_context(|| {
            format!(
                "failed to load {} trading calendar from {} to {}",
                exchange, params.start_date, params.end_date
            )
        })?;

    let chunks = chunk_trading_days(&calendar, chunk_days);
    if chunks.is_empty() {
        bail!(
            "no open trading days on {} between {} and {}",
            exchange,
            params.start_date,
            params.end_date
        );
    }

    let open_days: usize = chunks.iter().map(|c| c.trading_days).sum();
    info!(
        "📅 {} calendar: {} open days in {} chunks of up to {} days",
        exchange,
        open_days,
        chunks.len(),
        chunk_days
    );

    Ok(chunks)
}
