use anyhow::Result;
use chrono::NaiveDate;
use thiserror::Error;

use crate::bars::BarTable;
use crate::models::{Adjustment, Frequency, TradingDay};

pub mod rate_limiter;
pub mod tushare_client;

pub use rate_limiter::SlidingWindowRateLimiter;
pub use tushare_client::TushareClient;

/// Parameters of a single bar-series request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarRequest {
    pub ts_code: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub freq: Frequency,
    pub adj: Adjustment,
}

/// Errors raised by a market data provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request to {api} failed: {source}")]
    Http {
        api: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{api} returned HTTP status {status}: {body}")]
    Status {
        api: String,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("{api} returned error code {code}: {msg}")]
    Api { api: String, code: i64, msg: String },
    #[error("malformed {api} response: {message}")]
    Malformed { api: String, message: String },
    #[error("no adjustment factor available for {ts_code} between {start_date} and {end_date}")]
    MissingAdjFactor {
        ts_code: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
    },
}

/// Remote source of trading calendars and bar series.
///
/// Implementations make remote calls but never rate limit the primary
/// request themselves; callers acquire a slot before every call.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn get_trading_calendar(
        &self,
        exchange: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<TradingDay>>;

    /// `Ok(None)` means the provider had nothing for this range
    async fn get_bar_series(&self, request: &BarRequest) -> Result<Option<BarTable>>;
}
