use chrono::NaiveDate;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Date format used on the wire, on the command line and in artifact names
pub const DATE_FORMAT: &str = "%Y%m%d";

/// One calendar entry from the exchange's trading calendar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradingDay {
    pub cal_date: NaiveDate,
    pub is_open: bool,
}

/// Contiguous run of trading days fetched with a single remote call.
/// Both ends are inclusive and both are open trading days.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateChunk {
    pub chunk_number: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub trading_days: usize,
}

impl DateChunk {
    pub fn description(&self) -> String {
        format!(
            "Chunk {}: {} to {} ({} trading days)",
            self.chunk_number, self.start_date, self.end_date, self.trading_days
        )
    }
}

/// Bar frequency understood by the data provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frequency {
    Min1,
    Min5,
    Min15,
    Min30,
    Min60,
    Daily,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Min1 => "1min",
            Frequency::Min5 => "5min",
            Frequency::Min15 => "15min",
            Frequency::Min30 => "30min",
            Frequency::Min60 => "60min",
            Frequency::Daily => "D",
        }
    }

    pub fn is_intraday(&self) -> bool {
        !matches!(self, Frequency::Daily)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1min" => Ok(Frequency::Min1),
            "5min" => Ok(Frequency::Min5),
            "15min" => Ok(Frequency::Min15),
            "30min" => Ok(Frequency::Min30),
            "60min" => Ok(Frequency::Min60),
            "d" | "daily" => Ok(Frequency::Daily),
            other => Err(ConfigError::Invalid {
                key: "FREQ".to_string(),
                message: format!(
                    "unknown frequency '{}' (expected 1min, 5min, 15min, 30min, 60min or D)",
                    other
                ),
            }),
        }
    }
}

/// Price adjustment convention applied to returned bars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Adjustment {
    None,
    /// Forward-adjusted (前复权)
    Qfq,
    /// Backward-adjusted (后复权)
    Hfq,
}

impl Adjustment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Adjustment::None => "none",
            Adjustment::Qfq => "qfq",
            Adjustment::Hfq => "hfq",
        }
    }
}

impl fmt::Display for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Adjustment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Adjustment::None),
            "qfq" => Ok(Adjustment::Qfq),
            "hfq" => Ok(Adjustment::Hfq),
            other => Err(ConfigError::Invalid {
                key: "ADJ".to_string(),
                message: format!("unknown adjustment '{}' (expected none, qfq or hfq)", other),
            }),
        }
    }
}

/// Fixed per-run request parameters shared by every stock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchParams {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub freq: Frequency,
    pub adj: Adjustment,
}

/// Work item handed to one worker: a stock plus the shared chunk plan
#[derive(Debug, Clone)]
pub struct FetchTask {
    pub ts_code: String,
    pub chunks: Arc<[DateChunk]>,
    pub params: Arc<FetchParams>,
}

/// Outcome of fetching one stock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    Success { rows: usize, path: PathBuf },
    Skipped { path: PathBuf },
    NoData { reason: String },
    Error { detail: String },
}

impl FetchResult {
    pub fn is_error(&self) -> bool {
        matches!(self, FetchResult::Error { .. })
    }
}

/// A stock code paired with its fetch outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockOutcome {
    pub ts_code: String,
    pub result: FetchResult,
}

impl fmt::Display for StockOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            FetchResult::Success { rows, path } => {
                write!(f, "Success: {} ({} rows -> {})", self.ts_code, rows, path.display())
            }
            FetchResult::Skipped { path } => {
                write!(f, "Skipped: {} (already persisted at {})", self.ts_code, path.display())
            }
            FetchResult::NoData { reason } => write!(f, "No data: {} ({})", self.ts_code, reason),
            FetchResult::Error { detail } => write!(f, "Error: {}: {}", self.ts_code, detail),
        }
    }
}

/// Configuration errors, all fatal for the run
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable required")]
    Missing(String),
    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

/// Credentials and transport settings for the data provider
#[derive(Debug, Clone)]
pub struct Config {
    pub tushare_token: String,
    pub api_url: String,
    pub request_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let tushare_token = std::env::var("TUSHARE_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing("TUSHARE_TOKEN".to_string()))?;

        Ok(Config {
            tushare_token,
            api_url: std::env::var("TUSHARE_API_URL")
                .unwrap_or_else(|_| "http://api.tushare.pro".to_string()),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30)?,
        })
    }
}

/// Everything that shapes a collection run apart from credentials
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub freq: Frequency,
    pub adj: Adjustment,
    pub output_dir: PathBuf,
    pub input_file: PathBuf,
    pub roster_column: String,
    pub num_workers: usize,
    pub rate_limit_calls: usize,
    pub rate_limit_period: Duration,
    pub exchange: String,
    pub chunk_days: usize,
    pub timestamp_columns: Vec<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2024, 10, 31).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2025, 10, 31).unwrap_or_default(),
            freq: Frequency::Min1,
            adj: Adjustment::Qfq,
            output_dir: PathBuf::from("stock_data"),
            input_file: PathBuf::from("stock_basic_listed.csv"),
            roster_column: "ts_code".to_string(),
            num_workers: 8,
            rate_limit_calls: 500,
            rate_limit_period: Duration::from_secs(60),
            exchange: "SSE".to_string(),
            chunk_days: 20,
            timestamp_columns: vec![
                "trade_time".to_string(),
                "datetime".to_string(),
                "trade_date".to_string(),
            ],
        }
    }
}

impl FetchSettings {
    /// Defaults overridden by whatever is set in the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let settings = Self {
            start_date: env_date_or("START_DATE", defaults.start_date)?,
            end_date: env_date_or("END_DATE", defaults.end_date)?,
            freq: env_or("FREQ", defaults.freq)?,
            adj: env_or("ADJ", defaults.adj)?,
            output_dir: std::env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            input_file: std::env::var("INPUT_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.input_file),
            roster_column: std::env::var("ROSTER_COLUMN").unwrap_or(defaults.roster_column),
            num_workers: env_or("MAX_WORKERS", defaults.num_workers)?,
            rate_limit_calls: env_or("API_CALLS_PER_PERIOD", defaults.rate_limit_calls)?,
            rate_limit_period: Duration::from_secs(env_or(
                "RATE_LIMIT_PERIOD_SECS",
                defaults.rate_limit_period.as_secs(),
            )?),
            exchange: std::env::var("TRADE_CAL_EXCHANGE").unwrap_or(defaults.exchange),
            chunk_days: env_or("TRADE_CAL_CHUNK_DAYS", defaults.chunk_days)?,
            timestamp_columns: std::env::var("TIMESTAMP_COLUMNS")
                .map(|raw| split_list(&raw))
                .unwrap_or(defaults.timestamp_columns),
        };

        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_date > self.end_date {
            return Err(invalid("START_DATE", format!(
                "start date {} is after end date {}",
                self.start_date, self.end_date
            )));
        }
        if self.num_workers == 0 {
            return Err(invalid("MAX_WORKERS", "worker count must be at least 1"));
        }
        if self.rate_limit_calls == 0 {
            return Err(invalid("API_CALLS_PER_PERIOD", "rate limit capacity must be at least 1"));
        }
        if self.rate_limit_period.is_zero() {
            return Err(invalid("RATE_LIMIT_PERIOD_SECS", "rate limit period must be positive"));
        }
        if self.chunk_days == 0 {
            return Err(invalid("TRADE_CAL_CHUNK_DAYS", "chunk size must be at least 1"));
        }
        if self.timestamp_columns.is_empty() {
            return Err(invalid("TIMESTAMP_COLUMNS", "at least one timestamp column is required"));
        }
        Ok(())
    }

    pub fn fetch_params(&self) -> FetchParams {
        FetchParams {
            start_date: self.start_date,
            end_date: self.end_date,
            freq: self.freq,
            adj: self.adj,
        }
    }
}

/// Parse a `YYYYMMDD` date
pub fn parse_date(key: &str, value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|e| invalid(key, format!("'{}' is not a YYYYMMDD date: {}", value, e)))
}

/// Split a comma-separated list, trimming entries and dropping blanks
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        message: message.into(),
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| invalid(key, e.to_string())),
        Err(_) => Ok(default),
    }
}

fn env_date_or(key: &str, default: NaiveDate) -> Result<NaiveDate, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => parse_date(key, &raw),
        Err(_) => Ok(default),
    }
}
