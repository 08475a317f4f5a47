use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{BarRequest, MarketDataProvider, ProviderError, SlidingWindowRateLimiter};
use crate::bars::BarTable;
use crate::models::{Adjustment, Config, Frequency, TradingDay, DATE_FORMAT};

/// Columns rescaled when an adjustment mode is requested
const PRICE_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "pre_close"];

/// Body of a Tushare Pro gateway request
#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    api_name: &'a str,
    token: &'a str,
    params: Value,
    fields: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<ApiData>,
}

#[derive(Debug, Deserialize)]
struct ApiData {
    fields: Vec<String>,
    #[serde(default)]
    items: Vec<Vec<Value>>,
}

/// Tushare Pro API client
pub struct TushareClient {
    client: Client,
    token: String,
    api_url: String,
    // Only used for the auxiliary adjustment-factor request
    rate_limiter: Arc<SlidingWindowRateLimiter>,
}

impl TushareClient {
    /// Create a new Tushare client
    pub fn new(config: &Config, rate_limiter: Arc<SlidingWindowRateLimiter>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent("rust-minute-bars/1.0")
            .build()?;

        Ok(Self {
            client,
            token: config.tushare_token.clone(),
            api_url: config.api_url.clone(),
            rate_limiter,
        })
    }

    /// Call one gateway API and return its table
    async fn query(
        &self,
        api_name: &str,
        params: Value,
        fields: &str,
    ) -> Result<BarTable, ProviderError> {
        let body = ApiRequest {
            api_name,
            token: &self.token,
            params,
            fields,
        };

        debug!("Making {} request to {}", api_name, self.api_url);

        let http_error = |source: reqwest::Error| ProviderError::Http {
            api: api_name.to_string(),
            source,
        };

        let response = self
            .client
            .post(&self.api_url)
            .json(&body)
            .send()
            .await
            .map_err(http_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                api: api_name.to_string(),
                status,
                body,
            });
        }

        let payload: ApiResponse = response.json().await.map_err(http_error)?;

        if payload.code != 0 {
            return Err(ProviderError::Api {
                api: api_name.to_string(),
                code: payload.code,
                msg: payload.msg.unwrap_or_default(),
            });
        }

        let data = payload.data.ok_or_else(|| ProviderError::Malformed {
            api: api_name.to_string(),
            message: "response has no data section".to_string(),
        })?;

        // Every later lookup indexes rows by field position
        let width = data.fields.len();
        let short_row = data.items.iter().enumerate().find(|(_, item)| item.len() != width);
        if let Some((row, item)) = short_row {
            return Err(ProviderError::Malformed {
                api: api_name.to_string(),
                message: format!("row {} has {} cells, expected {}", row, item.len(), width),
            });
        }

        let rows = data
            .items
            .into_iter()
            .map(|item| item.iter().map(cell_text).collect())
            .collect();

        Ok(BarTable::new(data.fields, rows))
    }

    async fn get_adj_factors(
        &self,
        ts_code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<BTreeMap<String, f64>, ProviderError> {
        self.rate_limiter.acquire().await;

        let params = json!({
            "ts_code": ts_code,
            "start_date": start_date.format(DATE_FORMAT).to_string(),
            "end_date": end_date.format(DATE_FORMAT).to_string(),
        });
        let table = self.query("adj_factor", params, "trade_date,adj_factor").await?;

        let malformed = |message: String| ProviderError::Malformed {
            api: "adj_factor".to_string(),
            message,
        };
        let date_idx = table
            .column_index("trade_date")
            .ok_or_else(|| malformed("missing trade_date column".to_string()))?;
        let factor_idx = table
            .column_index("adj_factor")
            .ok_or_else(|| malformed("missing adj_factor column".to_string()))?;

        let mut factors = BTreeMap::new();
        for row in &table.rows {
            let raw = &row[factor_idx];
            let factor: f64 = raw
                .parse()
                .map_err(|_| malformed(format!("adj_factor '{}' is not a number", raw)))?;
            factors.insert(row[date_idx].clone(), factor);
        }

        Ok(factors)
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for TushareClient {
    async fn get_trading_calendar(
        &self,
        exchange: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<TradingDay>> {
        let params = json!({
            "exchange": exchange,
            "start_date": start_date.format(DATE_FORMAT).to_string(),
            "end_date": end_date.format(DATE_FORMAT).to_string(),
        });
        let table = self.query("trade_cal", params, "cal_date,is_open").await?;

        let date_idx = table
            .column_index("cal_date")
            .context("trade_cal response has no cal_date column")?;
        let open_idx = table
            .column_index("is_open")
            .context("trade_cal response has no is_open column")?;

        let days = table
            .rows
            .iter()
            .map(|row| -> Result<TradingDay> {
                let cal_date = NaiveDate::parse_from_str(&row[date_idx], DATE_FORMAT)
                    .with_context(|| format!("invalid cal_date '{}'", row[date_idx]))?;
                let is_open = matches!(row[open_idx].trim(), "1" | "1.0" | "true");
                Ok(TradingDay { cal_date, is_open })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "Retrieved {} calendar days for {} from {} to {}",
            days.len(),
            exchange,
            start_date,
            end_date
        );
        Ok(days)
    }

    async fn get_bar_series(&self, request: &BarRequest) -> Result<Option<BarTable>> {
        let (api_name, params) = bar_query(request);
        let mut table = self.query(api_name, params, "").await?;

        if table.is_empty() {
            debug!(
                "No bars for {} from {} to {}",
                request.ts_code, request.start_date, request.end_date
            );
            return Ok(None);
        }

        if request.adj != Adjustment::None {
            let factors = self
                .get_adj_factors(&request.ts_code, request.start_date, request.end_date)
                .await?;
            apply_adjustment(&mut table, &factors, request)?;
        }

        debug!(
            "Retrieved {} bars for {} from {} to {}",
            table.len(),
            request.ts_code,
            request.start_date,
            request.end_date
        );
        Ok(Some(table))
    }
}

/// Pick the gateway API and parameters for a bar request
fn bar_query(request: &BarRequest) -> (&'static str, Value) {
    let mut params = Map::new();
    params.insert("ts_code".to_string(), json!(request.ts_code));

    if request.freq == Frequency::Daily {
        let start = request.start_date.format(DATE_FORMAT).to_string();
        let end = request.end_date.format(DATE_FORMAT).to_string();
        params.insert("start_date".to_string(), json!(start));
        params.insert("end_date".to_string(), json!(end));
        ("daily", Value::Object(params))
    } else {
        params.insert("freq".to_string(), json!(request.freq.as_str()));
        params.insert(
            "start_date".to_string(),
            json!(format!("{} 09:00:00", request.start_date.format("%Y-%m-%d"))),
        );
        params.insert(
            "end_date".to_string(),
            json!(format!("{} 19:00:00", request.end_date.format("%Y-%m-%d"))),
        );
        ("stk_mins", Value::Object(params))
    }
}

/// Rescale price columns by the per-day adjustment factor.
/// `hfq` multiplies by the row's factor, `qfq` additionally divides by the
/// latest factor in the range.
fn apply_adjustment(
    table: &mut BarTable,
    factors: &BTreeMap<String, f64>,
    request: &BarRequest,
) -> Result<(), ProviderError> {
    let missing = || ProviderError::MissingAdjFactor {
        ts_code: request.ts_code.clone(),
        start_date: request.start_date,
        end_date: request.end_date,
    };

    let latest = *factors.values().next_back().ok_or_else(missing)?;
    let price_columns: Vec<usize> = PRICE_COLUMNS
        .iter()
        .filter_map(|name| table.column_index(name))
        .collect();
    let date_idx = table.column_index("trade_date");
    let time_idx = table.column_index("trade_time");

    for row in &mut table.rows {
        let trade_date = match (date_idx, time_idx) {
            (Some(i), _) => row[i].clone(),
            (None, Some(i)) => row[i].chars().take(10).filter(|c| *c != '-').collect(),
            (None, None) => {
                return Err(ProviderError::Malformed {
                    api: "bars".to_string(),
                    message: "no trade_date or trade_time column to match adjustment factors"
                        .to_string(),
                })
            }
        };

        let factor = factor_for(factors, &trade_date).ok_or_else(missing)?;
        let scale = match request.adj {
            Adjustment::Hfq => factor,
            Adjustment::Qfq => factor / latest,
            Adjustment::None => 1.0,
        };

        for &idx in &price_columns {
            if let Ok(price) = row[idx].parse::<f64>() {
                row[idx] = format!("{:.2}", price * scale);
            }
        }
    }

    Ok(())
}

/// Exact date, else nearest earlier factor, else nearest later one
fn factor_for(factors: &BTreeMap<String, f64>, trade_date: &str) -> Option<f64> {
    factors
        .range(..=trade_date.to_string())
        .next_back()
        .or_else(|| factors.range(trade_date.to_string()..).next())
        .map(|(_, factor)| *factor)
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
