//! Tushare client tests against a mock HTTP gateway

use assert_matches::assert_matches;
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rust_minute_bars::api::{
    BarRequest, MarketDataProvider, ProviderError, SlidingWindowRateLimiter, TushareClient,
};
use rust_minute_bars::models::{Adjustment, Config, Frequency};

fn client(server: &MockServer) -> (TushareClient, Arc<SlidingWindowRateLimiter>) {
    let config = Config {
        tushare_token: "test-token".to_string(),
        api_url: server.uri(),
        request_timeout_secs: 5,
    };
    let limiter = Arc::new(SlidingWindowRateLimiter::new(100, Duration::from_secs(60)));
    let client = TushareClient::new(&config, Arc::clone(&limiter)).unwrap();
    (client, limiter)
}

fn minute_request(adj: Adjustment) -> BarRequest {
    BarRequest {
        ts_code: "002602.SZ".to_string(),
        start_date: NaiveDate::from_ymd_opt(2025, 10, 30).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2025, 10, 31).unwrap(),
        freq: Frequency::Min1,
        adj,
    }
}

fn minute_bars_response() -> serde_json::Value {
    json!({
        "code": 0,
        "msg": "",
        "data": {
            "fields": ["ts_code", "trade_time", "open", "close", "vol"],
            "items": [
                ["002602.SZ", "2025-10-31 09:31:00", 20.0, 20.4, 1200.0],
                ["002602.SZ", "2025-10-30 09:31:00", 10.0, 10.2, 900.0]
            ]
        }
    })
}

#[test_log::test(tokio::test)]
async fn test_trading_calendar_is_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "api_name": "trade_cal",
            "token": "test-token",
            "params": {"exchange": "SSE", "start_date": "20251031", "end_date": "20251103"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msg": null,
            "data": {
                "fields": ["cal_date", "is_open"],
                "items": [["20251031", 1], ["20251101", 0], ["20251102", 0], ["20251103", 1]]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = client(&server);
    let days = client
        .get_trading_calendar(
            "SSE",
            NaiveDate::from_ymd_opt(2025, 10, 31).unwrap(),
            NaiveDate::from_ymd_opt(2025, 11, 3).unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(days.len(), 4);
    assert_eq!(
        days.iter().filter(|d| d.is_open).map(|d| d.cal_date).collect::<Vec<_>>(),
        vec![
            NaiveDate::from_ymd_opt(2025, 10, 31).unwrap(),
            NaiveDate::from_ymd_opt(2025, 11, 3).unwrap(),
        ]
    );
}

#[test_log::test(tokio::test)]
async fn test_minute_bars_without_adjustment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "api_name": "stk_mins",
            "params": {
                "ts_code": "002602.SZ",
                "freq": "1min",
                "start_date": "2025-10-30 09:00:00",
                "end_date": "2025-10-31 19:00:00"
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(minute_bars_response()))
        .expect(1)
        .mount(&server)
        .await;

    let (client, limiter) = client(&server);
    let table = client
        .get_bar_series(&minute_request(Adjustment::None))
        .await
        .unwrap()
        .expect("bars expected");

    assert_eq!(table.columns, vec!["ts_code", "trade_time", "open", "close", "vol"]);
    assert_eq!(table.len(), 2);
    assert_eq!(table.rows[0][1], "2025-10-31 09:31:00");
    assert_eq!(table.rows[0][3], "20.4");
    // The caller owns the bar request's slot
    assert_eq!(limiter.total_grants(), 0);
}

#[test_log::test(tokio::test)]
async fn test_forward_adjustment_fetches_factors_under_the_limiter() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"api_name": "stk_mins"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(minute_bars_response()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "api_name": "adj_factor",
            "params": {"ts_code": "002602.SZ", "start_date": "20251030", "end_date": "20251031"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {
                "fields": ["trade_date", "adj_factor"],
                "items": [["20251030", 1.0], ["20251031", 2.0]]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, limiter) = client(&server);
    let table = client
        .get_bar_series(&minute_request(Adjustment::Qfq))
        .await
        .unwrap()
        .expect("bars expected");

    assert_eq!(limiter.total_grants(), 1);
    // Latest day keeps its price, the earlier one is halved
    assert_eq!(table.rows[0][3], "20.40");
    assert_eq!(table.rows[1][2], "5.00");
    assert_eq!(table.rows[1][3], "5.10");
    assert_eq!(table.rows[1][4], "900.0");
}

#[test_log::test(tokio::test)]
async fn test_empty_items_mean_no_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msg": "",
            "data": {"fields": ["ts_code", "trade_time", "close"], "items": []}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, limiter) = client(&server);
    let result = client.get_bar_series(&minute_request(Adjustment::Qfq)).await.unwrap();

    assert!(result.is_none());
    // No factors requested for an empty chunk
    assert_eq!(limiter.total_grants(), 0);
}

#[test_log::test(tokio::test)]
async fn test_gateway_error_code_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 40203,
            "msg": "rate limit exceeded",
            "data": null
        })))
        .mount(&server)
        .await;

    let (client, _) = client(&server);
    let err = client
        .get_bar_series(&minute_request(Adjustment::None))
        .await
        .unwrap_err();

    assert_matches!(
        err.downcast_ref::<ProviderError>(),
        Some(ProviderError::Api { code: 40203, msg, .. }) if msg == "rate limit exceeded"
    );
}

#[test_log::test(tokio::test)]
async fn test_http_status_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let (client, _) = client(&server);
    let err = client
        .get_trading_calendar(
            "SSE",
            NaiveDate::from_ymd_opt(2025, 10, 31).unwrap(),
            NaiveDate::from_ymd_opt(2025, 11, 3).unwrap(),
        )
        .await
        .unwrap_err();

    assert_matches!(
        err.downcast_ref::<ProviderError>(),
        Some(ProviderError::Status { status, body, .. })
            if status.as_u16() == 503 && body == "maintenance"
    );
}

#[test_log::test(tokio::test)]
async fn test_short_calendar_row_is_malformed_not_a_panic() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"api_name": "trade_cal"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {"fields": ["cal_date", "is_open"], "items": [["20251031", 1], ["20251103"]]}
        })))
        .mount(&server)
        .await;

    let (client, _) = client(&server);
    let err = client
        .get_trading_calendar(
            "SSE",
            NaiveDate::from_ymd_opt(2025, 10, 31).unwrap(),
            NaiveDate::from_ymd_opt(2025, 11, 3).unwrap(),
        )
        .await
        .unwrap_err();

    assert_matches!(
        err.downcast_ref::<ProviderError>(),
        Some(ProviderError::Malformed { api, message })
            if api == "trade_cal" && message.contains("row 1")
    );
}

#[test_log::test(tokio::test)]
async fn test_short_adj_factor_row_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"api_name": "stk_mins"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(minute_bars_response()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"api_name": "adj_factor"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {"fields": ["trade_date", "adj_factor"], "items": [["20251030"]]}
        })))
        .mount(&server)
        .await;

    let (client, _) = client(&server);
    let err = client
        .get_bar_series(&minute_request(Adjustment::Hfq))
        .await
        .unwrap_err();

    assert_matches!(
        err.downcast_ref::<ProviderError>(),
        Some(ProviderError::Malformed { api, .. }) if api == "adj_factor"
    );
}
