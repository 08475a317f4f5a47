//! Sliding-window rate limiter tests under concurrent callers

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use rust_minute_bars::api::SlidingWindowRateLimiter;

/// Largest number of grants falling in any half-open window `[t, t + period)`
fn max_grants_in_any_window(grants: &[Instant], period: Duration) -> usize {
    let mut sorted = grants.to_vec();
    sorted.sort();
    sorted
        .iter()
        .enumerate()
        .map(|(i, &start)| sorted[i..].iter().take_while(|&&t| t < start + period).count())
        .max()
        .unwrap_or(0)
}

async fn run_workers(
    limiter: Arc<SlidingWindowRateLimiter>,
    workers: usize,
    calls_per_worker: usize,
) -> Vec<Instant> {
    let grants = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();

    for _ in 0..workers {
        let limiter = Arc::clone(&limiter);
        let grants = Arc::clone(&grants);
        handles.push(tokio::spawn(async move {
            for _ in 0..calls_per_worker {
                let granted_at = limiter.acquire().await;
                grants.lock().unwrap().push(granted_at);
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let grants = grants.lock().unwrap().clone();
    grants
}

#[tokio::test(start_paused = true)]
async fn test_twenty_calls_from_four_workers_at_five_per_second() {
    let period = Duration::from_secs(1);
    let limiter = Arc::new(SlidingWindowRateLimiter::new(5, period));
    let start = Instant::now();

    let grants = run_workers(Arc::clone(&limiter), 4, 5).await;

    assert_eq!(grants.len(), 20);
    assert_eq!(limiter.total_grants(), 20);
    assert!(start.elapsed() >= (20 / 5 - 1) * period);
    assert!(max_grants_in_any_window(&grants, period) <= 5);
}

#[tokio::test(start_paused = true)]
async fn test_uneven_load_never_exceeds_capacity() {
    let period = Duration::from_millis(750);
    let limiter = Arc::new(SlidingWindowRateLimiter::new(3, period));

    let grants = run_workers(Arc::clone(&limiter), 7, 4).await;

    assert_eq!(grants.len(), 28);
    assert!(max_grants_in_any_window(&grants, period) <= 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_window_holds_on_real_threads() {
    let period = Duration::from_millis(200);
    let limiter = Arc::new(SlidingWindowRateLimiter::new(4, period));
    let start = Instant::now();

    let grants = run_workers(Arc::clone(&limiter), 6, 4).await;

    assert_eq!(grants.len(), 24);
    assert!(max_grants_in_any_window(&grants, period) <= 4);
    // 24 grants at 4 per window need at least 5 full periods
    assert!(start.elapsed() >= 5 * period);
}

#[test]
fn test_window_counter_helper() {
    let base = Instant::now();
    let grants = vec![
        base,
        base + Duration::from_millis(100),
        base + Duration::from_millis(999),
        base + Duration::from_millis(1000),
    ];
    assert_eq!(max_grants_in_any_window(&grants, Duration::from_secs(1)), 3);
}
