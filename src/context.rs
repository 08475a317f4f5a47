use std::sync::Arc;

use crate::api::{MarketDataProvider, SlidingWindowRateLimiter};
use crate::models::FetchParams;
use crate::storage::ArtifactStore;

/// Run-scoped handles shared by the orchestrator and every stock fetch.
/// Built once per run; nothing here is global.
pub struct RunContext {
    pub provider: Arc<dyn MarketDataProvider>,
    pub rate_limiter: Arc<SlidingWindowRateLimiter>,
    pub store: ArtifactStore,
    pub params: Arc<FetchParams>,
    pub timestamp_columns: Vec<String>,
    pub num_workers: usize,
}

impl RunContext {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        rate_limiter: Arc<SlidingWindowRateLimiter>,
        store: ArtifactStore,
        params: FetchParams,
        timestamp_columns: Vec<String>,
        num_workers: usize,
    ) -> Self {
        Self {
            provider,
            rate_limiter,
            store,
            params: Arc::new(params),
            timestamp_columns,
            num_workers: num_workers.max(1),
        }
    }
}
