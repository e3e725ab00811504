//! Request counters for Business Central API traffic
//!
//! One collector is shared by a token provider and every client built on it,
//! so a snapshot covers token exchanges as well as data requests.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared, cheaply clonable counter set
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<MetricsCollectorInner>,
}

#[derive(Debug, Default)]
struct MetricsCollectorInner {
    requests_sent: AtomicU64,
    retries: AtomicU64,
    auth_replays: AtomicU64,
    rate_limited: AtomicU64,
    server_errors: AtomicU64,
    transport_errors: AtomicU64,
    pages_fetched: AtomicU64,
    token_exchanges: AtomicU64,
    token_invalidations: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// HTTP requests dispatched to the data API, replays included
    pub requests_sent: u64,
    /// Attempts started after a failed attempt
    pub retries: u64,
    /// Requests replayed with a fresh token after a 401
    pub auth_replays: u64,
    pub rate_limited: u64,
    pub server_errors: u64,
    pub transport_errors: u64,
    pub pages_fetched: u64,
    /// Token endpoint calls
    pub token_exchanges: u64,
    /// Cached tokens dropped after the API rejected them
    pub token_invalidations: u64,
}

macro_rules! counter {
    ($name:ident, $field:ident) => {
        pub fn $name(&self) {
            self.inner.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(record_request, requests_sent);
    counter!(record_retry, retries);
    counter!(record_auth_replay, auth_replays);
    counter!(record_rate_limited, rate_limited);
    counter!(record_server_error, server_errors);
    counter!(record_transport_error, transport_errors);
    counter!(record_page, pages_fetched);
    counter!(record_token_exchange, token_exchanges);
    counter!(record_token_invalidation, token_invalidations);

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let inner = &self.inner;

        MetricsSnapshot {
            requests_sent: load(&inner.requests_sent),
            retries: load(&inner.retries),
            auth_replays: load(&inner.auth_replays),
            rate_limited: load(&inner.rate_limited),
            server_errors: load(&inner.server_errors),
            transport_errors: load(&inner.transport_errors),
            pages_fetched: load(&inner.pages_fetched),
            token_exchanges: load(&inner.token_exchanges),
            token_invalidations: load(&inner.token_invalidations),
        }
    }
}
