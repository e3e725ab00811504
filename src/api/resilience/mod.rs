//! Production resilience features
//!
//! Retry policies, backoff, request metrics and correlated logging for
//! Business Central API interactions.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod retry;

pub use config::{
    PaginationConfig, ResilienceConfig, ResilienceConfigBuilder, RetryConfig, ShortPageHeuristic,
};
pub use logging::{OperationContext, sanitize_headers};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use retry::{AttemptOutcome, RetryPolicy, StatusClass, parse_retry_after, wait_or_cancel};
