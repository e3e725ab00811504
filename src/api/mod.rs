//! Business Central OData API Module
//!
//! Token acquisition, the resilient HTTP client, query paths and the
//! pagination machinery it drives.

pub mod auth;
pub mod client;
pub mod constants;
pub mod error;
pub mod query;
pub mod resilience;

pub use auth::{TokenProvider, TokenResponse};
pub use client::BcClient;
pub use error::{ApiError, ApiResult};
pub use query::{
    ODataPage, ODataPath, Paginator, QueryBuilder, Record, aggregate_expression, entity_key_path,
};
pub use resilience::{MetricsSnapshot, ResilienceConfig, RetryConfig, RetryPolicy};
