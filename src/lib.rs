pub mod api;
pub mod config;

pub use api::{ApiError, ApiResult, BcClient, TokenProvider};
pub use config::ConnectionConfig;
