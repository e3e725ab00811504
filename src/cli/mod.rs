pub mod app;

pub use app::{Cli, Commands};

/// Log filter used when neither RUST_LOG nor .env sets one
pub const DEFAULT_LOG_FILTER: &str = "info";
