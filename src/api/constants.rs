//! API constants and defaults for the Business Central OData API

use std::time::Duration;

/// Request timeout used when none (or a non-positive one) is configured
pub const DEFAULT_TIMEOUT_SECS: u64 = 90;

/// Cached tokens are treated as expired this long before their real expiry
pub const TOKEN_SAFETY_MARGIN_SECS: i64 = 5 * 60;

/// Default number of attempts for a single logical request
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Base of the exponential backoff for transport errors and 5xx
pub const TRANSIENT_BACKOFF_BASE: Duration = Duration::from_secs(2);

/// Base of the exponential backoff for 429 without a usable Retry-After
pub const RATE_LIMIT_BACKOFF_BASE: Duration = Duration::from_secs(5);

/// Pause between successive page requests
pub const PAGE_REQUEST_DELAY: Duration = Duration::from_millis(200);

/// Page size Business Central serves when the query does not limit it
pub const TYPICAL_PAGE_SIZE: usize = 20;

/// OData system query options
pub mod params {
    pub const FILTER: &str = "$filter";
    pub const SELECT: &str = "$select";
    pub const ORDERBY: &str = "$orderby";
    pub const TOP: &str = "$top";
    pub const SKIP: &str = "$skip";
    pub const EXPAND: &str = "$expand";
    pub const COUNT: &str = "$count";
    pub const APPLY: &str = "$apply";
}

/// Standard headers for Business Central requests
pub mod headers {
    /// Content type for JSON requests
    pub const CONTENT_TYPE_JSON: &str = "application/json";

    /// Content type for the client-credentials token exchange
    pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

    /// If-Match header for optimistic concurrency on updates
    pub const IF_MATCH: &str = "If-Match";

    /// Correlation header sent with every data request
    pub const X_CORRELATION_ID: &str = "x-correlation-id";
}

/// Default OAuth2 grant for service-to-service access
pub const DEFAULT_GRANT_TYPE: &str = "client_credentials";

/// Default Business Central environment name
pub const DEFAULT_ENVIRONMENT: &str = "Production";
