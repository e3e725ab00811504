//! Resilience configuration with builder pattern
//!
//! Provides a unified configuration for the retry loop and the pagination
//! engine with defaults matching Business Central's observed behaviour.

use crate::api::constants::{
    DEFAULT_MAX_ATTEMPTS, PAGE_REQUEST_DELAY, RATE_LIMIT_BACKOFF_BASE, TRANSIENT_BACKOFF_BASE,
    TYPICAL_PAGE_SIZE,
};
use std::time::Duration;

/// Global resilience configuration for API operations
#[derive(Debug, Clone, Default)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    pub pagination: PaginationConfig,
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Base of `base × 2^n` backoff for transport errors and 5xx
    pub transient_base_delay: Duration,
    /// Base of `base × 2^attempt` backoff for 429 without Retry-After
    pub rate_limit_base_delay: Duration,
    /// Upper bound applied to every computed or server-requested wait
    pub max_delay: Duration,
}

/// Configuration for multi-page collection reads
#[derive(Debug, Clone)]
pub struct PaginationConfig {
    /// Pause inserted before every page request after the first
    pub page_delay: Duration,
    pub short_page: ShortPageHeuristic,
    /// Upper bound on pages per query; `None` follows the server to the end
    pub max_pages: Option<u32>,
}

/// Stop manual `$skip` pagination once a page comes back shorter than the
/// server's usual page size.
///
/// The typical size is inferred from observed server behaviour, not from any
/// documented guarantee. If the real page size is larger than
/// `typical_page_size`, pagination may stop early; raise it or disable the
/// heuristic in that case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortPageHeuristic {
    pub enabled: bool,
    pub typical_page_size: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            transient_base_delay: TRANSIENT_BACKOFF_BASE,
            rate_limit_base_delay: RATE_LIMIT_BACKOFF_BASE,
            max_delay: Duration::from_secs(300),
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_delay: PAGE_REQUEST_DELAY,
            short_page: ShortPageHeuristic::default(),
            max_pages: None,
        }
    }
}

impl Default for ShortPageHeuristic {
    fn default() -> Self {
        Self {
            enabled: true,
            typical_page_size: TYPICAL_PAGE_SIZE,
        }
    }
}

impl ShortPageHeuristic {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// A short page ends pagination only after at least one manual `$skip` cycle
    pub fn signals_last_page(&self, page_len: usize, manual_cycles: u32) -> bool {
        self.enabled && manual_cycles > 0 && page_len < self.typical_page_size
    }
}

impl ResilienceConfig {
    /// Create a new builder for ResilienceConfig
    pub fn builder() -> ResilienceConfigBuilder {
        ResilienceConfigBuilder::new()
    }

    /// Millisecond-scale delays, same attempt budget (for tests and local tooling)
    pub fn fast() -> Self {
        Self {
            retry: RetryConfig {
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                transient_base_delay: Duration::from_millis(5),
                rate_limit_base_delay: Duration::from_millis(10),
                max_delay: Duration::from_secs(5),
            },
            pagination: PaginationConfig {
                page_delay: Duration::from_millis(1),
                short_page: ShortPageHeuristic::default(),
                max_pages: None,
            },
        }
    }
}

/// Builder for ResilienceConfig
#[derive(Debug)]
pub struct ResilienceConfigBuilder {
    config: ResilienceConfig,
}

impl ResilienceConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ResilienceConfig::default(),
        }
    }

    /// Start from an existing configuration instead of the defaults
    pub fn from_config(config: ResilienceConfig) -> Self {
        Self { config }
    }

    /// Set max attempts per logical request
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.retry.max_attempts = attempts.max(1);
        self
    }

    pub fn transient_base_delay(mut self, delay: Duration) -> Self {
        self.config.retry.transient_base_delay = delay;
        self
    }

    pub fn rate_limit_base_delay(mut self, delay: Duration) -> Self {
        self.config.retry.rate_limit_base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.retry.max_delay = delay;
        self
    }

    pub fn page_delay(mut self, delay: Duration) -> Self {
        self.config.pagination.page_delay = delay;
        self
    }

    /// Set the page size below which a manual page is treated as the last one
    pub fn typical_page_size(mut self, size: usize) -> Self {
        self.config.pagination.short_page.typical_page_size = size;
        self
    }

    pub fn short_page_heuristic(mut self, enabled: bool) -> Self {
        self.config.pagination.short_page.enabled = enabled;
        self
    }

    /// Cap the number of pages a single query may fetch
    pub fn max_pages(mut self, pages: u32) -> Self {
        self.config.pagination.max_pages = Some(pages.max(1));
        self
    }

    /// Build the final configuration
    pub fn build(self) -> ResilienceConfig {
        self.config
    }
}

impl Default for ResilienceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
