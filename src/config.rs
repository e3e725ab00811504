use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::api::constants::{
    headers, DEFAULT_ENVIRONMENT, DEFAULT_GRANT_TYPE, DEFAULT_TIMEOUT_SECS,
};

/// Connection settings for one Business Central company.
///
/// Immutable once handed to the token provider and client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub grant_type: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
    pub token_url: String,
    pub content_type: String,
    /// API root, may contain `{tenant}`, `{environment}` and `{company}` placeholders
    pub base_path: String,
    pub tenant_id: String,
    pub environment: String,
    pub company: String,
    /// Request timeout in seconds, non-positive means default
    pub timeout_secs: i64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            grant_type: DEFAULT_GRANT_TYPE.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            scope: String::new(),
            token_url: String::new(),
            content_type: headers::CONTENT_TYPE_FORM.to_string(),
            base_path: String::new(),
            tenant_id: String::new(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            company: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS as i64,
        }
    }
}

impl ConnectionConfig {
    /// Read the `BC_*` environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        info!("Loading connection settings from environment variables");
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file, then let `BC_*` environment variables override it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading connection settings from: {:?}", path);

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let mut config: ConnectionConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup; empty values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let string_fields: [(&str, &mut String); 10] = [
            ("BC_GRANT_TYPE", &mut self.grant_type),
            ("BC_CLIENT_ID", &mut self.client_id),
            ("BC_CLIENT_SECRET", &mut self.client_secret),
            ("BC_SCOPE_API", &mut self.scope),
            ("BC_TOKEN_URL", &mut self.token_url),
            ("BC_CONTENT_TYPE", &mut self.content_type),
            ("BC_BASE_PATH", &mut self.base_path),
            ("BC_TENANT_ID", &mut self.tenant_id),
            ("BC_ENVIRONMENT", &mut self.environment),
            ("BC_COMPANY", &mut self.company),
        ];
        for (key, field) in string_fields {
            if let Some(value) = get(key) {
                *field = value;
            }
        }

        if let Some(raw) = get("BC_API_TIMEOUT") {
            match raw.trim().parse::<i64>() {
                Ok(secs) => self.timeout_secs = secs,
                Err(_) => warn!("Ignoring non-numeric BC_API_TIMEOUT value: {}", raw),
            }
        }
    }

    /// Check that every setting needed to reach the API is present
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("BC_CLIENT_ID", &self.client_id),
            ("BC_CLIENT_SECRET", &self.client_secret),
            ("BC_SCOPE_API", &self.scope),
            ("BC_TOKEN_URL", &self.token_url),
            ("BC_BASE_PATH", &self.base_path),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                anyhow::bail!("{} is required", key);
            }
        }
        Ok(())
    }

    /// Base path with tenant/environment/company substituted, without trailing slash
    pub fn api_base(&self) -> String {
        let base = self
            .base_path
            .replace("{tenant}", &urlencoding::encode(&self.tenant_id))
            .replace("{environment}", &urlencoding::encode(&self.environment))
            .replace("{company}", &urlencoding::encode(&self.company));
        base.trim_end_matches('/').to_string()
    }

    pub fn request_timeout(&self) -> Duration {
        if self.timeout_secs <= 0 {
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        } else {
            Duration::from_secs(self.timeout_secs as u64)
        }
    }
}
