use log::{debug, error, info};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Method, Response, Url};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::auth::TokenProvider;
use super::constants::{headers, params};
use super::error::{ApiError, ApiResult};
use super::query::{
    ODataPage, ODataPath, Paginator, Record, aggregate_expression, record_from_slice,
};
use super::resilience::{
    AttemptOutcome, MetricsCollector, MetricsSnapshot, OperationContext, PaginationConfig,
    ResilienceConfig, RetryPolicy, StatusClass, wait_or_cancel,
};
use crate::config::ConnectionConfig;

/// Business Central OData client with token refresh, retries and pagination
#[derive(Clone)]
pub struct BcClient {
    api_base: String,
    http_client: reqwest::Client,
    auth: Arc<TokenProvider>,
    retry_policy: RetryPolicy,
    pagination: PaginationConfig,
    metrics: MetricsCollector,
}

impl BcClient {
    pub fn new(config: &ConnectionConfig, auth: Arc<TokenProvider>) -> ApiResult<Self> {
        Self::with_resilience(config, auth, ResilienceConfig::default())
    }

    /// Create a new client with custom retry and pagination settings
    pub fn with_resilience(
        config: &ConnectionConfig,
        auth: Arc<TokenProvider>,
        resilience: ResilienceConfig,
    ) -> ApiResult<Self> {
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(config.request_timeout())
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("bc-odata/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::with_custom_client(config.api_base(), auth, http_client, resilience))
    }

    /// Create a new client with custom HTTP client configuration
    pub fn with_custom_client(
        api_base: impl Into<String>,
        auth: Arc<TokenProvider>,
        http_client: reqwest::Client,
        resilience: ResilienceConfig,
    ) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        let metrics = auth.metrics().clone();
        Self {
            api_base,
            http_client,
            auth,
            retry_policy: RetryPolicy::new(resilience.retry),
            pagination: resilience.pagination,
            metrics,
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn token_provider(&self) -> &Arc<TokenProvider> {
        &self.auth
    }

    /// Get performance metrics snapshot (token exchanges included)
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Resolve a resource path against the API base; absolute URLs pass through
    pub fn build_url(&self, path: &str) -> ApiResult<Url> {
        let full = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.is_empty() || path.starts_with('/') || path.starts_with('?') {
            format!("{}{}", self.api_base, path)
        } else {
            format!("{}/{}", self.api_base, path)
        };

        Url::parse(&full).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", full, e)))
    }

    /// Execute one logical request with the configured attempt budget
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        extra_headers: HeaderMap,
        cancel: &CancellationToken,
    ) -> ApiResult<Response> {
        let max_attempts = self.retry_policy.max_attempts();
        self.request_with_retries(method, path, body, extra_headers, max_attempts, cancel)
            .await
    }

    /// Execute one logical request, retrying transient failures up to
    /// `max_attempts` times.
    ///
    /// A 401 is answered by invalidating the token, fetching a new one and
    /// replaying the request once inside the same attempt.
    pub async fn request_with_retries(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        extra_headers: HeaderMap,
        max_attempts: u32,
        cancel: &CancellationToken,
    ) -> ApiResult<Response> {
        let url = self.build_url(path)?;
        let context = OperationContext::new(method.as_str(), path);
        let max_attempts = max_attempts.max(1);

        let mut last_error: Option<ApiError> = None;
        let mut next_wait = Duration::ZERO;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                self.metrics.record_retry();
                if let Some(err) = &last_error {
                    context.log_retry(attempt, &err.to_string(), next_wait);
                }
            }
            if let Err(err) = wait_or_cancel(next_wait, cancel).await {
                error!("Context cancelled before attempt {} of {}", attempt + 1, path);
                return Err(err);
            }

            let token = self.auth.get_token().await.inspect_err(|e| {
                error!("Failed to get OAuth token: {}", e);
            })?;

            let outcome = self
                .run_attempt(&context, attempt, &method, &url, body, &extra_headers, token, cancel)
                .await?;

            match outcome {
                AttemptOutcome::Success(response) => {
                    let status = response.status().as_u16();
                    context.complete(true, json!({ "attempts": attempt + 1, "status": status }));
                    return Ok(response);
                }
                AttemptOutcome::TerminalFailure(err) => {
                    let error = err.to_string();
                    context.complete(false, json!({ "attempts": attempt + 1, "error": error }));
                    return Err(err);
                }
                AttemptOutcome::RetryableFailure { error, wait } => {
                    next_wait = wait;
                    last_error = Some(error);
                }
                // run_attempt replays a 401 in place and never hands AuthRetry back
                AttemptOutcome::AuthRetry => unreachable!("auth replay escaped run_attempt"),
            }
        }

        let source =
            last_error.unwrap_or_else(|| ApiError::Decode("no attempt was made".to_string()));
        error!("Max retries exceeded for {} after {} attempts: {}", path, max_attempts, source);
        context.complete(
            false,
            json!({ "attempts": max_attempts, "error": source.to_string() }),
        );
        Err(ApiError::MaxRetriesExceeded {
            attempts: max_attempts,
            source: Box::new(source),
        })
    }

    /// One attempt, including the single in-place replay after a 401
    #[allow(clippy::too_many_arguments)]
    async fn run_attempt(
        &self,
        context: &OperationContext,
        attempt: u32,
        method: &Method,
        url: &Url,
        body: Option<&Value>,
        extra_headers: &HeaderMap,
        mut token: String,
        cancel: &CancellationToken,
    ) -> ApiResult<AttemptOutcome<Response>> {
        let mut auth_replayed = false;

        loop {
            let mut request = self
                .http_client
                .request(method.clone(), url.clone())
                .bearer_auth(&token)
                .header(ACCEPT, headers::CONTENT_TYPE_JSON)
                .header(headers::X_CORRELATION_ID, &context.correlation_id)
                .headers(extra_headers.clone());
            if let Some(body) = body {
                request = request.json(body);
            }
            let request = request.build()?;
            context.log_request(attempt, url.as_str(), request.headers());

            self.metrics.record_request();
            let started = Instant::now();
            let sent = tokio::select! {
                _ = cancel.cancelled() => return Err(ApiError::Cancelled),
                result = self.http_client.execute(request) => result,
            };

            let response = match sent {
                Ok(response) => response,
                Err(e) => {
                    self.metrics.record_transport_error();
                    let wait = self.retry_policy.transient_delay(attempt);
                    return Ok(AttemptOutcome::RetryableFailure {
                        error: ApiError::Transport(e),
                        wait,
                    });
                }
            };
            context.log_response(response.status().as_u16(), started.elapsed());

            match self.evaluate(response, attempt, auth_replayed, cancel).await? {
                AttemptOutcome::AuthRetry => {
                    auth_replayed = true;
                    self.auth.invalidate_token().await;
                    token = self.auth.get_token().await.inspect_err(|e| {
                        error!("Failed to refresh token after 401: {}", e);
                    })?;
                    self.metrics.record_auth_replay();
                    info!("Token refreshed successfully, retrying request");
                }
                outcome => return Ok(outcome),
            }
        }
    }

    /// Classify a response into the next transition of the retry loop
    async fn evaluate(
        &self,
        response: Response,
        attempt: u32,
        auth_replayed: bool,
        cancel: &CancellationToken,
    ) -> ApiResult<AttemptOutcome<Response>> {
        let status = response.status();

        let outcome = match StatusClass::from_status(status) {
            StatusClass::Success => AttemptOutcome::Success(response),
            StatusClass::Unauthorized => {
                let body = error_body(response, cancel).await?;
                if auth_replayed {
                    error!("Unauthorized (401) again after token refresh: {}", body);
                    AttemptOutcome::TerminalFailure(ApiError::Unauthorized { body })
                } else {
                    info!("Unauthorized (401), token may have expired, refreshing token: {}", body);
                    AttemptOutcome::AuthRetry
                }
            }
            StatusClass::RateLimited => {
                self.metrics.record_rate_limited();
                let wait = self.retry_policy.rate_limit_delay(attempt, response.headers());
                info!("Rate limit exceeded (429) on attempt {}, waiting {:?}", attempt + 1, wait);
                AttemptOutcome::RetryableFailure {
                    error: ApiError::RateLimited { retry_after: wait },
                    wait,
                }
            }
            StatusClass::ServerError => {
                self.metrics.record_server_error();
                let body = error_body(response, cancel).await?;
                AttemptOutcome::RetryableFailure {
                    error: ApiError::Server { status: status.as_u16(), body },
                    wait: self.retry_policy.transient_delay(attempt),
                }
            }
            StatusClass::ClientError => {
                let body = error_body(response, cancel).await?;
                error!("Client error ({}), not retrying: {}", status.as_u16(), body);
                AttemptOutcome::TerminalFailure(ApiError::Client {
                    status: status.as_u16(),
                    body,
                })
            }
        };

        Ok(outcome)
    }

    pub async fn get(&self, path: &str, cancel: &CancellationToken) -> ApiResult<Response> {
        self.request(Method::GET, path, None, HeaderMap::new(), cancel).await
    }

    /// GET a resource and return the body as text (e.g. `$metadata` XML)
    pub async fn get_text(&self, path: &str, cancel: &CancellationToken) -> ApiResult<String> {
        let response = self.get(path, cancel).await?;
        read_text(response, cancel).await
    }

    /// GET one page of a collection
    pub async fn fetch_page(&self, path: &str, cancel: &CancellationToken) -> ApiResult<ODataPage> {
        let response = self.get(path, cancel).await?;
        let body = read_bytes(response, cancel).await?;
        self.metrics.record_page();
        ODataPage::from_slice(&body)
    }

    /// Run an OData query and return its records in fetch order.
    ///
    /// Without `paginate` only the first page is returned. With it, pages are
    /// followed until exhaustion or until the `$top` cap in the query is met.
    pub async fn query(
        &self,
        path: &str,
        paginate: bool,
        cancel: &CancellationToken,
    ) -> ApiResult<Vec<Record>> {
        if !paginate {
            return Ok(self.fetch_page(path, cancel).await?.value);
        }

        let context = OperationContext::new("query", path);
        info!("Fetching paginated data from {}", path);

        let mut paginator = Paginator::new(path, &self.api_base, self.pagination.short_page)
            .with_max_pages(self.pagination.max_pages);
        while let Some(next) = paginator.next_request().map(str::to_string) {
            if paginator.pages_fetched() > 0 {
                wait_or_cancel(self.pagination.page_delay, cancel).await?;
            }

            debug!("Fetching page {}: {}", paginator.pages_fetched() + 1, next);
            let page = match self.fetch_page(&next, cancel).await {
                Ok(page) => page,
                Err(e) => {
                    error!("Failed to fetch page {}: {}", paginator.pages_fetched() + 1, e);
                    context.complete(
                        false,
                        json!({ "pages": paginator.pages_fetched(), "error": e.to_string() }),
                    );
                    return Err(e);
                }
            };
            paginator.absorb(page)?;
        }

        context.complete(
            true,
            json!({
                "pages": paginator.pages_fetched(),
                "results": paginator.records_len(),
                "stop_reason": format!("{:?}", paginator.stop_reason()),
            }),
        );
        Ok(paginator.into_records())
    }

    /// Count entities with `$count=true`, preferring the server-reported total
    pub async fn count(
        &self,
        path: &str,
        filter: Option<&str>,
        cancel: &CancellationToken,
    ) -> ApiResult<u64> {
        let mut target = ODataPath::parse(path);
        target.set_raw(params::COUNT, "true");
        if let Some(filter) = filter.filter(|f| !f.trim().is_empty()) {
            target.set(params::FILTER, filter);
        }

        let page = self.fetch_page(&target.to_string(), cancel).await?;
        Ok(page.count.unwrap_or(page.len() as u64))
    }

    /// Run an `$apply` aggregation (optionally grouped and filtered) and return
    /// the aggregated rows of the first page
    pub async fn aggregate(
        &self,
        path: &str,
        groupby: Option<&str>,
        aggregate: &str,
        filter: Option<&str>,
        cancel: &CancellationToken,
    ) -> ApiResult<Vec<Record>> {
        if aggregate.trim().is_empty() {
            return Err(ApiError::InvalidQuery(
                "aggregate expression is required".to_string(),
            ));
        }

        let mut target = ODataPath::parse(path);
        let apply = aggregate_expression(groupby.unwrap_or_default(), aggregate);
        target.set(params::APPLY, &apply);
        if let Some(filter) = filter.filter(|f| !f.trim().is_empty()) {
            target.set(params::FILTER, filter);
        }

        self.query(&target.to_string(), false, cancel).await
    }

    /// Create an entity and return the server's representation
    pub async fn post(
        &self,
        path: &str,
        data: &Value,
        cancel: &CancellationToken,
    ) -> ApiResult<Record> {
        let response = self
            .request(Method::POST, path, Some(data), HeaderMap::new(), cancel)
            .await?;
        let body = read_bytes(response, cancel).await?;
        record_from_slice(&body)
    }

    /// Update an entity; a non-empty `etag` is sent as `If-Match`
    pub async fn patch(
        &self,
        path: &str,
        data: &Value,
        etag: Option<&str>,
        cancel: &CancellationToken,
    ) -> ApiResult<Record> {
        let mut extra_headers = HeaderMap::new();
        if let Some(etag) = etag.filter(|e| !e.is_empty()) {
            let value = HeaderValue::from_str(etag)
                .map_err(|e| ApiError::InvalidHeader(format!("If-Match '{}': {}", etag, e)))?;
            extra_headers.insert(headers::IF_MATCH, value);
        }

        let response = self
            .request(Method::PATCH, path, Some(data), extra_headers, cancel)
            .await?;
        let body = read_bytes(response, cancel).await?;
        record_from_slice(&body)
    }

    /// Delete an entity; any 2xx (typically 204) is success
    pub async fn delete(&self, path: &str, cancel: &CancellationToken) -> ApiResult<()> {
        let response = self
            .request(Method::DELETE, path, None, HeaderMap::new(), cancel)
            .await?;
        debug!("Deleted {} ({})", path, response.status());
        Ok(())
    }
}

async fn read_bytes(response: Response, cancel: &CancellationToken) -> ApiResult<Vec<u8>> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ApiError::Cancelled),
        body = response.bytes() => Ok(body?.to_vec()),
    }
}

async fn read_text(response: Response, cancel: &CancellationToken) -> ApiResult<String> {
    let body = read_bytes(response, cancel).await?;
    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Body of a failed response for error reporting; an unreadable body is empty
async fn error_body(response: Response, cancel: &CancellationToken) -> ApiResult<String> {
    match read_text(response, cancel).await {
        Err(ApiError::Cancelled) => Err(ApiError::Cancelled),
        Err(e) => {
            debug!("Failed to read error response body: {}", e);
            Ok(String::new())
        }
        ok => ok,
    }
}

impl std::fmt::Debug for BcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BcClient")
            .field("api_base", &self.api_base)
            .field("retry", self.retry_policy.config())
            .field("pagination", &self.pagination)
            .finish_non_exhaustive()
    }
}
