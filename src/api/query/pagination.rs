//! Pagination state machine
//!
//! `Fetching → Evaluating → {Fetching | Done}`. The machine does no I/O: the
//! client asks for the next request path, fetches it, and feeds the page
//! back through [`Paginator::absorb`].
//!
//! Continuation links win when present. Without one, pagination falls back
//! to re-issuing the original query with an advancing `$skip`, because
//! Business Central often omits `@odata.nextLink` even when more rows exist.

use log::{debug, warn};
use reqwest::Url;

use super::params::ODataPath;
use super::result::{ODataPage, Record};
use crate::api::error::{ApiError, ApiResult};
use crate::api::resilience::ShortPageHeuristic;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    /// Next request path (relative to the API base, or absolute)
    Fetching(String),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `$top` cap reached
    TopReached,
    EmptyPage,
    /// Short page after a manual `$skip` cycle
    ShortPage,
    /// Configured page limit reached while more data may remain
    MaxPages,
}

#[derive(Debug)]
pub struct Paginator {
    original: ODataPath,
    api_base: String,
    cap: Option<usize>,
    /// Next `$skip` for manual pagination: the original skip plus every record received
    offset: u64,
    manual_cycles: u32,
    pages: u32,
    max_pages: Option<u32>,
    heuristic: ShortPageHeuristic,
    records: Vec<Record>,
    state: PageState,
    stop_reason: Option<StopReason>,
}

impl Paginator {
    pub fn new(path: &str, api_base: &str, heuristic: ShortPageHeuristic) -> Self {
        let original = ODataPath::parse(path);
        let cap = original.top();
        if let Some(cap) = cap {
            debug!("Found $top parameter, limiting results to {}", cap);
        }

        Self {
            offset: original.skip(),
            cap,
            api_base: api_base.trim_end_matches('/').to_string(),
            manual_cycles: 0,
            pages: 0,
            max_pages: None,
            heuristic,
            records: Vec::new(),
            state: PageState::Fetching(path.to_string()),
            stop_reason: None,
            original,
        }
    }

    /// Stop after `max` pages even if the server would return more
    pub fn with_max_pages(mut self, max: Option<u32>) -> Self {
        self.max_pages = max.map(|max| max.max(1));
        self
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    pub fn next_request(&self) -> Option<&str> {
        match &self.state {
            PageState::Fetching(path) => Some(path),
            PageState::Done => None,
        }
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages
    }

    pub fn cap(&self) -> Option<usize> {
        self.cap
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn records_len(&self) -> usize {
        self.records.len()
    }

    /// Evaluate a fetched page and decide the next state
    pub fn absorb(&mut self, page: ODataPage) -> ApiResult<&PageState> {
        if self.state == PageState::Done {
            return Ok(&self.state);
        }

        let received = page.len();
        let continuation = page.continuation().map(str::to_string);
        self.pages += 1;
        self.offset += received as u64;
        self.records.extend(page.value);

        debug!(
            "Page {} fetched: {} results in page, {} total, next link: {}",
            self.pages,
            received,
            self.records.len(),
            continuation.is_some()
        );

        if let Some(cap) = self.cap {
            if self.records.len() >= cap {
                self.records.truncate(cap);
                return Ok(self.finish(StopReason::TopReached));
            }
        }

        if received == 0 {
            return Ok(self.finish(StopReason::EmptyPage));
        }

        if self.max_pages.is_some_and(|max| self.pages >= max) {
            warn!(
                "Stopping pagination at the {} page limit with {} records; more may remain",
                self.pages,
                self.records.len()
            );
            return Ok(self.finish(StopReason::MaxPages));
        }

        match continuation {
            Some(link) => {
                let next = continuation_path(&link, &self.api_base)?;
                debug!("Following next link: {}", next);
                self.state = PageState::Fetching(next);
            }
            None => {
                if self.heuristic.signals_last_page(received, self.manual_cycles) {
                    debug!(
                        "Received {} results, fewer than the typical {}, treating as last page",
                        received, self.heuristic.typical_page_size
                    );
                    return Ok(self.finish(StopReason::ShortPage));
                }

                self.manual_cycles += 1;
                let next = self.original.with_skip(self.offset).to_string();
                debug!("No next link, continuing manual pagination: {}", next);
                self.state = PageState::Fetching(next);
            }
        }

        Ok(&self.state)
    }

    fn finish(&mut self, reason: StopReason) -> &PageState {
        debug!("Pagination complete ({:?}) after {} pages", reason, self.pages);
        self.stop_reason = Some(reason);
        self.state = PageState::Done;
        &self.state
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

/// Turn a continuation link into the next request path.
///
/// The API base is stripped so the request goes through the normal path
/// joining; the link's query string is reused verbatim. Relative links are
/// resolved against the base first. Links that do not live under the base are
/// returned unchanged and fetched as absolute URLs.
pub fn continuation_path(next_link: &str, api_base: &str) -> ApiResult<String> {
    let api_base = api_base.trim_end_matches('/');

    if let Some(rest) = next_link.strip_prefix(api_base) {
        if rest.is_empty() || rest.starts_with('/') || rest.starts_with('?') {
            return Ok(rest.to_string());
        }
    }

    let base = Url::parse(api_base).ok();
    let base_path = base
        .as_ref()
        .map(|base| base.path().trim_end_matches('/').to_string())
        .unwrap_or_default();

    if next_link.starts_with('/') {
        let (path, query) = match next_link.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (next_link, None),
        };
        let relative = strip_base_path(path, &base_path).unwrap_or(path);
        return Ok(join_query(relative, query));
    }

    let url = Url::parse(next_link)
        .or_else(|e| match &base {
            // Relative links resolve under the base, which acts as a directory
            Some(base) if !next_link.contains("://") => {
                let mut directory = base.clone();
                directory.set_path(&format!("{}/", base_path));
                directory.join(next_link)
            }
            _ => Err(e),
        })
        .map_err(|e| {
            ApiError::InvalidUrl(format!("failed to parse next link '{}': {}", next_link, e))
        })?;

    let same_origin = base.as_ref().is_some_and(|base| base.origin() == url.origin());
    match strip_base_path(url.path(), &base_path) {
        Some(relative) if same_origin => Ok(join_query(relative, url.query())),
        _ => Ok(url.to_string()),
    }
}

fn strip_base_path<'a>(path: &'a str, base_path: &str) -> Option<&'a str> {
    if base_path.is_empty() {
        return Some(path);
    }
    path.strip_prefix(base_path)
        .filter(|rest| rest.is_empty() || rest.starts_with('/'))
}

fn join_query(path: &str, query: Option<&str>) -> String {
    match query {
        Some(query) if !query.is_empty() => format!("{}?{}", path, query),
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BASE: &str = "https://api.example.com/v2.0/tenant/Production/ODataV4/Company('CRONUS')";

    fn page(count: usize, next_link: Option<&str>) -> ODataPage {
        let value = (0..count)
            .map(|i| {
                let mut record = Record::new();
                record.insert("n".to_string(), json!(i));
                record
            })
            .collect();
        ODataPage {
            value,
            next_link: next_link.map(str::to_string),
            count: None,
        }
    }

    #[test]
    fn test_manual_skip_sequence() {
        let mut paginator = Paginator::new("/items", BASE, ShortPageHeuristic::default());
        assert_eq!(paginator.next_request(), Some("/items"));

        paginator.absorb(page(20, None)).unwrap();
        assert_eq!(paginator.next_request(), Some("/items?$skip=20"));

        paginator.absorb(page(20, None)).unwrap();
        assert_eq!(paginator.next_request(), Some("/items?$skip=40"));

        paginator.absorb(page(5, None)).unwrap();
        assert_eq!(paginator.state(), &PageState::Done);
        assert_eq!(paginator.stop_reason(), Some(StopReason::ShortPage));
        assert_eq!(paginator.into_records().len(), 45);
    }

    #[test]
    fn test_short_first_page_still_tries_one_more() {
        let mut paginator = Paginator::new("/items", BASE, ShortPageHeuristic::default());

        paginator.absorb(page(7, None)).unwrap();
        assert_eq!(paginator.next_request(), Some("/items?$skip=7"));

        paginator.absorb(page(0, None)).unwrap();
        assert_eq!(paginator.stop_reason(), Some(StopReason::EmptyPage));
        assert_eq!(paginator.pages_fetched(), 2);
    }

    #[test]
    fn test_manual_skip_keeps_other_params_and_starts_from_original_skip() {
        let mut paginator = Paginator::new(
            "/items?$filter=Blocked%20eq%20false&$select=No&$orderby=No&$skip=10",
            BASE,
            ShortPageHeuristic::default(),
        );

        paginator.absorb(page(20, None)).unwrap();
        assert_eq!(
            paginator.next_request(),
            Some("/items?$filter=Blocked%20eq%20false&$select=No&$orderby=No&$skip=30")
        );
    }

    #[test]
    fn test_top_cap_truncates_mid_page() {
        let mut paginator = Paginator::new("/items?$top=2", BASE, ShortPageHeuristic::default());

        paginator.absorb(page(3, Some("/items?$skiptoken=abc"))).unwrap();

        assert_eq!(paginator.stop_reason(), Some(StopReason::TopReached));
        assert_eq!(paginator.into_records().len(), 2);
    }

    #[test]
    fn test_next_link_takes_precedence() {
        let mut paginator = Paginator::new("/items", BASE, ShortPageHeuristic::default());
        let link = format!("{}/items?$skiptoken=page2", BASE);

        paginator.absorb(page(1, Some(&link))).unwrap();
        assert_eq!(paginator.next_request(), Some("/items?$skiptoken=page2"));

        paginator.absorb(page(1, None)).unwrap();
        // Offset counts records from linked pages too
        assert_eq!(paginator.next_request(), Some("/items?$skip=2"));
    }

    #[test]
    fn test_empty_page_ends_even_with_next_link() {
        let mut paginator = Paginator::new("/items", BASE, ShortPageHeuristic::default());
        paginator.absorb(page(0, Some("/items?$skiptoken=x"))).unwrap();

        assert_eq!(paginator.state(), &PageState::Done);
        assert_eq!(paginator.stop_reason(), Some(StopReason::EmptyPage));
    }

    #[test]
    fn test_heuristic_disabled_keeps_going() {
        let mut paginator = Paginator::new("/items", BASE, ShortPageHeuristic::disabled());
        paginator.absorb(page(20, None)).unwrap();
        paginator.absorb(page(5, None)).unwrap();

        assert_eq!(paginator.next_request(), Some("/items?$skip=25"));
    }

    #[test]
    fn test_max_pages_stops_endless_paging() {
        let mut paginator =
            Paginator::new("/items", BASE, ShortPageHeuristic::disabled()).with_max_pages(Some(3));

        paginator.absorb(page(20, Some("/items?$skiptoken=1"))).unwrap();
        paginator.absorb(page(20, None)).unwrap();
        assert_eq!(paginator.next_request(), Some("/items?$skip=40"));

        paginator.absorb(page(20, Some("/items?$skiptoken=1"))).unwrap();
        assert_eq!(paginator.state(), &PageState::Done);
        assert_eq!(paginator.stop_reason(), Some(StopReason::MaxPages));
        assert_eq!(paginator.pages_fetched(), 3);
        assert_eq!(paginator.into_records().len(), 60);
    }

    #[test]
    fn test_top_cap_wins_over_page_limit() {
        let mut paginator = Paginator::new("/items?$top=20", BASE, ShortPageHeuristic::default())
            .with_max_pages(Some(1));

        paginator.absorb(page(20, None)).unwrap();

        assert_eq!(paginator.stop_reason(), Some(StopReason::TopReached));
    }

    #[test]
    fn test_relative_next_link_resolves_under_base() {
        assert_eq!(
            continuation_path("items?$skiptoken=2", BASE).unwrap(),
            "/items?$skiptoken=2"
        );
        assert_eq!(
            continuation_path("items?$skiptoken=2", "http://127.0.0.1:1234").unwrap(),
            "/items?$skiptoken=2"
        );
        assert_eq!(
            continuation_path("./items?$skip=5", "http://127.0.0.1:1234/api/").unwrap(),
            "/items?$skip=5"
        );
    }

    #[test]
    fn test_relative_next_link_keeps_paginating() {
        let mut paginator = Paginator::new("/items", BASE, ShortPageHeuristic::default());

        paginator.absorb(page(20, Some("items?$skiptoken=2"))).unwrap();

        assert_eq!(paginator.next_request(), Some("/items?$skiptoken=2"));
    }

    #[test]
    fn test_continuation_path_variants() {
        let absolute = format!("{}/items?$skiptoken=1", BASE);
        assert_eq!(continuation_path(&absolute, BASE).unwrap(), "/items?$skiptoken=1");

        let relative = "/v2.0/tenant/Production/ODataV4/Company('CRONUS')/items?$skip=1";
        assert_eq!(continuation_path(relative, BASE).unwrap(), "/items?$skip=1");

        let other_host = "https://other.example.com/items?$skip=1";
        assert_eq!(continuation_path(other_host, BASE).unwrap(), other_host);

        let simple_base = "http://127.0.0.1:1234";
        assert_eq!(
            continuation_path("http://127.0.0.1:1234/test?$skip=1", simple_base).unwrap(),
            "/test?$skip=1"
        );

        assert!(continuation_path("http://[bad", BASE).is_err());
        assert!(continuation_path("items?$skip=1", "not a base").is_err());
    }
}
