//! Query result handling
//!
//! Parses OData collection responses from Business Central

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::error::{ApiError, ApiResult};

/// One record: an open-ended field-name-to-value mapping
pub type Record = Map<String, Value>;

/// One page of a collection response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ODataPage {
    #[serde(default)]
    pub value: Vec<Record>,
    #[serde(
        rename = "@odata.nextLink",
        alias = "nextLink",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub next_link: Option<String>,
    #[serde(rename = "@odata.count", default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

impl ODataPage {
    /// Parse a response body as an OData collection page
    pub fn from_slice(body: &[u8]) -> ApiResult<Self> {
        serde_json::from_slice(body)
            .map_err(|e| ApiError::Decode(format!("failed to parse OData response: {}", e)))
    }

    /// Continuation link, ignoring empty strings
    pub fn continuation(&self) -> Option<&str> {
        self.next_link.as_deref().filter(|link| !link.trim().is_empty())
    }

    pub fn has_more(&self) -> bool {
        self.continuation().is_some()
    }

    /// Get number of records returned
    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Parse a single-entity response body (POST/PATCH representations)
pub fn record_from_slice(body: &[u8]) -> ApiResult<Record> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Record::new());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::Decode(format!("failed to parse entity response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_with_next_link() {
        let body = br#"{"value":[{"No":"001","Name":"Test"}],"@odata.nextLink":"/next"}"#;
        let page = ODataPage::from_slice(body).unwrap();

        assert_eq!(page.len(), 1);
        assert_eq!(page.value[0]["No"], json!("001"));
        assert_eq!(page.continuation(), Some("/next"));
    }

    #[test]
    fn test_page_accepts_plain_next_link_and_count() {
        let body = br#"{"@odata.context":"x","@odata.count":42,"value":[],"nextLink":"/more"}"#;
        let page = ODataPage::from_slice(body).unwrap();

        assert!(page.is_empty());
        assert_eq!(page.count, Some(42));
        assert!(page.has_more());
    }

    #[test]
    fn test_empty_next_link_means_none() {
        let page = ODataPage::from_slice(br#"{"value":[{}],"@odata.nextLink":""}"#).unwrap();
        assert!(!page.has_more());
    }

    #[test]
    fn test_missing_value_is_empty_page() {
        let page = ODataPage::from_slice(br#"{"No":"001"}"#).unwrap();
        assert!(page.is_empty());
    }

    #[test]
    fn test_invalid_json_is_decode_error() {
        let err = ODataPage::from_slice(b"not json").unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn test_record_from_slice() {
        let record = record_from_slice(br#"{"No":"001","Name":"Test Item"}"#).unwrap();
        assert_eq!(record["Name"], json!("Test Item"));

        assert!(record_from_slice(b"").unwrap().is_empty());
        assert!(record_from_slice(b"[1,2]").is_err());
    }
}
