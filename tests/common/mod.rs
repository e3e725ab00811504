#![allow(dead_code)]

use bc_odata::api::{BcClient, ResilienceConfig, TokenProvider};
use bc_odata::config::ConnectionConfig;
use mockito::{Mock, ServerGuard};
use serde_json::{json, Value};
use std::sync::Arc;

pub const TEST_TOKEN: &str = "test-token";

pub fn config_for(url: &str) -> ConnectionConfig {
    ConnectionConfig {
        client_id: "client".to_string(),
        client_secret: "s3cret&more".to_string(),
        scope: "https://api.businesscentral.dynamics.com/.default".to_string(),
        token_url: format!("{}/token", url),
        base_path: url.to_string(),
        ..Default::default()
    }
}

pub fn provider_for(url: &str) -> Arc<TokenProvider> {
    Arc::new(TokenProvider::new(config_for(url)).expect("token provider"))
}

pub fn client_with(url: &str, resilience: ResilienceConfig) -> BcClient {
    let config = config_for(url);
    let provider = Arc::new(TokenProvider::new(config.clone()).expect("token provider"));
    BcClient::with_resilience(&config, provider, resilience).expect("client")
}

/// Client with millisecond backoffs
pub fn client_for(url: &str) -> BcClient {
    client_with(url, ResilienceConfig::fast())
}

pub async fn mock_token(server: &mut ServerGuard, hits: usize) -> Mock {
    server
        .mock("POST", "/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "access_token": TEST_TOKEN,
                "token_type": "Bearer",
                "expires_in": 3600
            })
            .to_string(),
        )
        .expect(hits)
        .create_async()
        .await
}

pub fn records(count: usize, offset: usize) -> Vec<Value> {
    (0..count)
        .map(|i| json!({ "id": offset + i, "name": format!("Record {}", offset + i) }))
        .collect()
}

pub fn page_body(count: usize, offset: usize, next_link: Option<&str>) -> String {
    let mut body = json!({ "value": records(count, offset) });
    if let Some(link) = next_link {
        body["@odata.nextLink"] = json!(link);
    }
    body.to_string()
}
