use anyhow::{Context, Result};
use bc_odata::api::{BcClient, TokenProvider};
use bc_odata::config::ConnectionConfig;
use log::{debug, info};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::cli::Commands;

/// Load the connection, build a client and run one subcommand
pub async fn run_command(
    command: Commands,
    config_path: Option<&Path>,
    cancel: CancellationToken,
) -> Result<()> {
    let client = connect(config_path)?;

    match command {
        Commands::Query { path, paginate } => {
            let records = client.query(&path, paginate, &cancel).await?;
            info!("Query returned {} records", records.len());
            print_json(&records)?;
        }
        Commands::Get { path } => {
            let body = client.get_text(&path, &cancel).await?;
            println!("{}", body);
        }
        Commands::Post { path, json } => {
            let data = parse_body(&json)?;
            let created = client.post(&path, &data, &cancel).await?;
            print_json(&created)?;
        }
        Commands::Patch { path, json, etag } => {
            let data = parse_body(&json)?;
            let updated = client.patch(&path, &data, etag.as_deref(), &cancel).await?;
            print_json(&updated)?;
        }
        Commands::Delete { path } => {
            client.delete(&path, &cancel).await?;
            println!("Deleted {}", path);
        }
        Commands::Aggregate { path, aggregate, groupby, filter } => {
            let rows = client
                .aggregate(&path, groupby.as_deref(), &aggregate, filter.as_deref(), &cancel)
                .await?;
            print_json(&rows)?;
        }
        Commands::Count { path, filter } => {
            let count = client.count(&path, filter.as_deref(), &cancel).await?;
            println!("{}", count);
        }
    }

    debug!("Client metrics: {:?}", client.metrics_snapshot());
    Ok(())
}

fn connect(config_path: Option<&Path>) -> Result<BcClient> {
    let config = match config_path {
        Some(path) => ConnectionConfig::from_file(path)?,
        None => ConnectionConfig::from_env()?,
    };
    info!("Using Business Central API at {}", config.api_base());

    let provider = TokenProvider::new(config.clone()).context("Failed to create token provider")?;
    let client = BcClient::new(&config, Arc::new(provider)).context("Failed to create API client")?;
    Ok(client)
}

fn parse_body(json: &str) -> Result<Value> {
    serde_json::from_str(json).with_context(|| format!("Invalid JSON body: {}", json))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
