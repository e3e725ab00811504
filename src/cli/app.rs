use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bc-odata")]
#[command(about = "A CLI tool for the Microsoft Dynamics 365 Business Central OData API")]
#[command(version)]
pub struct Cli {
    /// TOML connection file; BC_* environment variables override its values
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Query an entity set, optionally following every page
    Query {
        /// Resource path with OData options (e.g., "customers?$filter=city eq 'Oslo'")
        path: String,
        /// Fetch all pages instead of only the first
        #[arg(short, long)]
        paginate: bool,
    },
    /// GET a single resource and print the raw body
    Get {
        path: String,
    },
    /// Create an entity from a JSON document
    Post {
        path: String,
        /// JSON body
        json: String,
    },
    /// Update an entity from a JSON document
    Patch {
        path: String,
        /// JSON body
        json: String,
        /// ETag to send as If-Match
        #[arg(short, long)]
        etag: Option<String>,
    },
    /// Delete an entity
    Delete {
        path: String,
    },
    /// Aggregate a collection with $apply
    Aggregate {
        path: String,
        /// Aggregate expression (e.g., "amount with sum as total")
        aggregate: String,
        /// Comma separated fields to group by
        #[arg(short, long)]
        groupby: Option<String>,
        /// OData filter expression
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Count the entities of a collection
    Count {
        path: String,
        /// OData filter expression
        #[arg(short, long)]
        filter: Option<String>,
    },
}
