//! Main entry point for token-sentinel
//!
//! Investigates a single token address and prints the result as JSON.
//!
//! Usage: `token-sentinel <ADDRESS> [CONFIG_JSON]`

use anyhow::{Context, Result};
use std::path::Path;
use token_sentinel::oracle::InvestigatorConfig;
use token_sentinel::{InvestigationError, InvestigatorBuilder};
use tracing::{error, info, Level};

const CLIENT_KEY: &str = "cli";
const API_KEY_ENV: &str = "SENTINEL_REASONING_API_KEY";

fn load_config(path: Option<&str>) -> Result<InvestigatorConfig> {
    let mut config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(Path::new(path))
                .with_context(|| format!("Failed to read config file {path}"))?;
            serde_json::from_str(&raw).with_context(|| format!("Invalid config file {path}"))?
        }
        None => InvestigatorConfig::default(),
    };

    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            config.reasoning.api_key = Some(key);
        }
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(address) = args.next() else {
        eprintln!("Usage: token-sentinel <ADDRESS> [CONFIG_JSON]");
        std::process::exit(2);
    };
    let config = load_config(args.next().as_deref())?;

    info!("Starting token-sentinel investigation of {}", address);
    let investigator = InvestigatorBuilder::from_config(config).build().await?;

    let outcome = investigator.investigate_as(CLIENT_KEY, &address).await;
    investigator.shutdown().await;

    match outcome {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e @ InvestigationError::InvalidAddress(_)) => {
            error!("{}", e);
            std::process::exit(2);
        }
        Err(e @ InvestigationError::RateLimited { .. }) => {
            error!("{}", e);
            std::process::exit(3);
        }
        Err(e) => Err(e.into()),
    }
}
