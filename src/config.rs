//! Service configuration, read once at startup from the environment.

use anyhow::{anyhow, Result};

/// Runtime configuration for the import service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the UPAS REST backend, e.g. `https://api.upas.example/api`.
    pub backend_url: String,
    /// Bearer token presented on every backend call.
    pub api_token: String,
    /// Listen address, defaults to `0.0.0.0:3000`.
    pub bind_addr: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let backend_url = std::env::var("UPAS_BACKEND_URL")
            .map_err(|_| anyhow!("UPAS_BACKEND_URL not set"))?
            .trim_end_matches('/')
            .to_string();
        let api_token =
            std::env::var("UPAS_API_TOKEN").map_err(|_| anyhow!("UPAS_API_TOKEN not set"))?;
        let bind_addr =
            std::env::var("UPAS_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        Ok(Self {
            backend_url,
            api_token,
            bind_addr,
        })
    }
}
