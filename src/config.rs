//!
//! Connection settings
//!
//! Read from the environment:
//! * `ERU_CORE` - core address, typically `https://core:5001`
//! * `ERU_CA_FILE` - optional PEM file with the core's CA certificate
//! * `ERU_TOKEN` - optional bearer token
//!
use crate::{Client, ClientBuilder, Error, Result};
use std::path::PathBuf;

pub const CORE_ENV: &str = "ERU_CORE";
pub const CA_FILE_ENV: &str = "ERU_CA_FILE";
pub const TOKEN_ENV: &str = "ERU_TOKEN";

/// Where and how to reach the core
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Settings {
    pub core: String,
    pub ca_file: Option<PathBuf>,
    pub token: Option<String>,
}

impl Settings {
    /// Load settings from the environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self> {
        let core = lookup(CORE_ENV)
            .filter(|core| !core.is_empty())
            .ok_or_else(|| Error::General(format!("missing environment variable '{CORE_ENV}'")))?;

        Ok(Self {
            core,
            ca_file: lookup(CA_FILE_ENV)
                .filter(|f| !f.is_empty())
                .map(PathBuf::from),
            token: lookup(TOKEN_ENV).filter(|t| !t.is_empty()),
        })
    }

    /// Create a client from these settings
    pub fn connect(&self) -> Result<Client> {
        tracing::info!("Connecting to core at address {}", self.core);
        let builder = ClientBuilder::new();

        let builder = match &self.ca_file {
            Some(ca_file) => {
                let ca = std::fs::read(ca_file)?;
                builder.add_root_certificate(&ca)?
            }
            None => builder,
        };

        let builder = match &self.token {
            Some(token) => builder.bearer_token(token),
            None => builder,
        };

        builder.connect(&self.core)
    }
}
