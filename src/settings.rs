use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment};
use serde::Deserialize;
use thiserror::Error;

use crate::catalog::Catalog;

pub const ENV_PREFIX: &str = "SCRIPTURE";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("default translation {0} is not in the catalog")]
    UnknownDefaultVersion(String),
}

/// Startup configuration. Built once, then shared read-only.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub default_version: String,
    pub upstream_url: String,
    pub max_port_attempts: u16,
    #[serde(default)]
    pub extra_versions: Vec<String>,
}

impl Settings {
    /// Defaults overlaid with `SCRIPTURE_*` environment variables, then the
    /// command-line `host`/`port` when given.
    pub fn load_with(host: Option<&str>, port: Option<u16>) -> Result<Self, SettingsError> {
        let mut builder = Self::defaults()?.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("extra_versions"),
        );
        if let Some(host) = host {
            builder = builder.set_override("host", host)?;
        }
        if let Some(port) = port {
            builder = builder.set_override("port", i64::from(port))?;
        }
        Self::from_builder(builder)
    }

    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, SettingsError> {
        Ok(Config::builder()
            .set_default("host", "127.0.0.1")?
            .set_default("port", 3000_i64)?
            .set_default("default_version", "NIV")?
            .set_default("upstream_url", "https://www.biblegateway.com")?
            .set_default("max_port_attempts", 10_i64)?
            .set_default("extra_versions", Vec::<String>::new())?)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, SettingsError> {
        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.default_version = settings.default_version.trim().to_uppercase();
        if !settings.catalog().contains(&settings.default_version) {
            return Err(SettingsError::UnknownDefaultVersion(settings.default_version));
        }
        Ok(settings)
    }

    pub fn catalog(&self) -> Catalog {
        Catalog::new(&self.extra_versions)
    }
}
