//! Configuration for Keystone services.
//!
//! Loaded from (in priority order):
//! 1. Environment variables (`KEYSTONE__` prefix, `__` separator)
//! 2. Config file (`keystone.toml`, optional)
//! 3. Defaults

use serde::Deserialize;

use crate::error::{KeystoneError, Result};

/// Top-level settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub backend: BackendConfig,
}

impl Settings {
    /// Load settings from `{file_prefix}.toml` (if present) and the
    /// environment.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("KEYSTONE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = cfg.try_deserialize()?;
        tracing::debug!(backend = %settings.backend.backend, "Settings loaded");
        Ok(settings)
    }
}

/// Which storage adapter to open and how to reach it.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BackendConfig {
    /// `memory`, `embedded`, or `networked`.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// File path for `embedded`, bolt URI for `networked`.
    #[serde(default)]
    pub connection: Option<String>,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Connection pool size for the networked adapter.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Rows fetched per round-trip by the networked adapter.
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

/// Parsed form of [`BackendConfig::backend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    Embedded,
    Networked,
}

impl BackendKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "embedded" => Ok(Self::Embedded),
            "networked" => Ok(Self::Networked),
            _ => Err(KeystoneError::UnknownBackend(value.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Embedded => "embedded",
            Self::Networked => "networked",
        }
    }
}

impl BackendConfig {
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn embedded(path: impl Into<String>) -> Self {
        Self {
            backend: "embedded".into(),
            connection: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn networked(uri: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            backend: "networked".into(),
            connection: Some(uri.into()),
            user: user.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    pub fn kind(&self) -> Result<BackendKind> {
        BackendKind::parse(&self.backend)
    }

    /// Embedded database path, `keystone.sqlite3` when unset.
    pub fn embedded_path(&self) -> &str {
        self.connection.as_deref().unwrap_or("keystone.sqlite3")
    }

    /// Networked bolt URI, `bolt://localhost:7687` when unset.
    pub fn networked_uri(&self) -> &str {
        self.connection.as_deref().unwrap_or("bolt://localhost:7687")
    }
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_max_connections() -> usize {
    16
}

fn default_fetch_size() -> usize {
    500
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            connection: None,
            user: default_user(),
            password: String::new(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
        }
    }
}
