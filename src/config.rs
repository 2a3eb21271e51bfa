// Tokenvault - Configuration
//
// Where the vault lives, which namespace it is scoped to, and how strict it
// is about key backing. Loaded from `TOKENVAULT_*` environment variables or
// built programmatically; serde-friendly so hosts can embed it in their own
// config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enclave::KeyProtection;

/// Default namespace (keyring service name and record scope).
pub const DEFAULT_NAMESPACE: &str = "com.tokenvault.session";

/// Default wait on a locked database before reporting the store unavailable.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Default wait on the key oracle (which may be showing an unlock prompt)
/// before reporting the key unavailable.
pub const DEFAULT_KEY_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },
}

/// Which medium holds the sealed records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// SQLite database at `store_path`.
    #[default]
    Sqlite,
    /// Process memory only; nothing survives a restart.
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub namespace: String,
    pub store_path: PathBuf,
    pub backend: BackendKind,
    pub key_protection: KeyProtection,
    pub busy_timeout_ms: u64,
    pub key_timeout_ms: u64,
}

/// Default directory for Tokenvault data files.
fn data_dir() -> PathBuf {
    let base = dirs_next::data_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("tokenvault")
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            store_path: data_dir().join("vault.db"),
            backend: BackendKind::default(),
            key_protection: KeyProtection::default(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            key_timeout_ms: DEFAULT_KEY_TIMEOUT_MS,
        }
    }
}

impl VaultConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(namespace) = lookup("TOKENVAULT_NAMESPACE") {
            if namespace.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    var: "TOKENVAULT_NAMESPACE",
                    reason: "must not be empty".to_string(),
                });
            }
            config.namespace = namespace;
        }

        if let Some(path) = lookup("TOKENVAULT_STORE_PATH") {
            config.store_path = PathBuf::from(path);
        }

        if let Some(backend) = lookup("TOKENVAULT_BACKEND") {
            config.backend = match backend.trim().to_ascii_lowercase().as_str() {
                "sqlite" => BackendKind::Sqlite,
                "memory" => BackendKind::Memory,
                other => {
                    return Err(ConfigError::InvalidValue {
                        var: "TOKENVAULT_BACKEND",
                        reason: format!("unknown backend '{}', expected 'sqlite' or 'memory'", other),
                    })
                }
            };
        }

        if let Some(protection) = lookup("TOKENVAULT_KEY_PROTECTION") {
            config.key_protection = protection.parse().map_err(|reason| ConfigError::InvalidValue {
                var: "TOKENVAULT_KEY_PROTECTION",
                reason,
            })?;
        }

        if let Some(timeout) = lookup("TOKENVAULT_BUSY_TIMEOUT_MS") {
            config.busy_timeout_ms = parse_millis("TOKENVAULT_BUSY_TIMEOUT_MS", &timeout)?;
        }

        if let Some(timeout) = lookup("TOKENVAULT_KEY_TIMEOUT_MS") {
            config.key_timeout_ms = parse_millis("TOKENVAULT_KEY_TIMEOUT_MS", &timeout)?;
        }

        Ok(config)
    }

    /// In-memory vault, for ephemeral sessions and tests.
    pub fn ephemeral(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            backend: BackendKind::Memory,
            ..Self::default()
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self.backend = BackendKind::Sqlite;
        self
    }

    pub fn with_key_protection(mut self, protection: KeyProtection) -> Self {
        self.key_protection = protection;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = saturating_millis(timeout);
        self
    }

    pub fn with_key_timeout(mut self, timeout: Duration) -> Self {
        self.key_timeout_ms = saturating_millis(timeout);
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Upper bound on key provisioning, including any unlock prompt.
    pub fn key_timeout(&self) -> Duration {
        Duration::from_millis(self.key_timeout_ms)
    }
}

fn parse_millis(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
            var,
            reason: e.to_string(),
        })
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
