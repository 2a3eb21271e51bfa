// Tokenvault - Library root
//
// Re-exports the enclave, store, session, and vault modules.

pub mod config;
pub mod enclave;
pub mod error;
pub mod session;
pub mod store;
pub mod vault;

pub use config::{BackendKind, ConfigError, VaultConfig};
pub use enclave::{KeyOracle, KeyProtection};
pub use error::{Result, VaultError};
pub use session::{SessionState, UserIdentity};
pub use store::{FieldName, SecretValue};
pub use vault::CredentialVault;
