// Tokenvault - Top-level error types
//
// Collapses enclave, store, and session errors into the caller-facing
// taxonomy. Variants carry rendered messages so the error is `Clone`: one
// failed provisioning attempt is handed to every caller that waited on it.

use thiserror::Error;

use crate::config::ConfigError;
use crate::enclave::EnclaveError;
use crate::session::{CodecError, ValidationError};
use crate::store::{FieldName, StoreError};

/// Top-level error type for all vault operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// The key oracle cannot produce or unseal the key (e.g. device locked).
    #[error("Key unavailable: {0}")]
    KeyUnavailable(String),

    /// The backing medium cannot be reached.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Ciphertext is present but failed authentication.
    #[error("Decryption failed for field '{field}': stored value may have been tampered with")]
    Decryption { field: FieldName },

    /// The caller violated a field or multi-field contract.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A value could not be (de)serialized for storage.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl VaultError {
    /// True when the failure suggests stored data was modified outside the vault.
    /// UIs should surface this rather than silently prompting for a new login.
    pub fn is_tamper_signal(&self) -> bool {
        matches!(self, VaultError::Decryption { .. })
    }
}

impl From<ConfigError> for VaultError {
    fn from(err: ConfigError) -> Self {
        VaultError::Validation(err.to_string())
    }
}

impl From<EnclaveError> for VaultError {
    fn from(err: EnclaveError) -> Self {
        VaultError::KeyUnavailable(err.to_string())
    }
}

impl From<StoreError> for VaultError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Decryption(field) => VaultError::Decryption { field },
            StoreError::Encoding(_) => VaultError::Serialization(err.to_string()),
            StoreError::KeyDerivation(_) => VaultError::KeyUnavailable(err.to_string()),
            StoreError::Database(_) | StoreError::Unavailable(_) | StoreError::Encryption(_) => {
                VaultError::StoreUnavailable(err.to_string())
            }
        }
    }
}

impl From<ValidationError> for VaultError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::RoleContainsDelimiter(_) => VaultError::Serialization(err.to_string()),
            _ => VaultError::Validation(err.to_string()),
        }
    }
}

impl From<CodecError> for VaultError {
    fn from(err: CodecError) -> Self {
        VaultError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decryption_maps_to_tamper_signal() {
        let err: VaultError = StoreError::Decryption(FieldName::AccessToken).into();
        assert_eq!(err, VaultError::Decryption { field: FieldName::AccessToken });
        assert!(err.is_tamper_signal());
    }

    #[test]
    fn test_locked_enclave_maps_to_key_unavailable() {
        let err: VaultError = EnclaveError::Locked("device locked".to_string()).into();
        assert!(matches!(err, VaultError::KeyUnavailable(_)));
        assert!(!err.is_tamper_signal());
    }

    #[test]
    fn test_config_error_maps_to_validation() {
        let err: VaultError = ConfigError::InvalidValue {
            var: "TOKENVAULT_BACKEND",
            reason: "unknown backend".to_string(),
        }
        .into();
        assert!(matches!(err, VaultError::Validation(msg) if msg.contains("TOKENVAULT_BACKEND")));
    }

    #[test]
    fn test_store_unavailable_mapping() {
        let err: VaultError = StoreError::Unavailable("disk gone".to_string()).into();
        assert!(matches!(err, VaultError::StoreUnavailable(_)));
    }

    #[test]
    fn test_delimiter_is_serialization_error() {
        let err: VaultError = ValidationError::RoleContainsDelimiter("a,b".to_string()).into();
        assert!(matches!(err, VaultError::Serialization(_)));

        let err: VaultError = ValidationError::EmptyRole(0).into();
        assert!(matches!(err, VaultError::Validation(_)));
    }
}
