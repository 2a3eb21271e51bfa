// Tokenvault - Store error types

use rusqlite::ErrorCode;
use thiserror::Error;

use super::FieldName;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("Backing store unavailable: {0}")]
    Unavailable(String),

    /// Ciphertext is present but failed authentication. Never reported as absent.
    #[error("Decryption failed for field '{0}': stored value failed authentication")]
    Decryption(FieldName),

    #[error("Encryption failed for field '{0}'")]
    Encryption(FieldName),

    #[error("Field key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Stored value for field '{0}' is not valid UTF-8")]
    Encoding(FieldName),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::PermissionDenied
                | ErrorCode::ReadOnly
                | ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull
                | ErrorCode::NotADatabase,
            ) => StoreError::Unavailable(err.to_string()),
            _ => StoreError::Database(err),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}
