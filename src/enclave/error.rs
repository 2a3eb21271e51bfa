// Tokenvault - Enclave error types

use thiserror::Error;

use super::KeyBacking;

#[derive(Debug, Error)]
pub enum EnclaveError {
    #[error("Keyring error: {0}")]
    Keyring(String),

    #[error("Key store is locked or inaccessible: {0}")]
    Locked(String),

    #[error("Key file error: {0}")]
    KeyFile(#[from] std::io::Error),

    #[error("Stored key material is malformed ({0} bytes, expected {1})")]
    MalformedKey(usize, usize),

    #[error("Hardware-backed key storage required, but the key oracle is {0}-backed")]
    HardwareRequired(KeyBacking),
}
