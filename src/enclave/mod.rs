// Tokenvault - Enclave Module
//
// The key oracle: provisions the per-install master key and keeps it sealed
// in platform storage (OS keyring, key file, or memory). Raw key material is
// only exposed to the record store's cipher inside this crate.

mod error;
mod file;
mod memory;
mod provider;

pub use error::EnclaveError;
pub use file::FileKeyOracle;
pub use memory::MemoryKeyOracle;
pub use provider::{KeyBacking, KeyHandle, KeyOracle, KeyProtection, KeyringOracle, KEY_LEN};
