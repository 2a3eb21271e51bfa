// Tokenvault - Key Oracle
//
// Manages the lifecycle of the per-install master key that protects every
// stored field. The master key lives in the platform's native keystore and is
// only ever held in process memory inside a `Zeroizing` buffer.
//
// Flow:
//   1. `wrap_key()` retrieves the sealed key, or generates + seals a new one
//   2. The record store derives one subkey per field from the handle (HKDF)
//   3. The handle is dropped (and zeroized) once the store has its cipher

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::EnclaveError;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Length of the master key in bytes (256-bit).
pub const KEY_LEN: usize = 32;

/// Username for the keyring entry holding the master key.
const KEYRING_USER: &str = "master-key";

// ─── Key Handle ──────────────────────────────────────────────────────────────

/// Protection class of the storage an oracle seals its key into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyBacking {
    Hardware,
    Software,
}

impl fmt::Display for KeyBacking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyBacking::Hardware => write!(f, "hardware"),
            KeyBacking::Software => write!(f, "software"),
        }
    }
}

/// Opaque handle to unsealed key material. Never printed, zeroized on drop.
pub struct KeyHandle {
    material: Zeroizing<[u8; KEY_LEN]>,
    backing: KeyBacking,
}

impl KeyHandle {
    /// Build a handle from raw bytes, rejecting anything that isn't exactly `KEY_LEN`.
    pub fn from_bytes(bytes: &[u8], backing: KeyBacking) -> Result<Self, EnclaveError> {
        if bytes.len() != KEY_LEN {
            return Err(EnclaveError::MalformedKey(bytes.len(), KEY_LEN));
        }
        let mut material = Zeroizing::new([0u8; KEY_LEN]);
        material.copy_from_slice(bytes);
        Ok(Self { material, backing })
    }

    /// Generate fresh key material from the OS CSPRNG.
    pub fn generate(backing: KeyBacking) -> Self {
        let mut material = Zeroizing::new([0u8; KEY_LEN]);
        rand::rng().fill_bytes(&mut material[..]);
        Self { material, backing }
    }

    pub fn backing(&self) -> KeyBacking {
        self.backing
    }

    pub(crate) fn material(&self) -> &[u8; KEY_LEN] {
        &self.material
    }
}

impl fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyHandle")
            .field("backing", &self.backing)
            .field("material", &"[REDACTED]")
            .finish()
    }
}

// ─── Protection Policy ───────────────────────────────────────────────────────

/// Requested key-protection strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyProtection {
    /// Fail if the oracle cannot provide hardware backing.
    Strict,
    /// Accept a software-backed oracle without complaint.
    #[default]
    Permissive,
}

impl KeyProtection {
    /// Decide whether an oracle with the given backing may be used.
    ///
    /// This is a configuration-time check. It never downgrades a hardware
    /// oracle that fails at runtime; that failure is always surfaced.
    pub fn admit(&self, backing: KeyBacking) -> Result<(), EnclaveError> {
        match (self, backing) {
            (KeyProtection::Strict, KeyBacking::Software) => {
                Err(EnclaveError::HardwareRequired(backing))
            }
            (KeyProtection::Permissive, KeyBacking::Software) => {
                tracing::debug!("Accepting software-backed key oracle (permissive protection)");
                Ok(())
            }
            (_, KeyBacking::Hardware) => Ok(()),
        }
    }
}

impl FromStr for KeyProtection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(KeyProtection::Strict),
            "permissive" => Ok(KeyProtection::Permissive),
            other => Err(format!(
                "unknown key protection '{}', expected 'strict' or 'permissive'",
                other
            )),
        }
    }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the platform key-wrapping service, enabling per-OS
/// backends and in-memory implementations for testing.
pub trait KeyOracle: Send + Sync {
    /// Protection class of the underlying key storage.
    fn backing(&self) -> KeyBacking;

    /// Return the provisioned key, generating and sealing a new one on first use.
    /// Idempotent: repeated calls return the same key material.
    fn wrap_key(&self) -> Result<KeyHandle, EnclaveError>;

    /// Check if a key has already been provisioned.
    fn has_key(&self) -> Result<bool, EnclaveError>;

    /// Delete the sealed key. Deleting an absent key is not an error.
    /// WARNING: every record encrypted under it becomes irrecoverable.
    fn delete_key(&self) -> Result<(), EnclaveError>;
}

// ─── Platform Implementation ─────────────────────────────────────────────────

/// Production oracle using the `keyring` crate.
/// Dispatches to:
///   - macOS/iOS: Security.framework Keychain
///   - Windows: Windows Credential Manager
///   - Linux: D-Bus Secret Service (GNOME Keyring / KDE Wallet)
pub struct KeyringOracle {
    service: String,
    user: String,
}

impl KeyringOracle {
    /// Create an oracle scoped to a store namespace.
    pub fn new(namespace: &str) -> Self {
        Self {
            service: namespace.to_string(),
            user: KEYRING_USER.to_string(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, EnclaveError> {
        keyring::Entry::new(&self.service, &self.user).map_err(Self::classify)
    }

    fn classify(err: keyring::Error) -> EnclaveError {
        match err {
            keyring::Error::NoStorageAccess(e) => EnclaveError::Locked(e.to_string()),
            other => EnclaveError::Keyring(other.to_string()),
        }
    }
}

impl KeyOracle for KeyringOracle {
    fn backing(&self) -> KeyBacking {
        if cfg!(any(target_os = "macos", target_os = "ios", target_os = "windows")) {
            KeyBacking::Hardware
        } else {
            KeyBacking::Software
        }
    }

    fn wrap_key(&self) -> Result<KeyHandle, EnclaveError> {
        let entry = self.entry()?;

        match entry.get_secret() {
            Ok(secret) => {
                let secret = Zeroizing::new(secret);
                tracing::debug!("Retrieved existing master key from keyring");
                KeyHandle::from_bytes(&secret, self.backing())
            }
            Err(keyring::Error::NoEntry) => {
                tracing::info!(service = %self.service, "No master key found, generating one");
                let handle = KeyHandle::generate(self.backing());
                entry
                    .set_secret(handle.material())
                    .map_err(Self::classify)?;
                tracing::info!("Master key sealed in platform keyring");

                // Another process may have sealed its own key in the meantime.
                // The stored entry is authoritative.
                let stored = Zeroizing::new(entry.get_secret().map_err(Self::classify)?);
                if stored.as_slice() != handle.material().as_slice() {
                    tracing::warn!(service = %self.service, "Master key was replaced by a concurrent writer, using stored key");
                }
                KeyHandle::from_bytes(&stored, self.backing())
            }
            Err(e) => Err(Self::classify(e)),
        }
    }

    fn has_key(&self) -> Result<bool, EnclaveError> {
        let entry = self.entry()?;
        match entry.get_secret() {
            Ok(secret) => {
                drop(Zeroizing::new(secret));
                Ok(true)
            }
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(Self::classify(e)),
        }
    }

    fn delete_key(&self) -> Result<(), EnclaveError> {
        let entry = self.entry()?;
        match entry.delete_credential() {
            Ok(()) => {
                tracing::warn!(service = %self.service, "Master key deleted from keyring, stored records are now irrecoverable");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => {
                tracing::debug!("No master key to delete");
                Ok(())
            }
            Err(e) => Err(Self::classify(e)),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
