// Tokenvault - In-memory key oracle
//
// Keeps the key in process memory only. Used for ephemeral sessions and for
// tests that must not touch the real platform keyring. The `locked` switch
// simulates a device whose keystore refuses to unseal (e.g. before unlock);
// an unseal delay simulates one waiting on a user-presence prompt.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use zeroize::Zeroizing;

use super::provider::{KeyBacking, KeyHandle, KeyOracle, KEY_LEN};
use super::EnclaveError;

pub struct MemoryKeyOracle {
    key: Mutex<Option<Zeroizing<[u8; KEY_LEN]>>>,
    backing: KeyBacking,
    locked: AtomicBool,
    unseal_delay_ms: AtomicU64,
    wraps: AtomicUsize,
}

impl MemoryKeyOracle {
    /// A software-backed oracle with no key provisioned yet.
    pub fn new() -> Self {
        Self::with_backing(KeyBacking::Software)
    }

    /// An oracle that reports the given backing class.
    pub fn with_backing(backing: KeyBacking) -> Self {
        Self {
            key: Mutex::new(None),
            backing,
            locked: AtomicBool::new(false),
            unseal_delay_ms: AtomicU64::new(0),
            wraps: AtomicUsize::new(0),
        }
    }

    /// Pre-load a known key.
    pub fn with_key(material: [u8; KEY_LEN], backing: KeyBacking) -> Self {
        let oracle = Self::with_backing(backing);
        *oracle.slot() = Some(Zeroizing::new(material));
        oracle
    }

    /// Simulate the keystore becoming locked or unlocked.
    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::SeqCst);
    }

    /// Make every `wrap_key` call block for `delay` before answering.
    pub fn set_unseal_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.unseal_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Number of `wrap_key` calls that reached the keystore.
    pub fn wrap_count(&self) -> usize {
        self.wraps.load(Ordering::SeqCst)
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Zeroizing<[u8; KEY_LEN]>>> {
        self.key.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_unlocked(&self) -> Result<(), EnclaveError> {
        if self.locked.load(Ordering::SeqCst) {
            return Err(EnclaveError::Locked("in-memory keystore is locked".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryKeyOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyOracle for MemoryKeyOracle {
    fn backing(&self) -> KeyBacking {
        self.backing
    }

    fn wrap_key(&self) -> Result<KeyHandle, EnclaveError> {
        self.wraps.fetch_add(1, Ordering::SeqCst);

        let delay = self.unseal_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        self.ensure_unlocked()?;

        let mut slot = self.slot();
        if let Some(material) = slot.as_ref() {
            return KeyHandle::from_bytes(&material[..], self.backing);
        }

        let handle = KeyHandle::generate(self.backing);
        *slot = Some(Zeroizing::new(*handle.material()));
        Ok(handle)
    }

    fn has_key(&self) -> Result<bool, EnclaveError> {
        self.ensure_unlocked()?;
        Ok(self.slot().is_some())
    }

    fn delete_key(&self) -> Result<(), EnclaveError> {
        self.ensure_unlocked()?;
        *self.slot() = None;
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_key_is_stable_once_created() {
        let oracle = MemoryKeyOracle::new();
        let first = oracle.wrap_key().unwrap();
        let second = oracle.wrap_key().unwrap();
        assert_eq!(
            first.material(),
            second.material(),
            "Subsequent calls must return the same key"
        );
        assert_eq!(oracle.wrap_count(), 2);
    }

    #[test]
    fn test_preloaded_key_is_returned() {
        let oracle = MemoryKeyOracle::with_key([9u8; KEY_LEN], KeyBacking::Hardware);
        let handle = oracle.wrap_key().unwrap();
        assert_eq!(handle.material(), &[9u8; KEY_LEN]);
        assert_eq!(handle.backing(), KeyBacking::Hardware);
    }

    #[test]
    fn test_locked_oracle_refuses_to_unseal() {
        let oracle = MemoryKeyOracle::new();
        oracle.set_locked(true);
        assert!(matches!(oracle.wrap_key(), Err(EnclaveError::Locked(_))));

        oracle.set_locked(false);
        assert!(oracle.wrap_key().is_ok());
    }

    #[test]
    fn test_unseal_delay_blocks_wrap() {
        let oracle = MemoryKeyOracle::new();
        oracle.set_unseal_delay(Duration::from_millis(50));

        let started = std::time::Instant::now();
        oracle.wrap_key().unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_has_and_delete_key() {
        let oracle = MemoryKeyOracle::new();
        assert!(!oracle.has_key().unwrap());

        oracle.wrap_key().unwrap();
        assert!(oracle.has_key().unwrap());

        oracle.delete_key().unwrap();
        assert!(!oracle.has_key().unwrap());
        // Deleting when nothing exists should not error
        assert!(oracle.delete_key().is_ok());
    }
}
