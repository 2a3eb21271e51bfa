// Tokenvault - Initialization gate
//
// Runs a fallible async initializer at most once at a time. Success is
// memoized forever. A failure is handed to every caller that was already
// waiting on that attempt; callers arriving afterwards start a fresh attempt
// (a keystore that was locked may since have been unlocked).

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use tokio::sync::Mutex;

use crate::error::VaultError;

pub struct InitGate<T> {
    value: OnceLock<T>,
    /// Number of attempts that have finished with an error.
    failures: AtomicU64,
    last_failure: Mutex<Option<VaultError>>,
}

impl<T: Clone> InitGate<T> {
    pub fn new() -> Self {
        Self {
            value: OnceLock::new(),
            failures: AtomicU64::new(0),
            last_failure: Mutex::new(None),
        }
    }

    /// The memoized value, if an attempt has already succeeded.
    pub fn get(&self) -> Option<T> {
        self.value.get().cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.value.get().is_some()
    }

    pub async fn get_or_try_init<F, Fut>(&self, init: F) -> Result<T, VaultError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, VaultError>>,
    {
        if let Some(value) = self.value.get() {
            return Ok(value.clone());
        }

        let seen = self.failures.load(Ordering::Acquire);
        let mut last_failure = self.last_failure.lock().await;

        if let Some(value) = self.value.get() {
            return Ok(value.clone());
        }

        // An attempt failed while we were queued behind it.
        if self.failures.load(Ordering::Acquire) != seen {
            if let Some(err) = last_failure.as_ref() {
                return Err(err.clone());
            }
        }

        match init().await {
            Ok(value) => {
                *last_failure = None;
                Ok(self.value.get_or_init(|| value).clone())
            }
            Err(err) => {
                *last_failure = Some(err.clone());
                self.failures.fetch_add(1, Ordering::AcqRel);
                Err(err)
            }
        }
    }
}

impl<T: Clone> Default for InitGate<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
