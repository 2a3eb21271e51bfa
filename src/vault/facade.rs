// Tokenvault - Credential vault
//
// The public entry point. One `CredentialVault` per namespace, constructed
// once and shared through `Arc`. The first operation provisions the key and
// opens the backing store behind an `InitGate`; every operation after that is
// session-engine planning followed by one record-store call on the blocking
// pool.

use std::sync::Arc;

use crate::config::{BackendKind, VaultConfig};
use crate::enclave::{KeyOracle, KeyringOracle};
use crate::error::{Result, VaultError};
use crate::session::{
    decode_flag, decode_roles, decode_user_id, plan_write, SessionState, UserIdentity, WriteOp,
    ABSENT_USER_ID,
};
use crate::store::{
    CredentialRecord, Database, EncryptedRecordStore, FieldName, MemoryBackend, RecordStore,
    SecretValue,
};

use super::gate::InitGate;

pub struct CredentialVault {
    config: VaultConfig,
    oracle: Arc<dyn KeyOracle>,
    store: InitGate<Arc<dyn RecordStore>>,
}

impl CredentialVault {
    /// Build a vault over an explicit key oracle. Nothing is touched until
    /// the first operation.
    pub fn new(config: VaultConfig, oracle: Arc<dyn KeyOracle>) -> Self {
        Self {
            config,
            oracle,
            store: InitGate::new(),
        }
    }

    /// Build a vault keyed by the platform keyring under the configured namespace.
    pub fn open(config: VaultConfig) -> Self {
        let oracle = Arc::new(KeyringOracle::new(&config.namespace));
        Self::new(config, oracle)
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// True once the key has been unsealed and the store opened.
    pub fn is_provisioned(&self) -> bool {
        self.store.is_initialized()
    }

    // ─── Tokens ──────────────────────────────────────────────────────────

    pub async fn store_access_token(&self, token: impl Into<SecretValue>) -> Result<()> {
        self.write(WriteOp::AccessToken(token.into())).await
    }

    pub async fn get_access_token(&self) -> Result<Option<SecretValue>> {
        self.read_field(FieldName::AccessToken).await
    }

    pub async fn store_refresh_token(&self, token: impl Into<SecretValue>) -> Result<()> {
        self.write(WriteOp::RefreshToken(token.into())).await
    }

    pub async fn get_refresh_token(&self) -> Result<Option<SecretValue>> {
        self.read_field(FieldName::RefreshToken).await
    }

    /// Store both tokens in one transaction, e.g. after login or a refresh.
    pub async fn store_session(
        &self,
        access: impl Into<SecretValue>,
        refresh: impl Into<SecretValue>,
    ) -> Result<()> {
        self.write(WriteOp::TokenPair {
            access: access.into(),
            refresh: refresh.into(),
        })
        .await
    }

    // ─── Identity ────────────────────────────────────────────────────────

    /// Replace the stored identity. A `None` email removes any previous one.
    pub async fn store_user_data(
        &self,
        user_id: i64,
        email: Option<String>,
        roles: Vec<String>,
    ) -> Result<()> {
        self.write(WriteOp::UserData(UserIdentity {
            user_id,
            email,
            roles,
        }))
        .await
    }

    /// Stored user id, or `-1` when none is stored.
    pub async fn get_user_id(&self) -> Result<i64> {
        let value = self.read_field(FieldName::UserId).await?;
        Ok(decode_user_id(value.as_ref())?)
    }

    pub async fn get_user_email(&self) -> Result<Option<String>> {
        let value = self.read_field(FieldName::UserEmail).await?;
        Ok(value.map(|v| v.expose().to_string()))
    }

    /// Stored roles in their original order, or empty when none are stored.
    pub async fn get_user_roles(&self) -> Result<Vec<String>> {
        let value = self.read_field(FieldName::UserRoles).await?;
        Ok(decode_roles(value.as_ref()))
    }

    /// The identity triple from one consistent read, or `None` if no user id is stored.
    pub async fn user_identity(&self) -> Result<Option<UserIdentity>> {
        let record = self.snapshot(&FieldName::IDENTITY).await?;

        let user_id = decode_user_id(record.get(FieldName::UserId))?;
        if user_id == ABSENT_USER_ID {
            return Ok(None);
        }

        Ok(Some(UserIdentity {
            user_id,
            email: record
                .get(FieldName::UserEmail)
                .map(|v| v.expose().to_string()),
            roles: decode_roles(record.get(FieldName::UserRoles)),
        }))
    }

    // ─── Session ─────────────────────────────────────────────────────────

    pub async fn is_user_logged_in(&self) -> Result<bool> {
        Ok(self.session_state().await? == SessionState::LoggedIn)
    }

    pub async fn session_state(&self) -> Result<SessionState> {
        let record = self.snapshot(&FieldName::TOKENS).await?;
        Ok(SessionState::from_record(&record))
    }

    // ─── Preferences ─────────────────────────────────────────────────────

    /// Persist the biometric preference. Enforcing it is up to the caller.
    pub async fn set_biometric_enabled(&self, enabled: bool) -> Result<()> {
        self.write(WriteOp::Biometric(enabled)).await
    }

    pub async fn is_biometric_enabled(&self) -> Result<bool> {
        let value = self.read_field(FieldName::BiometricEnabled).await?;
        Ok(decode_flag(FieldName::BiometricEnabled, value.as_ref())?)
    }

    // ─── Logout ──────────────────────────────────────────────────────────

    /// Remove every field in one transaction. Safe to call repeatedly.
    pub async fn clear_all_data(&self) -> Result<()> {
        let store = self.store().await?;
        run_blocking(move || store.clear_all()).await?;
        tracing::info!(namespace = %self.config.namespace, "Cleared all session data");
        Ok(())
    }

    // ─── Internals ───────────────────────────────────────────────────────

    async fn store(&self) -> Result<Arc<dyn RecordStore>> {
        self.store
            .get_or_try_init(|| async {
                let config = self.config.clone();
                let oracle = Arc::clone(&self.oracle);
                let limit = config.key_timeout();
                let attempt = run_blocking(move || provision(&config, oracle.as_ref()));

                // An unanswered unlock prompt must not hold every caller forever.
                tokio::time::timeout(limit, attempt).await.unwrap_or_else(|_| {
                    tracing::warn!(
                        namespace = %self.config.namespace,
                        timeout_ms = self.config.key_timeout_ms,
                        "Key provisioning timed out"
                    );
                    Err(VaultError::KeyUnavailable(format!(
                        "key oracle did not respond within {:?}",
                        limit
                    )))
                })
            })
            .await
    }

    async fn write(&self, op: WriteOp) -> Result<()> {
        // Reject bad input before the keystore is ever consulted.
        let batch = plan_write(op)?;
        let store = self.store().await?;
        run_blocking(move || store.apply(&batch)).await
    }

    async fn read_field(&self, field: FieldName) -> Result<Option<SecretValue>> {
        let store = self.store().await?;
        run_blocking(move || store.get(field)).await
    }

    async fn snapshot(&self, fields: &[FieldName]) -> Result<CredentialRecord> {
        let store = self.store().await?;
        let fields = fields.to_vec();
        run_blocking(move || store.snapshot(&fields)).await
    }
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("namespace", &self.config.namespace)
            .field("backend", &self.config.backend)
            .field("provisioned", &self.is_provisioned())
            .finish()
    }
}

/// Unseal the key and open the configured backend.
fn provision(config: &VaultConfig, oracle: &dyn KeyOracle) -> Result<Arc<dyn RecordStore>> {
    let backing = oracle.backing();
    config.key_protection.admit(backing)?;

    let key = oracle.wrap_key().inspect_err(|e| {
        tracing::warn!(namespace = %config.namespace, error = %e, "Key oracle refused to provide key");
    })?;

    let store: Arc<dyn RecordStore> = match config.backend {
        BackendKind::Sqlite => {
            let db = Database::open(&config.store_path, config.busy_timeout())?;
            Arc::new(EncryptedRecordStore::new(db, &key, &config.namespace))
        }
        BackendKind::Memory => Arc::new(EncryptedRecordStore::new(
            MemoryBackend::new(),
            &key,
            &config.namespace,
        )),
    };

    tracing::info!(
        namespace = %config.namespace,
        backend = ?config.backend,
        key_backing = %backing,
        "Credential vault provisioned"
    );

    Ok(store)
}

/// Run store work on the blocking pool. Once spawned it runs to completion
/// even if the awaiting future is dropped.
async fn run_blocking<T, E, F>(work: F) -> Result<T>
where
    F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<VaultError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| VaultError::StoreUnavailable(format!("storage task failed: {}", e)))?
        .map_err(Into::into)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
