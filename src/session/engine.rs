// Tokenvault - Session State Engine
//
// Pure functions over record snapshots and write requests. Login state is
// always recomputed from the token pair, never stored. Writes are turned into
// mutation batches here, and this is the layer that guarantees the identity
// triple (id, email, roles) is only ever written as a whole.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::store::{CredentialRecord, FieldName, Mutation, SecretValue};

use super::codec::{encode_flag, encode_roles, encode_user_id, ABSENT_USER_ID};
use super::error::ValidationError;

/// Maximum accepted length of a single token, in bytes.
pub const MAX_TOKEN_LEN: usize = 16 * 1024;

/// Maximum accepted length of an email address, in bytes.
pub const MAX_EMAIL_LEN: usize = 320;

/// The only two session states callers ever observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    LoggedOut,
    LoggedIn,
}

impl SessionState {
    pub fn from_record(record: &CredentialRecord) -> Self {
        if derive_login_state(record) {
            SessionState::LoggedIn
        } else {
            SessionState::LoggedOut
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::LoggedOut => write!(f, "logged out"),
            SessionState::LoggedIn => write!(f, "logged in"),
        }
    }
}

/// Identity fields for the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: i64,
    pub email: Option<String>,
    pub roles: Vec<String>,
}

/// A logical write requested through the facade.
#[derive(Debug, Clone)]
pub enum WriteOp {
    AccessToken(SecretValue),
    RefreshToken(SecretValue),
    /// Both tokens in one unit, e.g. right after login or refresh.
    TokenPair {
        access: SecretValue,
        refresh: SecretValue,
    },
    UserData(UserIdentity),
    Biometric(bool),
}

/// Logged in iff both tokens are present and non-empty.
pub fn derive_login_state(record: &CredentialRecord) -> bool {
    let present = |field: FieldName| record.get(field).is_some_and(|v| !v.is_empty());
    present(FieldName::AccessToken) && present(FieldName::RefreshToken)
}

fn check_len(field: FieldName, len: usize, max: usize) -> Result<(), ValidationError> {
    if len > max {
        return Err(ValidationError::TooLong { field, len, max });
    }
    Ok(())
}

/// Check a write request's values without touching storage.
pub fn validate_write(op: &WriteOp) -> Result<(), ValidationError> {
    match op {
        WriteOp::AccessToken(token) => check_len(FieldName::AccessToken, token.len(), MAX_TOKEN_LEN),
        WriteOp::RefreshToken(token) => {
            check_len(FieldName::RefreshToken, token.len(), MAX_TOKEN_LEN)
        }
        WriteOp::TokenPair { access, refresh } => {
            check_len(FieldName::AccessToken, access.len(), MAX_TOKEN_LEN)?;
            check_len(FieldName::RefreshToken, refresh.len(), MAX_TOKEN_LEN)
        }
        WriteOp::UserData(identity) => {
            if identity.user_id == ABSENT_USER_ID {
                return Err(ValidationError::ReservedUserId(identity.user_id));
            }
            if let Some(email) = &identity.email {
                check_len(FieldName::UserEmail, email.len(), MAX_EMAIL_LEN)?;
            }
            encode_roles(&identity.roles).map(|_| ())
        }
        WriteOp::Biometric(_) => Ok(()),
    }
}

/// Reject a batch that touches some, but not all, of the identity fields.
pub fn check_identity_group(batch: &[Mutation]) -> Result<(), ValidationError> {
    let mut touched: Vec<FieldName> = batch
        .iter()
        .map(Mutation::field)
        .filter(FieldName::is_identity)
        .collect();
    touched.sort();
    touched.dedup();

    if !touched.is_empty() && touched.len() != FieldName::IDENTITY.len() {
        return Err(ValidationError::PartialIdentity(touched));
    }
    Ok(())
}

/// Validate a write and expand it into the batch the record store commits.
pub fn plan_write(op: WriteOp) -> Result<Vec<Mutation>, ValidationError> {
    validate_write(&op)?;

    let batch = match op {
        WriteOp::AccessToken(token) => vec![Mutation::Put(FieldName::AccessToken, token)],
        WriteOp::RefreshToken(token) => vec![Mutation::Put(FieldName::RefreshToken, token)],
        WriteOp::TokenPair { access, refresh } => vec![
            Mutation::Put(FieldName::AccessToken, access),
            Mutation::Put(FieldName::RefreshToken, refresh),
        ],
        WriteOp::UserData(identity) => {
            // A missing email must clear the previous one in the same unit.
            let email = match identity.email {
                Some(email) => Mutation::Put(FieldName::UserEmail, SecretValue::new(email)),
                None => Mutation::Delete(FieldName::UserEmail),
            };
            vec![
                Mutation::Put(FieldName::UserId, encode_user_id(identity.user_id)),
                email,
                Mutation::Put(FieldName::UserRoles, encode_roles(&identity.roles)?),
            ]
        }
        WriteOp::Biometric(enabled) => {
            vec![Mutation::Put(FieldName::BiometricEnabled, encode_flag(enabled))]
        }
    };

    check_identity_group(&batch)?;
    Ok(batch)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
