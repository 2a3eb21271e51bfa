// Tokenvault - Record data models
//
// SECURITY: values are wrapped in `SecretValue`, whose Debug output is always
// redacted and whose buffer is zeroized on drop. Field names are a closed set
// so a typo can never create a stray, unencrypted-looking entry.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// The fields a credential record can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    AccessToken,
    RefreshToken,
    UserId,
    UserEmail,
    UserRoles,
    BiometricEnabled,
}

impl FieldName {
    /// Every defined field, in schema order.
    pub const ALL: [FieldName; 6] = [
        FieldName::AccessToken,
        FieldName::RefreshToken,
        FieldName::UserId,
        FieldName::UserEmail,
        FieldName::UserRoles,
        FieldName::BiometricEnabled,
    ];

    /// The identity triple, which is only ever written as one unit.
    pub const IDENTITY: [FieldName; 3] =
        [FieldName::UserId, FieldName::UserEmail, FieldName::UserRoles];

    /// The token pair that login state is derived from.
    pub const TOKENS: [FieldName; 2] = [FieldName::AccessToken, FieldName::RefreshToken];

    /// Stable on-disk name. Changing these orphans existing records.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::AccessToken => "access_token",
            FieldName::RefreshToken => "refresh_token",
            FieldName::UserId => "user_id",
            FieldName::UserEmail => "user_email",
            FieldName::UserRoles => "user_roles",
            FieldName::BiometricEnabled => "biometric_enabled",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }

    pub fn is_identity(&self) -> bool {
        Self::IDENTITY.contains(self)
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decrypted field value. NEVER printed, logged, or Debug-displayed.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(Zeroizing<String>);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Access the raw value. Callers must not log it.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<String> for SecretValue {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretValue {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// A consistent snapshot of some or all fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialRecord {
    fields: BTreeMap<FieldName, SecretValue>,
}

impl CredentialRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: FieldName) -> Option<&SecretValue> {
        self.fields.get(&field)
    }

    pub fn insert(&mut self, field: FieldName, value: SecretValue) -> Option<SecretValue> {
        self.fields.insert(field, value)
    }

    pub fn remove(&mut self, field: FieldName) -> Option<SecretValue> {
        self.fields.remove(&field)
    }

    pub fn contains(&self, field: FieldName) -> bool {
        self.fields.contains_key(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = FieldName> + '_ {
        self.fields.keys().copied()
    }
}

impl FromIterator<(FieldName, SecretValue)> for CredentialRecord {
    fn from_iter<I: IntoIterator<Item = (FieldName, SecretValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// One plaintext change in a write batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Put(FieldName, SecretValue),
    Delete(FieldName),
}

impl Mutation {
    pub fn field(&self) -> FieldName {
        match self {
            Mutation::Put(field, _) | Mutation::Delete(field) => *field,
        }
    }
}

/// Ciphertext as persisted by a backend.
#[derive(Clone, PartialEq, Eq)]
pub struct SealedValue {
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

impl fmt::Debug for SealedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedValue")
            .field("nonce_len", &self.nonce.len())
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

/// One encrypted change handed to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SealedMutation {
    Put(FieldName, SealedValue),
    Delete(FieldName),
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_value_debug_redacts() {
        let value = SecretValue::new("eyJhbGciOiJIUzI1NiJ9.secret");
        let debug_output = format!("{:?}", value);
        assert_eq!(debug_output, "[REDACTED]");
    }

    #[test]
    fn test_record_debug_never_contains_values() {
        let record: CredentialRecord = [
            (FieldName::AccessToken, SecretValue::new("tok-A")),
            (FieldName::RefreshToken, SecretValue::new("ref-B")),
        ]
        .into_iter()
        .collect();

        let debug_output = format!("{:?}", record);
        assert!(!debug_output.contains("tok-A"));
        assert!(!debug_output.contains("ref-B"));
        assert!(debug_output.contains("AccessToken"));
    }

    #[test]
    fn test_field_names_round_trip() {
        for field in FieldName::ALL {
            assert_eq!(FieldName::parse(field.as_str()), Some(field));
        }
        assert_eq!(FieldName::parse("password"), None);
    }

    #[test]
    fn test_identity_membership() {
        assert!(FieldName::UserId.is_identity());
        assert!(FieldName::UserRoles.is_identity());
        assert!(!FieldName::AccessToken.is_identity());
        assert!(!FieldName::BiometricEnabled.is_identity());
    }

    #[test]
    fn test_field_name_serializes_as_snake_case() {
        let json = serde_json::to_string(&FieldName::BiometricEnabled).unwrap();
        assert_eq!(json, "\"biometric_enabled\"");
    }
}
