// Tokenvault - Field value codecs
//
// Typed session fields are persisted as text. Roles are joined with ','
// which is therefore forbidden inside a role; an empty role list is stored
// as the empty string and read back as an empty list.

use crate::store::{FieldName, SecretValue};

use super::error::{CodecError, ValidationError};

/// Delimiter between serialized roles.
pub const ROLE_DELIMITER: char = ',';

/// `user_id` value reported when no identity is stored.
pub const ABSENT_USER_ID: i64 = -1;

pub fn encode_roles(roles: &[String]) -> Result<SecretValue, ValidationError> {
    for (index, role) in roles.iter().enumerate() {
        if role.contains(ROLE_DELIMITER) {
            return Err(ValidationError::RoleContainsDelimiter(role.clone()));
        }
        if role.is_empty() {
            return Err(ValidationError::EmptyRole(index));
        }
    }
    let delimiter = ROLE_DELIMITER.to_string();
    Ok(SecretValue::new(roles.join(delimiter.as_str())))
}

pub fn decode_roles(value: Option<&SecretValue>) -> Vec<String> {
    match value {
        Some(v) if !v.is_empty() => v
            .expose()
            .split(ROLE_DELIMITER)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

pub fn encode_user_id(user_id: i64) -> SecretValue {
    SecretValue::new(user_id.to_string())
}

pub fn decode_user_id(value: Option<&SecretValue>) -> Result<i64, CodecError> {
    match value {
        None => Ok(ABSENT_USER_ID),
        Some(v) => v.expose().parse::<i64>().map_err(|e| CodecError {
            field: FieldName::UserId,
            reason: e.to_string(),
        }),
    }
}

pub fn encode_flag(flag: bool) -> SecretValue {
    SecretValue::new(if flag { "true" } else { "false" })
}

pub fn decode_flag(field: FieldName, value: Option<&SecretValue>) -> Result<bool, CodecError> {
    match value.map(SecretValue::expose) {
        None => Ok(false),
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        Some(_) => Err(CodecError {
            field,
            reason: "expected 'true' or 'false'".to_string(),
        }),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
