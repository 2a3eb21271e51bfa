// Tokenvault - Session error types

use thiserror::Error;

use crate::store::FieldName;

/// A write the engine refuses to plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is too long ({len} bytes, maximum {max})")]
    TooLong {
        field: FieldName,
        len: usize,
        max: usize,
    },

    #[error("user id {0} is reserved as the absent marker")]
    ReservedUserId(i64),

    #[error("role {0:?} contains the reserved delimiter ','")]
    RoleContainsDelimiter(String),

    #[error("role at position {0} is empty")]
    EmptyRole(usize),

    #[error("identity fields must be written together, batch touched only {0:?}")]
    PartialIdentity(Vec<FieldName>),
}

/// A stored value that decrypted fine but does not parse as its field's type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("stored value for {field} is malformed: {reason}")]
pub struct CodecError {
    pub field: FieldName,
    pub reason: String,
}
