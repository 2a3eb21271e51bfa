// Tokenvault - Session Module
//
// Derives session state from stored fields and plans validated writes.
// Nothing in here performs I/O.

mod codec;
mod engine;
mod error;

pub use codec::{
    decode_flag, decode_roles, decode_user_id, encode_flag, encode_roles, encode_user_id,
    ABSENT_USER_ID, ROLE_DELIMITER,
};
pub use engine::{
    check_identity_group, derive_login_state, plan_write, validate_write,
    SessionState, UserIdentity, WriteOp, MAX_EMAIL_LEN, MAX_TOKEN_LEN,
};
pub use error::{CodecError, ValidationError};
