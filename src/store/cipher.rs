// Tokenvault - Per-field authenticated encryption
//
// Every field gets its own subkey: HKDF-SHA256 over the master key with the
// namespace and field name in `info`. The same pair is bound again as AEAD
// associated data, so ciphertext copied from one field to another (or from
// another namespace) fails authentication instead of decrypting.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::enclave::{KeyHandle, KEY_LEN};

use super::models::{FieldName, SealedValue, SecretValue};
use super::StoreError;

/// Domain separation for field subkeys.
const FIELD_KEY_DOMAIN: &str = "tokenvault:field-key:v1";

/// XChaCha20 nonce length in bytes.
pub const NONCE_LEN: usize = 24;

pub struct FieldCipher {
    master: Zeroizing<[u8; KEY_LEN]>,
    namespace: String,
}

impl FieldCipher {
    pub fn new(key: &KeyHandle, namespace: &str) -> Self {
        Self {
            master: Zeroizing::new(*key.material()),
            namespace: namespace.to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn field_key(&self, field: FieldName) -> Result<Zeroizing<[u8; KEY_LEN]>, StoreError> {
        let info = format!("{}:{}:{}", FIELD_KEY_DOMAIN, self.namespace, field.as_str());
        let hkdf = Hkdf::<Sha256>::new(None, &self.master[..]);
        let mut okm = Zeroizing::new([0u8; KEY_LEN]);
        hkdf.expand(info.as_bytes(), &mut okm[..])
            .map_err(|e| StoreError::KeyDerivation(e.to_string()))?;
        Ok(okm)
    }

    fn associated_data(&self, field: FieldName) -> Vec<u8> {
        format!("{}:{}", self.namespace, field.as_str()).into_bytes()
    }

    /// Encrypt a value for `field` under a fresh random nonce.
    pub fn seal(&self, field: FieldName, value: &SecretValue) -> Result<SealedValue, StoreError> {
        let key = self.field_key(field)?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&key[..]));

        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let aad = self.associated_data(field);
        let ciphertext = cipher
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: value.expose().as_bytes(),
                    aad: &aad,
                },
            )
            .map_err(|_| StoreError::Encryption(field))?;

        Ok(SealedValue {
            nonce: nonce.to_vec(),
            ciphertext,
        })
    }

    /// Decrypt and authenticate a stored value for `field`.
    pub fn open(&self, field: FieldName, sealed: &SealedValue) -> Result<SecretValue, StoreError> {
        if sealed.nonce.len() != NONCE_LEN {
            return Err(StoreError::Decryption(field));
        }

        let key = self.field_key(field)?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&key[..]));
        let aad = self.associated_data(field);

        let plaintext = cipher
            .decrypt(
                XNonce::from_slice(&sealed.nonce),
                Payload {
                    msg: &sealed.ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| StoreError::Decryption(field))?;

        match String::from_utf8(plaintext) {
            Ok(text) => Ok(SecretValue::new(text)),
            Err(e) => {
                e.into_bytes().zeroize();
                Err(StoreError::Encoding(field))
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enclave::KeyBacking;

    fn cipher(seed: u8, namespace: &str) -> FieldCipher {
        let key = KeyHandle::from_bytes(&[seed; KEY_LEN], KeyBacking::Software).unwrap();
        FieldCipher::new(&key, namespace)
    }

    #[test]
    fn test_seal_then_open() {
        let c = cipher(1, "ns");
        let sealed = c.seal(FieldName::AccessToken, &"tok-A".into()).unwrap();
        let opened = c.open(FieldName::AccessToken, &sealed).unwrap();
        assert_eq!(opened.expose(), "tok-A");
    }

    #[test]
    fn test_ciphertext_does_not_contain_plaintext() {
        let c = cipher(1, "ns");
        let sealed = c
            .seal(FieldName::RefreshToken, &"plain-refresh-token".into())
            .unwrap();
        let haystack = String::from_utf8_lossy(&sealed.ciphertext);
        assert!(!haystack.contains("plain-refresh-token"));
    }

    #[test]
    fn test_nonces_are_fresh_per_write() {
        let c = cipher(1, "ns");
        let a = c.seal(FieldName::AccessToken, &"same".into()).unwrap();
        let b = c.seal(FieldName::AccessToken, &"same".into()).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_tampered_ciphertext_fails_authentication() {
        let c = cipher(1, "ns");
        let mut sealed = c.seal(FieldName::AccessToken, &"tok-A".into()).unwrap();
        sealed.ciphertext[0] ^= 0x01;

        let err = c.open(FieldName::AccessToken, &sealed).unwrap_err();
        assert!(matches!(err, StoreError::Decryption(FieldName::AccessToken)));
    }

    #[test]
    fn test_ciphertext_cannot_be_moved_between_fields() {
        let c = cipher(1, "ns");
        let sealed = c.seal(FieldName::RefreshToken, &"ref-B".into()).unwrap();

        let err = c.open(FieldName::AccessToken, &sealed).unwrap_err();
        assert!(matches!(err, StoreError::Decryption(FieldName::AccessToken)));
    }

    #[test]
    fn test_ciphertext_cannot_be_moved_between_namespaces() {
        let a = cipher(1, "app.one");
        let b = cipher(1, "app.two");
        let sealed = a.seal(FieldName::UserEmail, &"a@x.com".into()).unwrap();

        assert!(matches!(
            b.open(FieldName::UserEmail, &sealed),
            Err(StoreError::Decryption(FieldName::UserEmail))
        ));
    }

    #[test]
    fn test_wrong_master_key_fails() {
        let sealed = cipher(1, "ns")
            .seal(FieldName::UserId, &"42".into())
            .unwrap();
        assert!(cipher(2, "ns").open(FieldName::UserId, &sealed).is_err());
    }

    #[test]
    fn test_truncated_nonce_is_a_decryption_error() {
        let c = cipher(1, "ns");
        let mut sealed = c.seal(FieldName::UserId, &"42".into()).unwrap();
        sealed.nonce.truncate(12);
        assert!(matches!(
            c.open(FieldName::UserId, &sealed),
            Err(StoreError::Decryption(FieldName::UserId))
        ));
    }
}
