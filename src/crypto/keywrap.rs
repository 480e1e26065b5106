//! src/crypto/keywrap.rs
//! RFC 3394 AES key wrap with an AES-256 key-encryption key.
//!
//! One primitive for every level of the hierarchy: class keys under the
//! passcode key, the manifest key and file keys under their class key.

use crate::aliases::{Aes256Key32, SecretBytes};
use crate::consts::{AES256_KEY_LEN, WRAPPED_KEY_LEN};
use crate::error::BackupError;

use aes_kw::KekAes256;

fn map_kw_error(e: aes_kw::Error) -> BackupError {
    match e {
        aes_kw::Error::IntegrityCheckFailed => BackupError::UnwrapIntegrity,
        other => BackupError::Crypto(format!("AES key wrap: {other}")),
    }
}

/// Unwrap a 40-byte RFC 3394 blob into a 32-byte AES-256 key.
///
/// # Errors
///
/// - [`BackupError::Crypto`] if `wrapped` is not exactly 40 bytes
/// - [`BackupError::UnwrapIntegrity`] if the 64-bit integrity check fails
pub fn unwrap_key(wrapped: &[u8], unwrapping_key: &Aes256Key32) -> Result<Aes256Key32, BackupError> {
    if wrapped.len() != WRAPPED_KEY_LEN {
        return Err(BackupError::Crypto(format!(
            "wrapped key is {} bytes, expected {WRAPPED_KEY_LEN}",
            wrapped.len()
        )));
    }

    let kek = KekAes256::from(*unwrapping_key.expose_secret());
    let mut out = Aes256Key32::new([0u8; AES256_KEY_LEN]);
    kek.unwrap(wrapped, out.expose_secret_mut())
        .map_err(map_kw_error)?;
    Ok(out)
}

/// Unwrap an RFC 3394 blob of any valid length (wrapped keys of 16, 24, 32, ... bytes).
pub fn unwrap_key_vec(wrapped: &[u8], unwrapping_key: &Aes256Key32) -> Result<SecretBytes, BackupError> {
    let kek = KekAes256::from(*unwrapping_key.expose_secret());
    let out = kek.unwrap_vec(wrapped).map_err(map_kw_error)?;
    Ok(SecretBytes::new(out))
}

/// Wrap `key` under `wrapping_key`. Output is `key.len() + 8` bytes.
///
/// Devices only ever hand us wrapped keys; this exists to build synthetic
/// backups (fixtures, tooling) with the same primitive.
pub fn wrap_key(key: &[u8], wrapping_key: &Aes256Key32) -> Result<Vec<u8>, BackupError> {
    let kek = KekAes256::from(*wrapping_key.expose_secret());
    kek.wrap_vec(key).map_err(map_kw_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rfc_kek() -> Aes256Key32 {
        Aes256Key32::new(core::array::from_fn(|i| i as u8))
    }

    // RFC 3394 §4.6: 256 bits of key data with a 256-bit KEK
    const RFC_4_6_WRAPPED: &str =
        "28c9f404c4b810f4cbccb35cfb87f8263f5786e2d80ed326cbc7f0e71a99f43bfb988b9b7a02dd21";
    const RFC_4_6_KEY: &str = "00112233445566778899aabbccddeeff000102030405060708090a0b0c0d0e0f";

    #[test]
    fn rfc3394_known_answer() {
        let wrapped = hex::decode(RFC_4_6_WRAPPED).unwrap();
        let key = unwrap_key(&wrapped, &rfc_kek()).unwrap();
        assert_eq!(hex::encode(key.expose_secret()), RFC_4_6_KEY);
    }

    #[test]
    fn wrap_matches_rfc() {
        let key = hex::decode(RFC_4_6_KEY).unwrap();
        assert_eq!(hex::encode(wrap_key(&key, &rfc_kek()).unwrap()), RFC_4_6_WRAPPED);
    }

    #[test]
    fn wrong_length_is_crypto_error() {
        let err = unwrap_key(&[0u8; 24], &rfc_kek()).unwrap_err();
        assert!(matches!(err, BackupError::Crypto(_)));
    }

    #[test]
    fn wrong_kek_fails_integrity() {
        let wrapped = hex::decode(RFC_4_6_WRAPPED).unwrap();
        let other = Aes256Key32::new([0x5A; 32]);
        assert!(matches!(
            unwrap_key(&wrapped, &other),
            Err(BackupError::UnwrapIntegrity)
        ));
    }
}
