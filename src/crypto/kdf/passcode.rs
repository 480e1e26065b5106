//! src/crypto/kdf/passcode.rs
//! Backup passcode KDF: PBKDF2-HMAC-SHA256 (DPSL/DPIC) then PBKDF2-HMAC-SHA1 (SALT/ITER)

use crate::aliases::{KeyEncryptionKey32, PasswordString, SpanBuffer};
use crate::error::BackupError;
use crate::keybag::Keybag;

use hmac::Hmac;
use pbkdf2::pbkdf2;
use sha1::Sha1;
use sha2::Sha256;

/// Salt/iteration pairs the derivation reads from the keybag.
#[derive(Debug, Clone, Copy)]
pub struct PasscodeKdfParams<'a> {
    pub dp_salt: &'a [u8],
    pub dp_iterations: u32,
    pub salt: &'a [u8],
    pub iterations: u32,
}

impl<'a> PasscodeKdfParams<'a> {
    /// Pull `DPSL`/`DPIC` and `SALT`/`ITER` out of the keybag.
    ///
    /// # Errors
    ///
    /// [`BackupError::MalformedKeybag`] if any of the four attributes is missing
    /// or has the wrong kind.
    pub fn from_keybag(keybag: &'a Keybag) -> Result<Self, BackupError> {
        Ok(Self {
            dp_salt: keybag.bytes_attribute(b"DPSL")?,
            dp_iterations: keybag.integer_attribute(b"DPIC")?,
            salt: keybag.bytes_attribute(b"SALT")?,
            iterations: keybag.integer_attribute(b"ITER")?,
        })
    }
}

/// Derive the key-encryption key directly into `out_key`.
///
/// - Round 1: PBKDF2-HMAC-SHA256(password, DPSL, DPIC) → 32 bytes
/// - Round 2: PBKDF2-HMAC-SHA1(round 1, SALT, ITER) → 32 bytes
///
/// Iteration counts run into the millions on real devices; this blocks for
/// seconds.
#[inline(always)]
pub fn derive_secure_passcode_key(
    password: &PasswordString,
    params: &PasscodeKdfParams<'_>,
    out_key: &mut KeyEncryptionKey32,
) -> Result<(), BackupError> {
    if params.dp_iterations == 0 || params.iterations == 0 {
        return Err(BackupError::MalformedKeybag(
            "PBKDF2 iteration count must be ≥1".into(),
        ));
    }

    let mut round1 = SpanBuffer::<32>::new([0u8; 32]);
    pbkdf2::<Hmac<Sha256>>(
        password.expose_secret().as_bytes(),
        params.dp_salt,
        params.dp_iterations,
        round1.expose_secret_mut(),
    )
    .map_err(|e| BackupError::Crypto(format!("PBKDF2-SHA256 failed: {e}")))?;

    pbkdf2::<Hmac<Sha1>>(
        round1.expose_secret(),
        params.salt,
        params.iterations,
        out_key.expose_secret_mut(),
    )
    .map_err(|e| BackupError::Crypto(format!("PBKDF2-SHA1 failed: {e}")))?;

    Ok(())
}

/// Convenience: read the parameters from `keybag` and return a fresh key.
pub fn derive_passcode_key(
    password: &PasswordString,
    keybag: &Keybag,
) -> Result<KeyEncryptionKey32, BackupError> {
    let params = PasscodeKdfParams::from_keybag(keybag)?;
    let mut key = KeyEncryptionKey32::new([0u8; 32]);
    derive_secure_passcode_key(password, &params, &mut key)?;
    Ok(key)
}
