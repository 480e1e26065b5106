//! # Secure-Gate Type Aliases
//!
//! Type aliases for secret material, built on [`secure-gate`](https://github.com/Slurp9187/secure-gate).
//! Every buffer here is zeroized on drop and requires an explicit
//! `.expose_secret()` / `.expose_secret_mut()` to read or write.
//!
//! ## Fixed-Size Secrets
//! - [`Aes256Key32`] - unwrapped class, manifest and file keys
//! - [`KeyEncryptionKey32`] - passcode-derived key that unwraps class keys
//!   (same underlying type as [`Aes256Key32`]; the name documents intent)
//! - [`Block16`] - one AES block (CBC chaining state, plaintext scratch)
//!
//! ## Dynamic Secrets
//! - [`PasswordString`] - backup password
//! - [`PlaintextBuffer`] - decrypted chunk awaiting the reader
//! - [`SecretBytes`] - unwrapped key material of arbitrary length

use secure_gate::dynamic_alias;
use secure_gate::fixed_alias;

// ─────────────────────────────────────────────────────────────────────────────
// SpanBuffer: generic secure stack buffer
// ─────────────────────────────────────────────────────────────────────────────
pub type SpanBuffer<const N: usize> = secure_gate::Fixed<[u8; N]>;

pub type Block16 = SpanBuffer<16>; // one AES block

// ─────────────────────────────────────────────────────────────────────────────
// Dynamic secrets
// ─────────────────────────────────────────────────────────────────────────────
dynamic_alias!(pub PasswordString, String);
dynamic_alias!(pub PlaintextBuffer, Vec<u8>);
dynamic_alias!(pub SecretBytes, Vec<u8>);

// ─────────────────────────────────────────────────────────────────────────────
// Fixed-size concrete secrets
// ─────────────────────────────────────────────────────────────────────────────
fixed_alias!(pub Aes256Key32, 32); // class key, manifest key, file key
fixed_alias!(pub KeyEncryptionKey32, 32); // PBKDF2 round 2 output
