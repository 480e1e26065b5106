// src/crypto/mod.rs

//! Low-level crypto primitives: the passcode KDF and RFC 3394 key unwrap.
//!
//! See crate root for re-exports.

pub mod kdf;
pub mod keywrap;
