// src/decryptor/mod.rs

//! Decryption facade.
//!
//! Core API: [`decrypt_ciphertext_stream`] for raw AES-256-CBC streams (the
//! catalog database), [`decrypt_file_stream`] for file blobs truncated to
//! their declared size, and [`decrypt_entry`] / [`extract_entry_to`] for a
//! whole catalog entry.

pub(crate) mod decrypt;
pub(crate) mod stream;

pub use decrypt::{decrypt_entry, decrypt_file_stream, extract_entry_to};
pub use stream::{decrypt_ciphertext_stream, CbcDecryptReader};
