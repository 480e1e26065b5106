//! # Error Types
//!
//! This module defines the error type used throughout the library.
//! All operations return [`Result<T, BackupError>`](BackupError); nothing is
//! retried internally because every operation is a deterministic function of
//! its inputs.

use crate::protection::ProtectionClass;
use thiserror::Error;

/// The error type for all backup decryption operations.
#[derive(Error, Debug)]
pub enum BackupError {
    /// I/O error while reading the backup or writing plaintext.
    ///
    /// Also produced by the CBC stream reader when the ciphertext length is
    /// not a multiple of the AES block size (`ErrorKind::InvalidData`).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A cryptographic primitive rejected its input (bad key size, KDF failure).
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Structural violation in the binary keybag. Fatal: aborts startup.
    #[error("Malformed keybag: {0}")]
    MalformedKeybag(String),

    /// A class key record uses a wrap scheme other than the passcode AES key wrap.
    ///
    /// The key ring downgrades this to a [`SkippedClass`](crate::keyring::SkippedClass)
    /// report instead of failing.
    #[error("Unsupported wrap type {wrap_type} for protection class {class}")]
    UnsupportedWrapType {
        class: ProtectionClass,
        wrap_type: u32,
    },

    /// The RFC 3394 integrity check failed.
    ///
    /// At the first class key unwrap this almost always means a wrong password.
    #[error("Key unwrap integrity check failed (wrong password or corrupted key)")]
    UnwrapIntegrity,

    /// A protection class index outside `0..=11`.
    #[error("Invalid protection class index: {0}")]
    InvalidProtectionClass(u32),

    /// The key ring has no record for the referenced protection class.
    #[error("Unknown protection class: {0}")]
    UnknownProtectionClass(ProtectionClass),

    /// The referenced class exists but its key was skipped during unwrap.
    #[error("Class key not unwrapped: {0}")]
    ClassKeyNotUnwrapped(ProtectionClass),

    /// No catalog entry matches the requested path.
    #[error("No catalog entry matches '{0}'")]
    CatalogLookupMiss(String),

    /// The per-file object graph could not be resolved.
    #[error("Malformed file metadata: {0}")]
    MalformedFileMetadata(String),

    /// `Manifest.plist` is missing required keys or has the wrong shape.
    #[error("Malformed manifest: {0}")]
    MalformedManifest(String),

    /// A catalog file identifier that is not a usable hex name.
    #[error("Invalid file identifier: {0}")]
    InvalidFileId(String),

    /// A catalog path that would escape the extraction directory.
    #[error("Unsafe relative path: {0}")]
    UnsafePath(String),

    /// Property list decoding failed.
    #[error("Plist error: {0}")]
    Plist(#[from] plist::Error),

    /// Query against the decrypted catalog database failed.
    #[error("Catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),
}

