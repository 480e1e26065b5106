// src/lib.rs

//! Decryption engine for encrypted iOS device backups.
//!
//! The unlock chain, leaf first:
//!
//! 1. [`keybag::parse`] the `BackupKeyBag` from `Manifest.plist`
//! 2. [`derive_passcode_key`] turns the password into the key-encryption key
//! 3. [`ClassKeyRing::unwrap_all`] unwraps one key per protection class
//! 4. [`resolve_catalog_key`] unwraps the `Manifest.db` key; [`DecryptedCatalog`] decrypts it
//! 5. per file: [`resolve_file_metadata`] + [`resolve_file_key`], then
//!    [`decrypt_file_stream`] over the blob
//!
//! [`EncryptedBackup`] drives all of it for a backup directory.

pub mod aliases;
pub mod backup;
pub mod batch_ops;
pub mod catalog;
pub mod consts;
pub mod crypto;
pub mod decryptor;
pub mod error;
pub mod keybag;
pub mod keyring;
pub mod protection;
pub mod resolver;
pub mod utils;

// High-level API
pub use backup::{BackupDirectory, EncryptedBackup, ManifestPlist};
pub use batch_ops::{extract_batch, ExtractOutcome};
pub use catalog::{CatalogEntry, CatalogLookup, DecryptedCatalog};
pub use error::BackupError;
pub use keybag::Keybag;
pub use keyring::{ClassKeyRing, SkippedClass};
pub use protection::ProtectionClass;

// Individual stages, for custom flows and tooling
pub use crypto::kdf::passcode::{derive_passcode_key, derive_secure_passcode_key, PasscodeKdfParams};
pub use crypto::keywrap::{unwrap_key, unwrap_key_vec, wrap_key};
pub use decryptor::{
    decrypt_ciphertext_stream, decrypt_entry, decrypt_file_stream, extract_entry_to,
    CbcDecryptReader,
};
pub use resolver::{
    resolve_catalog_key, resolve_file_key, resolve_file_metadata, FileMetadata,
    WrappedKeyReference,
};
