//! # Backup Pipeline
//!
//! [`EncryptedBackup::open`] runs the whole unlock chain in order:
//!
//! ```text
//! Manifest.plist → keybag → passcode KEK → class keys → manifest key → Manifest.db
//! ```
//!
//! Any failure up to the decrypted catalog aborts the open. After that, each
//! file decrypts independently and a failure affects only that file.

mod directory;

pub use directory::{BackupDirectory, ManifestPlist};

use crate::aliases::PasswordString;
use crate::batch_ops::{extract_batch, ExtractOutcome};
use crate::catalog::{CatalogEntry, CatalogLookup, DecryptedCatalog};
use crate::crypto::kdf::passcode::derive_passcode_key;
use crate::decryptor::{decrypt_entry, extract_entry_to};
use crate::error::BackupError;
use crate::keybag;
use crate::keyring::{ClassKeyRing, SkippedClass};
use crate::resolver::{resolve_catalog_key, WrappedKeyReference};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// An unlocked backup: class keys unwrapped and catalog decrypted.
pub struct EncryptedBackup {
    catalog: DecryptedCatalog,
    ring: ClassKeyRing,
    source: BackupDirectory,
}

impl EncryptedBackup {
    /// Open the backup at `root` and unlock it with `password`.
    pub fn open(root: impl AsRef<Path>, password: &PasswordString) -> Result<Self, BackupError> {
        Self::unlock(BackupDirectory::open(root)?, password)
    }

    /// Unlock an already opened backup directory.
    ///
    /// # Errors
    ///
    /// - [`BackupError::MalformedKeybag`] for a structurally bad keybag or missing KDF attributes
    /// - [`BackupError::UnwrapIntegrity`] for a wrong password
    /// - [`BackupError::UnknownProtectionClass`] / [`BackupError::ClassKeyNotUnwrapped`]
    ///   if the manifest key's class is unavailable
    /// - [`BackupError::Catalog`] / I/O errors while decrypting `Manifest.db`
    pub fn unlock(source: BackupDirectory, password: &PasswordString) -> Result<Self, BackupError> {
        let keybag = keybag::parse(&source.manifest().backup_key_bag)?;
        info!(
            classes = keybag.classes().count(),
            version = ?keybag.version(),
            "keybag parsed"
        );

        info!("deriving key-encryption key from password");
        let kek = derive_passcode_key(password, &keybag)?;
        let (ring, skipped) = ClassKeyRing::unwrap_all(keybag, &kek)?;
        drop(kek);
        info!(skipped = skipped.len(), "class keys unwrapped");

        let reference = WrappedKeyReference::from_manifest_key(&source.manifest().manifest_key)?;
        let catalog_key = resolve_catalog_key(&reference, &ring)?;
        let catalog = DecryptedCatalog::decrypt_file(&source.catalog_path(), &catalog_key)?;

        Ok(Self {
            catalog,
            ring,
            source,
        })
    }

    pub fn ring(&self) -> &ClassKeyRing {
        &self.ring
    }

    pub fn skipped_classes(&self) -> &[SkippedClass] {
        self.ring.skipped()
    }

    pub fn source(&self) -> &BackupDirectory {
        &self.source
    }

    pub fn catalog(&self) -> &DecryptedCatalog {
        &self.catalog
    }

    /// First regular file whose relative path matches `pattern` (SQL `LIKE`).
    ///
    /// # Errors
    ///
    /// [`BackupError::CatalogLookupMiss`] if nothing matches.
    pub fn lookup(&self, pattern: &str) -> Result<CatalogEntry, BackupError> {
        self.catalog
            .lookup(pattern)?
            .ok_or_else(|| BackupError::CatalogLookupMiss(pattern.to_string()))
    }

    /// Decrypt one catalog entry into `writer`. Returns bytes written.
    pub fn decrypt_entry<W: Write>(&self, entry: &CatalogEntry, writer: W) -> Result<u64, BackupError> {
        decrypt_entry(&self.source, &self.ring, entry, writer)
    }

    /// Look up `pattern` and decrypt the first match to `destination`.
    pub fn extract_file(&self, pattern: &str, destination: impl AsRef<Path>) -> Result<u64, BackupError> {
        let entry = self.lookup(pattern)?;
        extract_entry_to(&self.source, &self.ring, &entry, destination.as_ref())
    }

    /// Decrypt every match of `pattern` (and `domain`, if given) under
    /// `out_dir/<domain>/<relative path>`, in parallel.
    ///
    /// Only the lookup can fail the call; per-file failures are reported in
    /// the returned outcomes.
    pub fn extract_matching(
        &self,
        pattern: &str,
        domain: Option<&str>,
        out_dir: impl AsRef<Path>,
    ) -> Result<Vec<ExtractOutcome>, BackupError> {
        let entries = self.catalog.entries(pattern, domain)?;
        if entries.is_empty() {
            return Err(BackupError::CatalogLookupMiss(pattern.to_string()));
        }
        info!(files = entries.len(), "extracting matching files");
        Ok(extract_batch(&self.source, &self.ring, entries, out_dir.as_ref()))
    }
}
