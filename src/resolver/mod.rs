//! # Key Resolution
//!
//! Turns wrapped manifest and file keys into usable AES-256 keys by pairing
//! them with their class key from the [`ClassKeyRing`]. Both paths run the
//! exact same unwrap; only the source of the wrapped key differs.

pub mod object_graph;

use crate::aliases::Aes256Key32;
use crate::consts::MANIFEST_KEY_HEADER_LEN;
use crate::crypto::keywrap::unwrap_key;
use crate::error::BackupError;
use crate::keyring::ClassKeyRing;
use crate::protection::ProtectionClass;

pub use object_graph::{resolve_file_metadata, FileMetadata, ObjectArena, ObjectRef};

/// A wrapped key and the class whose key unwraps it. Borrowed and short-lived.
#[derive(Debug, Clone, Copy)]
pub struct WrappedKeyReference<'a> {
    pub protection_class: ProtectionClass,
    pub wrapped_key: &'a [u8],
}

impl<'a> WrappedKeyReference<'a> {
    /// Split a `ManifestKey` blob: little-endian `u32` class index, then the wrapped key.
    ///
    /// # Errors
    ///
    /// - [`BackupError::MalformedManifest`] if the blob is shorter than its header
    /// - [`BackupError::InvalidProtectionClass`] if the index is out of range
    pub fn from_manifest_key(blob: &'a [u8]) -> Result<Self, BackupError> {
        if blob.len() < MANIFEST_KEY_HEADER_LEN {
            return Err(BackupError::MalformedManifest(format!(
                "ManifestKey is {} bytes, shorter than its class header",
                blob.len()
            )));
        }
        let (header, wrapped_key) = blob.split_at(MANIFEST_KEY_HEADER_LEN);
        let mut le = [0u8; MANIFEST_KEY_HEADER_LEN];
        le.copy_from_slice(header);
        Ok(Self {
            protection_class: ProtectionClass::from_index(u32::from_le_bytes(le))?,
            wrapped_key,
        })
    }

    /// Reference to a file's key as described by its metadata.
    pub fn from_file_metadata(metadata: &'a FileMetadata) -> Self {
        Self {
            protection_class: metadata.protection_class,
            wrapped_key: &metadata.wrapped_key,
        }
    }

    /// Unwrap with the referenced class key.
    ///
    /// # Errors
    ///
    /// [`BackupError::UnknownProtectionClass`], [`BackupError::ClassKeyNotUnwrapped`]
    /// or any error of [`unwrap_key`].
    pub fn unwrap_with(&self, ring: &ClassKeyRing) -> Result<Aes256Key32, BackupError> {
        let class_key = ring.class_key(self.protection_class)?;
        unwrap_key(self.wrapped_key, class_key)
    }
}

/// Key that decrypts `Manifest.db`.
pub fn resolve_catalog_key(
    reference: &WrappedKeyReference<'_>,
    ring: &ClassKeyRing,
) -> Result<Aes256Key32, BackupError> {
    reference.unwrap_with(ring)
}

/// Content key of a single file.
pub fn resolve_file_key(
    metadata: &FileMetadata,
    ring: &ClassKeyRing,
) -> Result<Aes256Key32, BackupError> {
    WrappedKeyReference::from_file_metadata(metadata).unwrap_with(ring)
}
