//! Backup directory layout and its top-level `Manifest.plist`.

use crate::consts::{CATALOG_DB_NAME, MANIFEST_PLIST_NAME};
use crate::error::BackupError;
use crate::utils::is_hex_id;
use plist::{Dictionary, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// The parts of `Manifest.plist` the decryption chain needs.
#[derive(Clone)]
pub struct ManifestPlist {
    /// Raw keybag, input to [`keybag::parse`](crate::keybag::parse).
    pub backup_key_bag: Vec<u8>,
    /// Class header + wrapped key for `Manifest.db`.
    pub manifest_key: Vec<u8>,
    pub is_encrypted: bool,
    pub device_name: Option<String>,
    pub product_version: Option<String>,
}

impl std::fmt::Debug for ManifestPlist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestPlist")
            .field("backup_key_bag_len", &self.backup_key_bag.len())
            .field("manifest_key_len", &self.manifest_key.len())
            .field("is_encrypted", &self.is_encrypted)
            .field("device_name", &self.device_name)
            .field("product_version", &self.product_version)
            .finish()
    }
}

fn malformed(msg: &str) -> BackupError {
    BackupError::MalformedManifest(msg.to_string())
}

fn data_field(dict: &Dictionary, key: &str) -> Result<Vec<u8>, BackupError> {
    dict.get(key)
        .and_then(Value::as_data)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| malformed(&format!("missing {key} data")))
}

impl ManifestPlist {
    /// Extract fields from a decoded `Manifest.plist`.
    ///
    /// # Errors
    ///
    /// [`BackupError::MalformedManifest`] if the backup is marked unencrypted
    /// or `BackupKeyBag` / `ManifestKey` are missing.
    pub fn from_value(value: &Value) -> Result<Self, BackupError> {
        let dict = value
            .as_dictionary()
            .ok_or_else(|| malformed("Manifest.plist is not a dictionary"))?;

        let is_encrypted = dict
            .get("IsEncrypted")
            .and_then(Value::as_boolean)
            .unwrap_or(true);
        if !is_encrypted {
            return Err(malformed("backup is not encrypted"));
        }

        let lockdown = dict.get("Lockdown").and_then(Value::as_dictionary);
        let lockdown_string = |key: &str| {
            lockdown
                .and_then(|l| l.get(key))
                .and_then(Value::as_string)
                .map(str::to_owned)
        };

        Ok(Self {
            backup_key_bag: data_field(dict, "BackupKeyBag")?,
            manifest_key: data_field(dict, "ManifestKey")?,
            is_encrypted,
            device_name: lockdown_string("DeviceName"),
            product_version: lockdown_string("ProductVersion"),
        })
    }
}

/// One backup on disk, passed explicitly to everything that reads from it.
#[derive(Debug, Clone)]
pub struct BackupDirectory {
    root: PathBuf,
    manifest: ManifestPlist,
}

impl BackupDirectory {
    /// Read `<root>/Manifest.plist`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, BackupError> {
        let root = root.as_ref().to_path_buf();
        let file = File::open(root.join(MANIFEST_PLIST_NAME))?;
        let value = Value::from_reader(BufReader::new(file))?;
        Ok(Self {
            manifest: ManifestPlist::from_value(&value)?,
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &ManifestPlist {
        &self.manifest
    }

    /// Encrypted `Manifest.db`.
    pub fn catalog_path(&self) -> PathBuf {
        self.root.join(CATALOG_DB_NAME)
    }

    /// Blob location for a content-addressed id: `<root>/<id[0..2]>/<id>`.
    ///
    /// # Errors
    ///
    /// [`BackupError::InvalidFileId`] unless `file_id` is hex of at least two characters.
    pub fn blob_path(&self, file_id: &str) -> Result<PathBuf, BackupError> {
        if !is_hex_id(file_id) {
            return Err(BackupError::InvalidFileId(file_id.to_string()));
        }
        Ok(self.root.join(&file_id[..2]).join(file_id))
    }
}
