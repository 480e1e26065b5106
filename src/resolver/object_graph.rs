//! # Object Graph Resolution
//!
//! Catalog metadata blobs are keyed archives: `$objects` is a flat array and
//! every reference is an index into it (`$top.root` names the root). The
//! decoded tree is plain data, so references are resolved through an arena
//! with integer handles.

use crate::consts::FILE_KEY_HEADER_LEN;
use crate::error::BackupError;
use crate::protection::ProtectionClass;
use plist::{Dictionary, Value};
use std::io::Cursor;

/// Handle into an [`ObjectArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectRef(pub usize);

impl ObjectRef {
    /// Read a reference out of a value: a UID, or a plain unsigned integer.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Uid(uid) => usize::try_from(uid.get()).ok().map(ObjectRef),
            other => other
                .as_unsigned_integer()
                .and_then(|i| usize::try_from(i).ok())
                .map(ObjectRef),
        }
    }
}

/// The `$objects` array of a decoded archive.
#[derive(Debug, Clone, Copy)]
pub struct ObjectArena<'a> {
    objects: &'a [Value],
}

impl<'a> ObjectArena<'a> {
    /// Build the arena and return the root handle named by `$top.root`.
    pub fn from_archive(archive: &'a Value) -> Result<(Self, ObjectRef), BackupError> {
        let top = archive
            .as_dictionary()
            .ok_or_else(|| malformed("archive is not a dictionary"))?;
        let objects = top
            .get("$objects")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed("missing $objects array"))?;
        let root = top
            .get("$top")
            .and_then(Value::as_dictionary)
            .and_then(|t| t.get("root"))
            .and_then(ObjectRef::from_value)
            .ok_or_else(|| malformed("missing $top root reference"))?;
        Ok((Self { objects }, root))
    }

    pub fn get(&self, handle: ObjectRef) -> Result<&'a Value, BackupError> {
        self.objects.get(handle.0).ok_or_else(|| {
            malformed(&format!(
                "reference {} out of range ({} objects)",
                handle.0,
                self.objects.len()
            ))
        })
    }

    pub fn dictionary(&self, handle: ObjectRef) -> Result<&'a Dictionary, BackupError> {
        self.get(handle)?
            .as_dictionary()
            .ok_or_else(|| malformed(&format!("object {} is not a dictionary", handle.0)))
    }

    /// Follow the reference stored under `field` of `dict`.
    pub fn follow(&self, dict: &Dictionary, field: &str) -> Result<&'a Value, BackupError> {
        let handle = dict
            .get(field)
            .and_then(ObjectRef::from_value)
            .ok_or_else(|| malformed(&format!("missing {field} reference")))?;
        self.get(handle)
    }
}

/// What the file key resolver needs from a catalog entry.
#[derive(Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub protection_class: ProtectionClass,
    /// Wrapped file key with its 4-byte header already stripped.
    pub wrapped_key: Vec<u8>,
    /// Plaintext length; decrypted content is truncated to it.
    pub declared_size: u64,
}

impl std::fmt::Debug for FileMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileMetadata")
            .field("protection_class", &self.protection_class)
            .field("wrapped_key_len", &self.wrapped_key.len())
            .field("declared_size", &self.declared_size)
            .finish()
    }
}

fn malformed(msg: &str) -> BackupError {
    BackupError::MalformedFileMetadata(msg.to_string())
}

/// Decode a catalog `file` blob and resolve its metadata.
///
/// # Errors
///
/// [`BackupError::MalformedFileMetadata`] if the blob is not a property list,
/// a reference is missing or out of range, or a field has the wrong kind.
pub fn resolve_file_metadata(blob: &[u8]) -> Result<FileMetadata, BackupError> {
    let archive = Value::from_reader(Cursor::new(blob))
        .map_err(|e| malformed(&format!("undecodable property list: {e}")))?;
    resolve_archive(&archive)
}

/// Resolve metadata from an already decoded archive.
pub fn resolve_archive(archive: &Value) -> Result<FileMetadata, BackupError> {
    let (arena, root) = ObjectArena::from_archive(archive)?;
    let file = arena.dictionary(root)?;

    let class_index = file
        .get("ProtectionClass")
        .and_then(Value::as_unsigned_integer)
        .ok_or_else(|| malformed("missing ProtectionClass"))?;
    let protection_class = u32::try_from(class_index)
        .ok()
        .and_then(|i| ProtectionClass::from_index(i).ok())
        .ok_or_else(|| malformed(&format!("ProtectionClass {class_index} out of range")))?;

    let declared_size = file
        .get("Size")
        .and_then(Value::as_unsigned_integer)
        .ok_or_else(|| malformed("missing Size"))?;

    let key_data = arena
        .follow(file, "EncryptionKey")?
        .as_dictionary()
        .and_then(|d| d.get("NS.data"))
        .and_then(Value::as_data)
        .ok_or_else(|| malformed("EncryptionKey object has no NS.data"))?;
    if key_data.len() <= FILE_KEY_HEADER_LEN {
        return Err(malformed("EncryptionKey shorter than its header"));
    }

    Ok(FileMetadata {
        protection_class,
        wrapped_key: key_data[FILE_KEY_HEADER_LEN..].to_vec(),
        declared_size,
    })
}
