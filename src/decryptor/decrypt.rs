//! src/decryptor/decrypt.rs
//! Per-file decryption: metadata → file key → CBC stream → truncate to declared size.

use crate::aliases::Aes256Key32;
use crate::backup::BackupDirectory;
use crate::catalog::CatalogEntry;
use crate::decryptor::stream::CbcDecryptReader;
use crate::error::BackupError;
use crate::keyring::ClassKeyRing;
use crate::resolver::{resolve_file_key, resolve_file_metadata};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Decrypt a file blob and write exactly `declared_size` bytes of plaintext.
///
/// Blobs are padded to the AES block size; the padding is always cut off
/// using the size recorded in the file's metadata. A blob that decrypts to
/// fewer bytes than declared is written as-is and logged.
pub fn decrypt_file_stream<R, W>(
    input_reader: R,
    mut output_writer: W,
    key: &Aes256Key32,
    declared_size: u64,
) -> Result<u64, BackupError>
where
    R: Read,
    W: Write,
{
    let mut reader = CbcDecryptReader::new(input_reader, key).take(declared_size);
    let written = io::copy(&mut reader, &mut output_writer)?;
    output_writer.flush()?;

    if written < declared_size {
        warn!(written, declared_size, "decrypted content shorter than declared size");
    }
    Ok(written)
}

/// Resolve `entry`'s key and decrypt its blob from `source` into `output_writer`.
///
/// # Errors
///
/// Errors are scoped to this one file: [`BackupError::MalformedFileMetadata`],
/// [`BackupError::UnknownProtectionClass`], [`BackupError::ClassKeyNotUnwrapped`],
/// [`BackupError::UnwrapIntegrity`], [`BackupError::InvalidFileId`] or I/O.
pub fn decrypt_entry<W: Write>(
    source: &BackupDirectory,
    ring: &ClassKeyRing,
    entry: &CatalogEntry,
    output_writer: W,
) -> Result<u64, BackupError> {
    let metadata = resolve_file_metadata(&entry.metadata)?;
    let key = resolve_file_key(&metadata, ring)?;
    let blob = File::open(source.blob_path(&entry.file_id)?)?;

    debug!(
        file_id = %entry.file_id,
        domain = %entry.domain,
        path = %entry.relative_path,
        class = %metadata.protection_class,
        size = metadata.declared_size,
        "decrypting file"
    );
    decrypt_file_stream(blob, output_writer, &key, metadata.declared_size)
}

/// Decrypt `entry` to `destination`, creating parent directories.
///
/// Plaintext goes to a temporary file next to `destination` that replaces it
/// only once decryption succeeded. On failure an existing `destination` is
/// left untouched.
pub fn extract_entry_to(
    source: &BackupDirectory,
    ring: &ClassKeyRing,
    entry: &CatalogEntry,
    destination: &Path,
) -> Result<u64, BackupError> {
    let parent = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let staged = tempfile::Builder::new()
        .prefix(".ibackup-")
        .suffix(".part")
        .tempfile_in(parent)?;
    let written = decrypt_entry(source, ring, entry, BufWriter::new(staged.as_file()))?;
    staged.persist(destination).map_err(|e| BackupError::Io(e.error))?;
    Ok(written)
}
