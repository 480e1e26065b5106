//! # File Catalog
//!
//! `Manifest.db` is a SQLite database encrypted as one AES-256-CBC stream.
//! [`DecryptedCatalog`] decrypts it into a private temporary file, opens it
//! read-only and answers path lookups. The temporary file is deleted when the
//! catalog is dropped, whatever the exit path.

use crate::aliases::Aes256Key32;
use crate::consts::CATALOG_FLAG_FILE;
use crate::decryptor::decrypt_ciphertext_stream;
use crate::error::BackupError;
use rusqlite::{params, Connection, OpenFlags};
use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;

/// One row of the `Files` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Content-addressed blob name (hex).
    pub file_id: String,
    pub domain: String,
    pub relative_path: String,
    pub flags: i64,
    /// Keyed-archive property list describing the file.
    pub metadata: Vec<u8>,
}

/// Lookup surface over a decrypted catalog.
///
/// Pattern semantics (wildcards, case folding) belong to the implementation;
/// [`DecryptedCatalog`] uses SQL `LIKE`.
pub trait CatalogLookup {
    /// All regular files whose relative path matches, optionally restricted by domain.
    fn entries(
        &self,
        relative_path_pattern: &str,
        domain_pattern: Option<&str>,
    ) -> Result<Vec<CatalogEntry>, BackupError>;

    /// First match in `(domain, relative_path)` order, if any.
    fn lookup(&self, relative_path_pattern: &str) -> Result<Option<CatalogEntry>, BackupError> {
        Ok(self
            .entries(relative_path_pattern, None)?
            .into_iter()
            .next())
    }
}

const ENTRIES_QUERY: &str = "SELECT fileID, domain, relativePath, flags, file FROM Files \
     WHERE relativePath LIKE ?1 AND domain LIKE ?2 AND flags = ?3 \
     ORDER BY domain, relativePath";

/// Decrypted `Manifest.db` backed by a scoped temporary file.
pub struct DecryptedCatalog {
    // Declared before `file`: the connection closes before the file is removed.
    conn: Connection,
    file: NamedTempFile,
}

impl DecryptedCatalog {
    /// Decrypt the catalog stream into a fresh temporary file and open it.
    ///
    /// # Errors
    ///
    /// I/O errors while decrypting, or [`BackupError::Catalog`] if the
    /// plaintext is not a usable database (which is what a wrong manifest
    /// key looks like). The temporary file is removed on every error path.
    pub fn decrypt_from<R: Read>(ciphertext: R, key: &Aes256Key32) -> Result<Self, BackupError> {
        let file = tempfile::Builder::new()
            .prefix("ibackup-manifest-")
            .suffix(".db")
            .tempfile()?;

        let written = decrypt_ciphertext_stream(ciphertext, BufWriter::new(file.as_file()), key)?;
        file.as_file().sync_all()?;

        let conn = Connection::open_with_flags(
            file.path(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        // Fails fast on garbage plaintext instead of at the first lookup.
        conn.query_row("SELECT count(*) FROM Files", [], |row| row.get::<_, i64>(0))?;

        info!(bytes = written, path = %file.path().display(), "catalog decrypted");
        Ok(Self { conn, file })
    }

    /// Decrypt the catalog file at `path`.
    pub fn decrypt_file(path: &Path, key: &Aes256Key32) -> Result<Self, BackupError> {
        Self::decrypt_from(File::open(path)?, key)
    }

    /// Location of the decrypted database (valid while `self` lives).
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Number of regular files in the catalog.
    pub fn file_count(&self) -> Result<u64, BackupError> {
        let count: i64 = self.conn.query_row(
            "SELECT count(*) FROM Files WHERE flags = ?1",
            params![CATALOG_FLAG_FILE],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

impl CatalogLookup for DecryptedCatalog {
    fn entries(
        &self,
        relative_path_pattern: &str,
        domain_pattern: Option<&str>,
    ) -> Result<Vec<CatalogEntry>, BackupError> {
        let mut stmt = self.conn.prepare_cached(ENTRIES_QUERY)?;
        let rows = stmt.query_map(
            params![
                relative_path_pattern,
                domain_pattern.unwrap_or("%"),
                CATALOG_FLAG_FILE
            ],
            |row| {
                Ok(CatalogEntry {
                    file_id: row.get(0)?,
                    domain: row.get(1)?,
                    relative_path: row.get(2)?,
                    flags: row.get(3)?,
                    metadata: row.get::<_, Option<Vec<u8>>>(4)?.unwrap_or_default(),
                })
            },
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
