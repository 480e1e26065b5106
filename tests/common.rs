//! tests/common.rs
//! Shared constants and a synthetic encrypted-backup builder.
//!
//! Everything a device would write is produced here with small KDF iteration
//! counts: keybag, `Manifest.plist`, encrypted `Manifest.db` and file blobs.
#![allow(dead_code)] // each test binary uses a different subset

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes256Enc, Block};
use ibackup_rs::aliases::{Aes256Key32, KeyEncryptionKey32, PasswordString};
use ibackup_rs::{derive_secure_passcode_key, wrap_key, PasscodeKdfParams};
use plist::{Dictionary, Uid, Value};
use rusqlite::{params, Connection};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Fast iteration count for tests - performance testing is in benches/
pub const TEST_ITERATIONS: u32 = 5;

/// First-round (SHA-256) iterations used by fixtures.
pub const TEST_DP_ITERATIONS: u32 = 3;

pub const TEST_PASSWORD: &str = "correct horse";

pub const TEST_SALT: [u8; 20] = [0x5A; 20];
pub const TEST_DP_SALT: [u8; 20] = [0xD5; 20];

/// Bag UUID of every fixture keybag.
pub const BAG_UUID: [u8; 16] = [0xB0; 16];

/// Class that wraps the manifest key and the default file class.
pub const NONE_CLASS: u32 = 4;

pub fn password() -> PasswordString {
    PasswordString::new(TEST_PASSWORD.to_string())
}

/// Deterministic class key per class index.
pub fn class_key_bytes(class: u32) -> [u8; 32] {
    core::array::from_fn(|i| (class as u8).wrapping_mul(31).wrapping_add(i as u8))
}

pub fn fixture_params() -> PasscodeKdfParams<'static> {
    PasscodeKdfParams {
        dp_salt: &TEST_DP_SALT,
        dp_iterations: TEST_DP_ITERATIONS,
        salt: &TEST_SALT,
        iterations: TEST_ITERATIONS,
    }
}

/// KEK derived from `password` with the fixture salts and iteration counts.
pub fn derive_kek(password: &str) -> KeyEncryptionKey32 {
    let mut kek = KeyEncryptionKey32::new([0u8; 32]);
    derive_secure_passcode_key(
        &PasswordString::new(password.to_string()),
        &fixture_params(),
        &mut kek,
    )
    .unwrap();
    kek
}

// ─────────────────────────────────────────────────────────────────────────────
// Keybag records
// ─────────────────────────────────────────────────────────────────────────────

pub fn rec(out: &mut Vec<u8>, tag: &[u8; 4], value: &[u8]) {
    out.extend_from_slice(tag);
    out.extend_from_slice(&(value.len() as u32).to_be_bytes());
    out.extend_from_slice(value);
}

pub fn int(out: &mut Vec<u8>, tag: &[u8; 4], value: u32) {
    rec(out, tag, &value.to_be_bytes());
}

/// A class record as it will be written to the keybag.
#[derive(Debug, Clone)]
pub struct ClassSpec {
    pub class: u32,
    pub wrap_type: u32,
    pub key: [u8; 32],
}

impl ClassSpec {
    pub fn passcode(class: u32) -> Self {
        Self {
            class,
            wrap_type: 2,
            key: class_key_bytes(class),
        }
    }
}

/// Bag-level header with the fixture KDF parameters.
pub fn keybag_header() -> Vec<u8> {
    let mut b = Vec::new();
    int(&mut b, b"VERS", 4);
    int(&mut b, b"TYPE", 1);
    rec(&mut b, b"UUID", &BAG_UUID);
    rec(&mut b, b"HMCK", &[0x11; 40]);
    int(&mut b, b"WRAP", 0);
    rec(&mut b, b"SALT", &TEST_SALT);
    int(&mut b, b"ITER", TEST_ITERATIONS);
    int(&mut b, b"DPWT", 1);
    int(&mut b, b"DPIC", TEST_DP_ITERATIONS);
    rec(&mut b, b"DPSL", &TEST_DP_SALT);
    b
}

/// Full keybag whose class keys are wrapped under `kek`.
pub fn build_keybag(kek: &KeyEncryptionKey32, classes: &[ClassSpec]) -> Vec<u8> {
    let mut b = keybag_header();
    for spec in classes {
        rec(&mut b, b"UUID", &[spec.class as u8; 16]);
        int(&mut b, b"CLAS", spec.class);
        int(&mut b, b"WRAP", spec.wrap_type);
        int(&mut b, b"KTYP", 0);
        rec(&mut b, b"WPKY", &wrap_key(&spec.key, kek).unwrap());
    }
    b
}

// ─────────────────────────────────────────────────────────────────────────────
// Ciphers and archives
// ─────────────────────────────────────────────────────────────────────────────

/// AES-256-CBC, zero IV, zero-padded to the block size.
pub fn cbc_encrypt(key: &[u8; 32], plaintext: &[u8]) -> Vec<u8> {
    let cipher = Aes256Enc::new(key.into());
    let mut data = plaintext.to_vec();
    data.resize(plaintext.len().div_ceil(16) * 16, 0);

    let mut chain = [0u8; 16];
    for chunk in data.chunks_exact_mut(16) {
        let mut block = [0u8; 16];
        for i in 0..16 {
            block[i] = chunk[i] ^ chain[i];
        }
        let mut aes_block = Block::from(block);
        cipher.encrypt_block(&mut aes_block);
        chunk.copy_from_slice(&aes_block);
        chain.copy_from_slice(&aes_block);
    }
    data
}

/// Binary keyed archive the catalog stores in `Files.file`.
pub fn metadata_blob(class: u32, size: u64, wrapped_key: &[u8]) -> Vec<u8> {
    let mut key_data = class.to_le_bytes().to_vec();
    key_data.extend_from_slice(wrapped_key);

    let mut file = Dictionary::new();
    file.insert("ProtectionClass".into(), Value::Integer(u64::from(class).into()));
    file.insert("Size".into(), Value::Integer(size.into()));
    file.insert("EncryptionKey".into(), Value::Uid(Uid::new(2)));
    file.insert("RelativePath".into(), Value::Uid(Uid::new(3)));
    file.insert("$class".into(), Value::Uid(Uid::new(4)));

    let mut key = Dictionary::new();
    key.insert("NS.data".into(), Value::Data(key_data));

    let objects = vec![
        Value::String("$null".into()),
        Value::Dictionary(file),
        Value::Dictionary(key),
        Value::String("unused/path".into()),
        Value::String("MBFile".into()),
    ];

    let mut top = Dictionary::new();
    top.insert("root".into(), Value::Uid(Uid::new(1)));
    let mut archive = Dictionary::new();
    archive.insert("$version".into(), Value::Integer(100_000u64.into()));
    archive.insert("$archiver".into(), Value::String("NSKeyedArchiver".into()));
    archive.insert("$top".into(), Value::Dictionary(top));
    archive.insert("$objects".into(), Value::Array(objects));

    let mut out = Vec::new();
    Value::Dictionary(archive).to_writer_binary(&mut out).unwrap();
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Whole backups
// ─────────────────────────────────────────────────────────────────────────────

/// One file to place in the backup.
#[derive(Debug, Clone)]
pub struct FileSpec {
    pub file_id: String,
    pub domain: String,
    pub relative_path: String,
    pub class: u32,
    pub content: Vec<u8>,
    pub file_key: [u8; 32],
    pub flags: i64,
    /// Wrap the file key under this class instead of `class` (mismatch fixtures).
    pub wrap_class_override: Option<u32>,
}

impl FileSpec {
    pub fn new(file_id: &str, domain: &str, relative_path: &str, content: &[u8]) -> Self {
        Self {
            file_id: file_id.to_string(),
            domain: domain.to_string(),
            relative_path: relative_path.to_string(),
            class: NONE_CLASS,
            content: content.to_vec(),
            file_key: {
                let seed = file_id.bytes().fold(0u8, |acc, b| acc.wrapping_mul(31).wrapping_add(b));
                core::array::from_fn(|i| seed ^ (i as u8).wrapping_mul(7))
            },
            flags: 1,
            wrap_class_override: None,
        }
    }

    pub fn in_class(mut self, class: u32) -> Self {
        self.class = class;
        self
    }
}

pub struct BackupBuilder {
    pub classes: Vec<ClassSpec>,
    pub manifest_class: u32,
    pub manifest_db_key: [u8; 32],
    pub files: Vec<FileSpec>,
}

impl Default for BackupBuilder {
    fn default() -> Self {
        Self {
            classes: [1, 2, 3, NONE_CLASS]
                .into_iter()
                .map(ClassSpec::passcode)
                .collect(),
            manifest_class: NONE_CLASS,
            manifest_db_key: [0xDB; 32],
            files: Vec::new(),
        }
    }
}

impl BackupBuilder {
    pub fn file(mut self, spec: FileSpec) -> Self {
        self.files.push(spec);
        self
    }

    pub fn class(mut self, spec: ClassSpec) -> Self {
        self.classes.retain(|c| c.class != spec.class);
        self.classes.push(spec);
        self
    }

    fn class_key(&self, class: u32) -> [u8; 32] {
        self.classes
            .iter()
            .find(|c| c.class == class)
            .map(|c| c.key)
            .unwrap_or_else(|| class_key_bytes(class))
    }

    /// Write the backup into a fresh temporary directory.
    pub fn build(&self) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        self.write_to(dir.path());
        dir
    }

    pub fn write_to(&self, root: &Path) {
        let kek = derive_kek(TEST_PASSWORD);
        let keybag = build_keybag(&kek, &self.classes);

        // Manifest.plist
        let manifest_class_key = Aes256Key32::new(self.class_key(self.manifest_class));
        let mut manifest_key = self.manifest_class.to_le_bytes().to_vec();
        manifest_key.extend_from_slice(&wrap_key(&self.manifest_db_key, &manifest_class_key).unwrap());

        let mut lockdown = Dictionary::new();
        lockdown.insert("DeviceName".into(), Value::String("Test iPhone".into()));
        lockdown.insert("ProductVersion".into(), Value::String("17.4".into()));

        let mut manifest = Dictionary::new();
        manifest.insert("BackupKeyBag".into(), Value::Data(keybag));
        manifest.insert("ManifestKey".into(), Value::Data(manifest_key));
        manifest.insert("IsEncrypted".into(), Value::Boolean(true));
        manifest.insert("Version".into(), Value::String("10.0".into()));
        manifest.insert("Lockdown".into(), Value::Dictionary(lockdown));
        Value::Dictionary(manifest)
            .to_file_binary(root.join("Manifest.plist"))
            .unwrap();

        // Manifest.db
        let plain_db = self.catalog_plaintext();
        fs::write(root.join("Manifest.db"), cbc_encrypt(&self.manifest_db_key, &plain_db)).unwrap();

        // Blobs
        for f in &self.files {
            let blob_dir = root.join(&f.file_id[..2]);
            fs::create_dir_all(&blob_dir).unwrap();
            fs::write(blob_dir.join(&f.file_id), cbc_encrypt(&f.file_key, &f.content)).unwrap();
        }
    }

    fn catalog_plaintext(&self) -> Vec<u8> {
        let scratch = tempfile::NamedTempFile::new().unwrap();
        {
            let conn = Connection::open(scratch.path()).unwrap();
            conn.execute_batch(
                "CREATE TABLE Files (fileID TEXT PRIMARY KEY, domain TEXT, relativePath TEXT, \
                 flags INTEGER, file BLOB);
                 CREATE TABLE Properties (key TEXT PRIMARY KEY, value BLOB);",
            )
            .unwrap();
            for f in &self.files {
                let wrap_class = f.wrap_class_override.unwrap_or(f.class);
                let class_key = Aes256Key32::new(self.class_key(wrap_class));
                let wrapped = wrap_key(&f.file_key, &class_key).unwrap();
                conn.execute(
                    "INSERT INTO Files (fileID, domain, relativePath, flags, file) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        f.file_id,
                        f.domain,
                        f.relative_path,
                        f.flags,
                        metadata_blob(f.class, f.content.len() as u64, &wrapped)
                    ],
                )
                .unwrap();
            }
        }
        fs::read(scratch.path()).unwrap()
    }
}

/// 40-char hex id like the ones devices use, derived from `seed`.
pub fn file_id(seed: u8) -> String {
    (0..20).map(|i| format!("{:02x}", seed.wrapping_add(i * 13))).collect()
}
