//! # Constants
//!
//! Protocol constants fixed by the backup format. None of these are tunable:
//! changing any of them produces keys or plaintext that no device wrote.

/// Length of a keybag record tag (`b"UUID"`, `b"WPKY"`, ...).
pub const KEYBAG_TAG_LEN: usize = 4;

/// Length of a keybag record header: tag + big-endian `u32` length.
pub const KEYBAG_HEADER_LEN: usize = KEYBAG_TAG_LEN + 4;

/// Keybag tags that belong to a class key record rather than the bag itself.
pub const CLASS_KEY_TAGS: [[u8; 4]; 6] = [*b"CLAS", *b"WRAP", *b"WPKY", *b"KTYP", *b"PBKY", *b"UUID"];

/// Mask applied to the keybag `TYPE` attribute.
pub const KEYBAG_TYPE_MASK: u32 = 0x3FFF_FFFF;

/// The only supported class key wrap type: AES key wrap under the passcode key.
pub const WRAP_TYPE_PASSCODE: u32 = 2;

/// Size of an unwrapped AES-256 key.
pub const AES256_KEY_LEN: usize = 32;

/// Size of an RFC 3394 wrapped AES-256 key (key + 8-byte integrity block).
pub const WRAPPED_KEY_LEN: usize = AES256_KEY_LEN + 8;

/// `ManifestKey` prefix: little-endian protection class index.
pub const MANIFEST_KEY_HEADER_LEN: usize = 4;

/// Header in front of a file's wrapped key inside its `NS.data` object.
pub const FILE_KEY_HEADER_LEN: usize = 4;

/// AES block size.
pub const AES_BLOCK_SIZE: usize = 16;

/// Ciphertext read per refill of the CBC stream reader (multiple of the block size).
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Catalog `flags` value for regular files.
pub const CATALOG_FLAG_FILE: i64 = 1;

/// File name of the encrypted catalog inside a backup directory.
pub const CATALOG_DB_NAME: &str = "Manifest.db";

/// File name of the backup's top-level property list.
pub const MANIFEST_PLIST_NAME: &str = "Manifest.plist";
