//! # Keybag Parsing
//!
//! The keybag is a flat stream of tagged records:
//!
//! ```text
//! [ tag: 4 ASCII bytes ][ length: u32 BE ][ value: length bytes ]
//! ```
//!
//! A 4-byte value is always read as a big-endian integer. The first `UUID`
//! record is the bag's own UUID; every later `UUID` opens a class key record
//! that collects `CLAS`, `WRAP`, `WPKY`, `KTYP` and `PBKY`. Everything else is
//! a bag-level attribute.
//!
//! A pending class key record is committed, keyed by its `CLAS` value, only
//! when the next `UUID` arrives or the buffer ends. Reading `CLAS` does not
//! commit it, since devices write `WRAP` and `WPKY` after `CLAS` within the
//! same record. A committed record missing `CLAS`, `WRAP` or `WPKY` is
//! malformed.

use crate::aliases::Aes256Key32;
use crate::consts::{CLASS_KEY_TAGS, KEYBAG_HEADER_LEN, KEYBAG_TAG_LEN, KEYBAG_TYPE_MASK};
use crate::error::BackupError;
use crate::protection::ProtectionClass;
use std::collections::BTreeMap;
use std::fmt;

/// Four-byte record tag.
pub type Tag = [u8; 4];

/// Decoded record payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeybagValue {
    /// A record whose declared length was exactly 4.
    Integer(u32),
    Bytes(Vec<u8>),
}

impl KeybagValue {
    fn decode(raw: &[u8]) -> Self {
        match <[u8; 4]>::try_from(raw) {
            Ok(be) => KeybagValue::Integer(u32::from_be_bytes(be)),
            Err(_) => KeybagValue::Bytes(raw.to_vec()),
        }
    }

    pub fn as_integer(&self) -> Option<u32> {
        match self {
            KeybagValue::Integer(v) => Some(*v),
            KeybagValue::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            KeybagValue::Integer(_) => None,
            KeybagValue::Bytes(b) => Some(b),
        }
    }

    fn encode_into(&self, tag: &Tag, out: &mut Vec<u8>) {
        out.extend_from_slice(tag);
        match self {
            KeybagValue::Integer(v) => {
                out.extend_from_slice(&4u32.to_be_bytes());
                out.extend_from_slice(&v.to_be_bytes());
            }
            KeybagValue::Bytes(b) => {
                out.extend_from_slice(&(b.len() as u32).to_be_bytes());
                out.extend_from_slice(b);
            }
        }
    }
}

/// One wrapped key per protection class.
pub struct ClassKeyRecord {
    pub class: ProtectionClass,
    pub uuid: [u8; 16],
    pub wrap_type: u32,
    pub wrapped_key: Vec<u8>,
    pub key_type: Option<u32>,
    pub public_key: Option<Vec<u8>>,
    /// Set once, by [`ClassKeyRing::unwrap_all`](crate::keyring::ClassKeyRing::unwrap_all).
    pub(crate) unwrapped_key: Option<Aes256Key32>,
}

impl ClassKeyRecord {
    /// Whether the key ring managed to unwrap this record.
    pub fn is_unwrapped(&self) -> bool {
        self.unwrapped_key.is_some()
    }
}

impl fmt::Debug for ClassKeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassKeyRecord")
            .field("class", &self.class)
            .field("uuid", &self.uuid)
            .field("wrap_type", &self.wrap_type)
            .field("wrapped_key_len", &self.wrapped_key.len())
            .field("key_type", &self.key_type)
            .field("unwrapped", &self.is_unwrapped())
            .finish()
    }
}

/// Parsed keybag: bag UUID, bag-level attributes and class key records.
#[derive(Debug)]
pub struct Keybag {
    uuid: [u8; 16],
    /// Index into `attributes` at which the bag UUID appeared.
    uuid_position: usize,
    attributes: Vec<(Tag, KeybagValue)>,
    classes: BTreeMap<ProtectionClass, ClassKeyRecord>,
}

impl Keybag {
    pub fn uuid(&self) -> &[u8; 16] {
        &self.uuid
    }

    /// Bag-level attribute by tag. A repeated tag resolves to its last occurrence.
    pub fn attribute(&self, tag: &Tag) -> Option<&KeybagValue> {
        self.attributes
            .iter()
            .rev()
            .find(|(t, _)| t == tag)
            .map(|(_, v)| v)
    }

    /// Bag-level attributes in stream order.
    pub fn attributes(&self) -> impl Iterator<Item = (&Tag, &KeybagValue)> {
        self.attributes.iter().map(|(t, v)| (t, v))
    }

    /// Required integer attribute (`DPIC`, `ITER`, ...).
    pub fn integer_attribute(&self, tag: &Tag) -> Result<u32, BackupError> {
        self.attribute(tag)
            .ok_or_else(|| missing(tag))?
            .as_integer()
            .ok_or_else(|| wrong_kind(tag, "an integer"))
    }

    /// Required byte-string attribute (`DPSL`, `SALT`, ...).
    pub fn bytes_attribute(&self, tag: &Tag) -> Result<&[u8], BackupError> {
        self.attribute(tag)
            .ok_or_else(|| missing(tag))?
            .as_bytes()
            .ok_or_else(|| wrong_kind(tag, "a byte string"))
    }

    /// `TYPE` attribute with the flag bits masked off.
    pub fn keybag_type(&self) -> Option<u32> {
        self.attribute(b"TYPE")
            .and_then(KeybagValue::as_integer)
            .map(|t| t & KEYBAG_TYPE_MASK)
    }

    pub fn version(&self) -> Option<u32> {
        self.attribute(b"VERS").and_then(KeybagValue::as_integer)
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassKeyRecord> {
        self.classes.values()
    }

    pub fn class(&self, class: ProtectionClass) -> Option<&ClassKeyRecord> {
        self.classes.get(&class)
    }

    pub(crate) fn classes_mut(&mut self) -> impl Iterator<Item = &mut ClassKeyRecord> {
        self.classes.values_mut()
    }

    /// Re-emit the record stream.
    ///
    /// Output is canonical: bag-level attributes (with the bag UUID at its
    /// original position), then class records in class order with fields
    /// `UUID, CLAS, WRAP, KTYP, WPKY, PBKY`. Parsing a canonical stream and
    /// encoding it again reproduces it byte for byte.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let uuid = KeybagValue::Bytes(self.uuid.to_vec());
        for (i, (tag, value)) in self.attributes.iter().enumerate() {
            if i == self.uuid_position {
                uuid.encode_into(b"UUID", &mut out);
            }
            value.encode_into(tag, &mut out);
        }
        if self.uuid_position >= self.attributes.len() {
            uuid.encode_into(b"UUID", &mut out);
        }

        for record in self.classes.values() {
            KeybagValue::Bytes(record.uuid.to_vec()).encode_into(b"UUID", &mut out);
            KeybagValue::Integer(record.class.index()).encode_into(b"CLAS", &mut out);
            KeybagValue::Integer(record.wrap_type).encode_into(b"WRAP", &mut out);
            if let Some(key_type) = record.key_type {
                KeybagValue::Integer(key_type).encode_into(b"KTYP", &mut out);
            }
            KeybagValue::Bytes(record.wrapped_key.clone()).encode_into(b"WPKY", &mut out);
            if let Some(public_key) = &record.public_key {
                KeybagValue::Bytes(public_key.clone()).encode_into(b"PBKY", &mut out);
            }
        }
        out
    }
}

fn tag_name(tag: &Tag) -> String {
    String::from_utf8_lossy(tag).into_owned()
}

fn missing(tag: &Tag) -> BackupError {
    BackupError::MalformedKeybag(format!("missing {} attribute", tag_name(tag)))
}

fn wrong_kind(tag: &Tag, expected: &str) -> BackupError {
    BackupError::MalformedKeybag(format!("{} is not {expected}", tag_name(tag)))
}

/// Iterator over raw `(tag, value)` records.
struct Records<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<(Tag, &'a [u8]), BackupError>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.buf[self.pos..];
        if rest.is_empty() {
            return None;
        }
        if rest.len() < KEYBAG_HEADER_LEN {
            let offset = self.pos;
            self.pos = self.buf.len();
            return Some(Err(BackupError::MalformedKeybag(format!(
                "truncated record header at offset {offset}"
            ))));
        }

        let mut tag = [0u8; KEYBAG_TAG_LEN];
        tag.copy_from_slice(&rest[..KEYBAG_TAG_LEN]);
        let mut len_be = [0u8; 4];
        len_be.copy_from_slice(&rest[KEYBAG_TAG_LEN..KEYBAG_HEADER_LEN]);
        let len = u32::from_be_bytes(len_be) as usize;

        let body = &rest[KEYBAG_HEADER_LEN..];
        if len > body.len() {
            let offset = self.pos;
            self.pos = self.buf.len();
            return Some(Err(BackupError::MalformedKeybag(format!(
                "{} record at offset {offset} declares {len} bytes, {} remain",
                tag_name(&tag),
                body.len()
            ))));
        }

        self.pos += KEYBAG_HEADER_LEN + len;
        Some(Ok((tag, &body[..len])))
    }
}

/// Fields collected for the class key record currently open.
struct PartialClassKey {
    uuid: [u8; 16],
    class: Option<u32>,
    wrap_type: Option<u32>,
    wrapped_key: Option<Vec<u8>>,
    key_type: Option<u32>,
    public_key: Option<Vec<u8>>,
}

impl PartialClassKey {
    fn new(uuid: [u8; 16]) -> Self {
        Self {
            uuid,
            class: None,
            wrap_type: None,
            wrapped_key: None,
            key_type: None,
            public_key: None,
        }
    }

    fn set(&mut self, tag: &Tag, value: KeybagValue) -> Result<(), BackupError> {
        let duplicate = || {
            BackupError::MalformedKeybag(format!(
                "duplicate {} in class key record",
                tag_name(tag)
            ))
        };
        match tag {
            b"CLAS" => set_once(&mut self.class, expect_integer(tag, value)?).ok_or_else(duplicate),
            b"WRAP" => {
                set_once(&mut self.wrap_type, expect_integer(tag, value)?).ok_or_else(duplicate)
            }
            b"KTYP" => {
                set_once(&mut self.key_type, expect_integer(tag, value)?).ok_or_else(duplicate)
            }
            b"WPKY" => {
                set_once(&mut self.wrapped_key, expect_bytes(tag, value)?).ok_or_else(duplicate)
            }
            b"PBKY" => {
                set_once(&mut self.public_key, expect_bytes(tag, value)?).ok_or_else(duplicate)
            }
            _ => unreachable!("only class key tags are routed to a pending record"),
        }
    }

    fn finish(self) -> Result<ClassKeyRecord, BackupError> {
        let incomplete = |field: &str| {
            BackupError::MalformedKeybag(format!("class key record without {field}"))
        };
        let index = self.class.ok_or_else(|| incomplete("CLAS"))?;
        let class = ProtectionClass::from_index(index).map_err(|_| {
            BackupError::MalformedKeybag(format!("class key record with CLAS {index} out of range"))
        })?;
        Ok(ClassKeyRecord {
            class,
            uuid: self.uuid,
            wrap_type: self.wrap_type.ok_or_else(|| incomplete("WRAP"))?,
            wrapped_key: self.wrapped_key.ok_or_else(|| incomplete("WPKY"))?,
            key_type: self.key_type,
            public_key: self.public_key,
            unwrapped_key: None,
        })
    }
}

/// Stores `value` if the slot is empty; `None` if it was already set.
fn set_once<T>(slot: &mut Option<T>, value: T) -> Option<()> {
    if slot.is_some() {
        return None;
    }
    *slot = Some(value);
    Some(())
}

fn expect_integer(tag: &Tag, value: KeybagValue) -> Result<u32, BackupError> {
    value.as_integer().ok_or_else(|| wrong_kind(tag, "an integer"))
}

fn expect_bytes(tag: &Tag, value: KeybagValue) -> Result<Vec<u8>, BackupError> {
    match value {
        KeybagValue::Bytes(b) => Ok(b),
        KeybagValue::Integer(_) => Err(wrong_kind(tag, "a byte string")),
    }
}

fn expect_uuid(value: KeybagValue) -> Result<[u8; 16], BackupError> {
    value
        .as_bytes()
        .and_then(|b| <[u8; 16]>::try_from(b).ok())
        .ok_or_else(|| BackupError::MalformedKeybag("UUID record is not 16 bytes".into()))
}

fn commit(
    partial: PartialClassKey,
    classes: &mut BTreeMap<ProtectionClass, ClassKeyRecord>,
) -> Result<(), BackupError> {
    let record = partial.finish()?;
    let class = record.class;
    if classes.insert(class, record).is_some() {
        return Err(BackupError::MalformedKeybag(format!(
            "duplicate class key record for {class}"
        )));
    }
    Ok(())
}

enum ParseState {
    NoPendingClassKey,
    PendingClassKey(PartialClassKey),
}

/// Parse a raw keybag (the `BackupKeyBag` value of `Manifest.plist`).
///
/// # Errors
///
/// [`BackupError::MalformedKeybag`] when the buffer ends inside a record, a
/// declared length overruns the buffer, the bag has no UUID, a class record is
/// incomplete or two records claim the same protection class.
pub fn parse(buffer: &[u8]) -> Result<Keybag, BackupError> {
    let mut uuid: Option<[u8; 16]> = None;
    let mut uuid_position = 0;
    let mut attributes: Vec<(Tag, KeybagValue)> = Vec::new();
    let mut classes: BTreeMap<ProtectionClass, ClassKeyRecord> = BTreeMap::new();
    let mut state = ParseState::NoPendingClassKey;

    for record in (Records { buf: buffer, pos: 0 }) {
        let (tag, raw) = record?;
        let value = KeybagValue::decode(raw);

        if &tag == b"UUID" {
            if uuid.is_none() {
                uuid = Some(expect_uuid(value)?);
                uuid_position = attributes.len();
                continue;
            }
            let opened = ParseState::PendingClassKey(PartialClassKey::new(expect_uuid(value)?));
            if let ParseState::PendingClassKey(done) = std::mem::replace(&mut state, opened) {
                commit(done, &mut classes)?;
            }
            continue;
        }

        match &mut state {
            ParseState::PendingClassKey(partial) if CLASS_KEY_TAGS.contains(&tag) => {
                partial.set(&tag, value)?;
            }
            _ => attributes.push((tag, value)),
        }
    }

    if let ParseState::PendingClassKey(done) = state {
        commit(done, &mut classes)?;
    }

    let uuid = uuid.ok_or_else(|| BackupError::MalformedKeybag("keybag has no UUID".into()))?;
    tracing::debug!(classes = classes.len(), attributes = attributes.len(), "keybag parsed");

    Ok(Keybag {
        uuid,
        uuid_position,
        attributes,
        classes,
    })
}
