//! # Class Key Ring
//!
//! Owns the parsed [`Keybag`] after its class keys have been unwrapped. The
//! only way to obtain a ring is [`ClassKeyRing::unwrap_all`], so every
//! manifest or file key resolution necessarily happens after the class key
//! phase completed.

use crate::aliases::{Aes256Key32, KeyEncryptionKey32};
use crate::consts::WRAP_TYPE_PASSCODE;
use crate::crypto::keywrap::unwrap_key;
use crate::error::BackupError;
use crate::keybag::{ClassKeyRecord, Keybag};
use crate::protection::ProtectionClass;
use rayon::prelude::*;
use tracing::{debug, warn};

/// A class key the ring left wrapped because its wrap type is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkippedClass {
    pub class: ProtectionClass,
    pub wrap_type: u32,
}

impl From<SkippedClass> for BackupError {
    fn from(skipped: SkippedClass) -> Self {
        BackupError::UnsupportedWrapType {
            class: skipped.class,
            wrap_type: skipped.wrap_type,
        }
    }
}

/// Per-protection-class keys, read-only once constructed.
#[derive(Debug)]
pub struct ClassKeyRing {
    keybag: Keybag,
    skipped: Vec<SkippedClass>,
}

impl ClassKeyRing {
    /// Unwrap every supported class key in `keybag` with the passcode-derived `kek`.
    ///
    /// Records are independent, so they are unwrapped in parallel; each task
    /// writes only its own record. Records whose wrap type is not
    /// [`WRAP_TYPE_PASSCODE`] are skipped and listed in the second tuple
    /// element (also available later via [`ClassKeyRing::skipped`]).
    ///
    /// # Errors
    ///
    /// The first failure among supported records, typically
    /// [`BackupError::UnwrapIntegrity`] for a wrong password. A failure here is
    /// fatal for the whole backup.
    pub fn unwrap_all(
        mut keybag: Keybag,
        kek: &KeyEncryptionKey32,
    ) -> Result<(Self, Vec<SkippedClass>), BackupError> {
        let outcomes: Vec<Option<SkippedClass>> = keybag
            .classes_mut()
            .collect::<Vec<&mut ClassKeyRecord>>()
            .into_par_iter()
            .map(|record| unwrap_record(record, kek))
            .collect::<Result<_, _>>()?;

        let skipped: Vec<SkippedClass> = outcomes.into_iter().flatten().collect();
        for s in &skipped {
            warn!(class = %s.class, reason = %BackupError::from(*s), "class key skipped");
        }
        debug!(
            unwrapped = keybag.classes().filter(|c| c.is_unwrapped()).count(),
            skipped = skipped.len(),
            "class keys unwrapped"
        );

        let ring = Self {
            keybag,
            skipped: skipped.clone(),
        };
        Ok((ring, skipped))
    }

    /// Borrow the unwrapped key for `class`.
    ///
    /// # Errors
    ///
    /// - [`BackupError::UnknownProtectionClass`] if the keybag has no such record
    /// - [`BackupError::ClassKeyNotUnwrapped`] if the record was skipped
    pub fn class_key(&self, class: ProtectionClass) -> Result<&Aes256Key32, BackupError> {
        let record = self
            .keybag
            .class(class)
            .ok_or(BackupError::UnknownProtectionClass(class))?;
        record
            .unwrapped_key
            .as_ref()
            .ok_or(BackupError::ClassKeyNotUnwrapped(class))
    }

    /// Classes left wrapped because of an unsupported wrap type.
    pub fn skipped(&self) -> &[SkippedClass] {
        &self.skipped
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassKeyRecord> {
        self.keybag.classes()
    }

    pub fn keybag(&self) -> &Keybag {
        &self.keybag
    }

    pub fn uuid(&self) -> &[u8; 16] {
        self.keybag.uuid()
    }
}

/// `Ok(None)` when unwrapped, `Ok(Some(_))` when skipped.
fn unwrap_record(
    record: &mut ClassKeyRecord,
    kek: &KeyEncryptionKey32,
) -> Result<Option<SkippedClass>, BackupError> {
    if record.wrap_type != WRAP_TYPE_PASSCODE {
        return Ok(Some(SkippedClass {
            class: record.class,
            wrap_type: record.wrap_type,
        }));
    }
    let key = unwrap_key(&record.wrapped_key, kek)?;
    record.unwrapped_key = Some(key);
    Ok(None)
}
