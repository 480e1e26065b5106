//! # Protection Classes
//!
//! The twelve security tiers a keybag holds one wrapped key for. Every class
//! key record and every file's metadata names exactly one of them.

use crate::error::BackupError;
use std::fmt;

/// Closed set of protection classes, indexed `0..=11`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum ProtectionClass {
    Unused = 0,
    Complete = 1,
    CompleteUnlessOpen = 2,
    CompleteUntilFirstUserAuthentication = 3,
    None = 4,
    Recovery = 5,
    AccessibleWhenUnlocked = 6,
    AccessibleAfterFirstUnlock = 7,
    AccessibleAlways = 8,
    AccessibleWhenUnlockedThisDeviceOnly = 9,
    AccessibleAfterFirstUnlockThisDeviceOnly = 10,
    AccessibleAlwaysThisDeviceOnly = 11,
}

impl ProtectionClass {
    /// All classes in index order.
    pub const ALL: [ProtectionClass; 12] = [
        ProtectionClass::Unused,
        ProtectionClass::Complete,
        ProtectionClass::CompleteUnlessOpen,
        ProtectionClass::CompleteUntilFirstUserAuthentication,
        ProtectionClass::None,
        ProtectionClass::Recovery,
        ProtectionClass::AccessibleWhenUnlocked,
        ProtectionClass::AccessibleAfterFirstUnlock,
        ProtectionClass::AccessibleAlways,
        ProtectionClass::AccessibleWhenUnlockedThisDeviceOnly,
        ProtectionClass::AccessibleAfterFirstUnlockThisDeviceOnly,
        ProtectionClass::AccessibleAlwaysThisDeviceOnly,
    ];

    /// Map a raw class index to its enum value.
    ///
    /// # Errors
    ///
    /// [`BackupError::InvalidProtectionClass`] for any index outside `0..=11`.
    pub fn from_index(index: u32) -> Result<Self, BackupError> {
        Self::ALL
            .get(index as usize)
            .copied()
            .ok_or(BackupError::InvalidProtectionClass(index))
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self as u32
    }

    /// Vendor name of the class, as shown by device tooling.
    pub const fn name(self) -> &'static str {
        match self {
            ProtectionClass::Unused => "Unused",
            ProtectionClass::Complete => "NSFileProtectionComplete",
            ProtectionClass::CompleteUnlessOpen => "NSFileProtectionCompleteUnlessOpen",
            ProtectionClass::CompleteUntilFirstUserAuthentication => {
                "NSFileProtectionCompleteUntilFirstUserAuthentication"
            }
            ProtectionClass::None => "NSFileProtectionNone",
            ProtectionClass::Recovery => "NSFileProtectionRecovery",
            ProtectionClass::AccessibleWhenUnlocked => "kSecAttrAccessibleWhenUnlocked",
            ProtectionClass::AccessibleAfterFirstUnlock => "kSecAttrAccessibleAfterFirstUnlock",
            ProtectionClass::AccessibleAlways => "kSecAttrAccessibleAlways",
            ProtectionClass::AccessibleWhenUnlockedThisDeviceOnly => {
                "kSecAttrAccessibleWhenUnlockedThisDeviceOnly"
            }
            ProtectionClass::AccessibleAfterFirstUnlockThisDeviceOnly => {
                "kSecAttrAccessibleAfterFirstUnlockThisDeviceOnly"
            }
            ProtectionClass::AccessibleAlwaysThisDeviceOnly => {
                "kSecAttrAccessibleAlwaysThisDeviceOnly"
            }
        }
    }
}

impl TryFrom<u32> for ProtectionClass {
    type Error = BackupError;

    fn try_from(index: u32) -> Result<Self, Self::Error> {
        Self::from_index(index)
    }
}

impl fmt::Display for ProtectionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.index())
    }
}
