//! # Key Derivation Functions (KDF)
//!
//! ## Modules
//!
//! - [`passcode`] - two-round PBKDF2 that turns the backup password into the
//!   key-encryption key for class keys

pub mod passcode;
