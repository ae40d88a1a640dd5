//! Private Files Vault - Cryptographic Core
//!
//! Password-derived AES-256-CBC used for every container and for the
//! encrypted profile.

pub mod cipher;
pub mod keys;

pub use cipher::*;
pub use keys::*;
