//! Private Files Vault - Key Derivation
//!
//! Derives the AES-256 key and CBC initialization vector from a password.

use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{VaultError, VaultResult};

/// Key length for AES-256
pub const KEY_LEN: usize = 32;

/// IV length (one AES block)
pub const IV_LEN: usize = 16;

/// Application salt shared by every container
pub const SALT: &[u8] = b"275010a649c4d5690f10dc49b9418456";

/// PBKDF2 iteration count shared by every container
pub const ITERATIONS: u32 = 2048;

/// Key + IV pair, zeroized on drop.
///
/// Both come out of one PBKDF2-HMAC-SHA1 stream: the first 32 bytes are the
/// key and the next 16 the IV.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CipherKey {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
}

impl CipherKey {
    /// Derive with an explicit salt and iteration count
    pub fn derive(password: &str, salt: &[u8], iterations: u32) -> VaultResult<Self> {
        if iterations == 0 {
            return Err(VaultError::KeyDerivationFailed(
                "iteration count must be positive".into(),
            ));
        }

        let mut okm = [0u8; KEY_LEN + IV_LEN];
        pbkdf2_hmac::<Sha1>(password.as_bytes(), salt, iterations, &mut okm);

        let mut key = [0u8; KEY_LEN];
        let mut iv = [0u8; IV_LEN];
        key.copy_from_slice(&okm[..KEY_LEN]);
        iv.copy_from_slice(&okm[KEY_LEN..]);
        okm.zeroize();

        Ok(Self { key, iv })
    }

    /// Derive with the application salt and iteration count
    pub fn from_password(password: &str) -> VaultResult<Self> {
        Self::derive(password, SALT, ITERATIONS)
    }

    /// Expose the key bytes (use with caution)
    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// Expose the IV bytes
    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }
}

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CipherKey([REDACTED])")
    }
}
