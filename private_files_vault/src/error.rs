//! Private Files Vault - Error Types

use thiserror::Error;

/// Result type for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

/// Vault error types
#[derive(Error, Debug)]
pub enum VaultError {
    // ═══════════════════════════════════════════════════════════════
    // CRYPTO ERRORS
    // ═══════════════════════════════════════════════════════════════

    /// Padding did not validate after decryption. Either the password is
    /// wrong or the ciphertext is damaged; the two cannot be told apart.
    #[error("Incorrect password (or damaged ciphertext)")]
    IncorrectPassword,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("No vault password is set")]
    PasswordNotSet,

    // ═══════════════════════════════════════════════════════════════
    // CONTAINER ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Malformed container: {0}")]
    MalformedContainer(String),

    // ═══════════════════════════════════════════════════════════════
    // FILE ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("File or folder not found: {0}")]
    NotFound(String),

    #[error("File already exists: {0}")]
    AlreadyExists(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ═══════════════════════════════════════════════════════════════
    // CATALOG ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Database error: {0}")]
    DatabaseError(String),

    // ═══════════════════════════════════════════════════════════════
    // THUMBNAIL ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Thumbnail generation failed: {0}")]
    ThumbnailFailed(String),

    #[error("Image processing error: {0}")]
    ImageError(String),

    // ═══════════════════════════════════════════════════════════════
    // PIPELINE ERRORS
    // ═══════════════════════════════════════════════════════════════

    /// A fault in the packaging loop itself, never a single item failure.
    #[error("Batch pipeline fault: {0}")]
    PipelineFault(String),

    // ═══════════════════════════════════════════════════════════════
    // SERIALIZATION ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl VaultError {
    /// The user should be asked for the password again
    pub fn needs_password_retry(&self) -> bool {
        matches!(self, VaultError::IncorrectPassword)
    }

    /// Source file, folder or container is missing
    pub fn is_not_found(&self) -> bool {
        match self {
            VaultError::NotFound(_) => true,
            VaultError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Container bytes cannot be trusted
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            VaultError::MalformedContainer(_) | VaultError::DecryptionFailed(_)
        )
    }
}

impl From<rusqlite::Error> for VaultError {
    fn from(e: rusqlite::Error) -> Self {
        VaultError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::SerializationError(e.to_string())
    }
}

impl From<zip::result::ZipError> for VaultError {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(e) => VaultError::Io(e),
            other => VaultError::MalformedContainer(other.to_string()),
        }
    }
}

impl From<image::ImageError> for VaultError {
    fn from(e: image::ImageError) -> Self {
        VaultError::ImageError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(VaultError::IncorrectPassword.needs_password_retry());
        assert!(!VaultError::NotFound("x".into()).needs_password_retry());

        assert!(VaultError::NotFound("x".into()).is_not_found());
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(VaultError::from(io).is_not_found());

        assert!(VaultError::MalformedContainer("bad".into()).is_corruption());
        assert!(!VaultError::IncorrectPassword.is_corruption());
    }
}
