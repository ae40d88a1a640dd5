//! Private Files Vault - Container Cipher
//!
//! AES-256-CBC with PKCS7 padding, streamed over files and buffers.
//! There is no authentication tag: a padding failure is the only signal that
//! the password is wrong, and it cannot be told apart from damaged ciphertext.

use std::fs::{self, File, OpenOptions};
use std::io::{Cursor, ErrorKind, Read, Write};
use std::path::Path;

use aes::cipher::{
    block_padding::Pkcs7, generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut,
    KeyIvInit,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::keys::CipherKey;
use crate::error::{VaultError, VaultResult};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES block size
pub const BLOCK_LEN: usize = 16;

/// Streaming chunk size (multiple of the block size)
const CHUNK_LEN: usize = 64 * 1024;

// ═══════════════════════════════════════════════════════════════════════════
// STREAMS
// ═══════════════════════════════════════════════════════════════════════════

/// Encrypt everything `reader` yields into `writer`. Returns ciphertext length.
pub fn encrypt_stream<R: Read, W: Write>(
    key: &CipherKey,
    reader: &mut R,
    writer: &mut W,
) -> VaultResult<u64> {
    let mut cipher = Aes256CbcEnc::new(
        GenericArray::from_slice(key.key()),
        GenericArray::from_slice(key.iv()),
    );

    // One spare block so the final chunk can be padded in place
    let mut buf = vec![0u8; CHUNK_LEN + BLOCK_LEN];
    let mut written = 0u64;

    loop {
        let n = read_full(reader, &mut buf[..CHUNK_LEN])?;

        if n < CHUNK_LEN {
            let out = cipher
                .encrypt_padded_mut::<Pkcs7>(&mut buf, n)
                .map_err(|_| VaultError::EncryptionFailed("padding buffer too small".into()))?;
            writer.write_all(out)?;
            written += out.len() as u64;
            break;
        }

        for block in buf[..CHUNK_LEN].chunks_exact_mut(BLOCK_LEN) {
            cipher.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        writer.write_all(&buf[..CHUNK_LEN])?;
        written += CHUNK_LEN as u64;
    }

    Ok(written)
}

/// Decrypt exactly `len` ciphertext bytes from `reader` into `writer`.
/// Returns plaintext length.
///
/// The last block is held back until the end so the padding can be checked.
pub fn decrypt_stream<R: Read, W: Write>(
    key: &CipherKey,
    reader: &mut R,
    len: u64,
    writer: &mut W,
) -> VaultResult<u64> {
    if len == 0 || len % BLOCK_LEN as u64 != 0 {
        return Err(VaultError::DecryptionFailed(format!(
            "ciphertext length {} is not a whole number of blocks",
            len
        )));
    }

    let mut cipher = Aes256CbcDec::new(
        GenericArray::from_slice(key.key()),
        GenericArray::from_slice(key.iv()),
    );

    let mut buf = vec![0u8; CHUNK_LEN];
    let mut remaining = len - BLOCK_LEN as u64;
    let mut written = 0u64;

    while remaining > 0 {
        let take = remaining.min(CHUNK_LEN as u64) as usize;
        reader.read_exact(&mut buf[..take])?;

        for block in buf[..take].chunks_exact_mut(BLOCK_LEN) {
            cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        writer.write_all(&buf[..take])?;

        remaining -= take as u64;
        written += take as u64;
    }

    let mut last = [0u8; BLOCK_LEN];
    reader.read_exact(&mut last)?;

    let tail = cipher
        .decrypt_padded_mut::<Pkcs7>(&mut last)
        .map_err(|_| VaultError::IncorrectPassword)?;
    writer.write_all(tail)?;

    Ok(written + tail.len() as u64)
}

// ═══════════════════════════════════════════════════════════════════════════
// FILES
// ═══════════════════════════════════════════════════════════════════════════

/// Encrypt `input` into a newly created `output`.
///
/// `output` must not exist. If anything fails after it was created, it is
/// removed before the error is returned.
pub fn encrypt_file(input: &Path, output: &Path, password: &str) -> VaultResult<()> {
    let key = CipherKey::from_password(password)?;

    if !input.is_file() {
        return Err(VaultError::NotFound(input.display().to_string()));
    }

    let mut dst = create_exclusive(output)?;

    let result = (|| -> VaultResult<()> {
        let mut src = File::open(input)?;
        encrypt_stream(&key, &mut src, &mut dst)?;
        dst.sync_all()?;
        Ok(())
    })();

    if result.is_err() {
        drop(dst);
        discard(output);
    }

    result
}

/// Decrypt `input` into a newly created `output`.
///
/// A padding failure comes back as [`VaultError::IncorrectPassword`]. The
/// partial output is removed on every failure path.
pub fn decrypt_file(input: &Path, output: &Path, password: &str) -> VaultResult<()> {
    let key = CipherKey::from_password(password)?;

    if !input.is_file() {
        return Err(VaultError::NotFound(input.display().to_string()));
    }

    let mut dst = create_exclusive(output)?;

    let result = (|| -> VaultResult<()> {
        let mut src = File::open(input)?;
        let len = src.metadata()?.len();
        decrypt_stream(&key, &mut src, len, &mut dst)?;
        dst.sync_all()?;
        Ok(())
    })();

    if result.is_err() {
        drop(dst);
        discard(output);
    }

    result
}

// ═══════════════════════════════════════════════════════════════════════════
// BUFFERS
// ═══════════════════════════════════════════════════════════════════════════

/// Encrypt a small buffer
pub fn encrypt_bytes(plaintext: &[u8], password: &str) -> VaultResult<Vec<u8>> {
    let key = CipherKey::from_password(password)?;
    let mut out = Vec::with_capacity(plaintext.len() + BLOCK_LEN);
    encrypt_stream(&key, &mut Cursor::new(plaintext), &mut out)?;
    Ok(out)
}

/// Decrypt a small buffer
pub fn decrypt_bytes(ciphertext: &[u8], password: &str) -> VaultResult<Vec<u8>> {
    let key = CipherKey::from_password(password)?;
    let mut out = Vec::with_capacity(ciphertext.len());
    decrypt_stream(
        &key,
        &mut Cursor::new(ciphertext),
        ciphertext.len() as u64,
        &mut out,
    )?;
    Ok(out)
}

/// Encrypt text to base64 ciphertext
pub fn encrypt_string(text: &str, password: &str) -> VaultResult<String> {
    Ok(STANDARD.encode(encrypt_bytes(text.as_bytes(), password)?))
}

/// Decrypt base64 ciphertext back to text
pub fn decrypt_string(encoded: &str, password: &str) -> VaultResult<String> {
    let ciphertext = STANDARD
        .decode(encoded.trim())
        .map_err(|e| VaultError::DecryptionFailed(format!("invalid base64: {}", e)))?;
    let plaintext = decrypt_bytes(&ciphertext, password)?;
    String::from_utf8(plaintext)
        .map_err(|e| VaultError::DecryptionFailed(format!("invalid UTF-8: {}", e)))
}

// ═══════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════

fn create_exclusive(path: &Path) -> VaultResult<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => VaultError::AlreadyExists(path.display().to_string()),
            _ => VaultError::Io(e),
        })
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            log::warn!("Could not remove partial output {}: {}", path.display(), e);
        }
    }
}

/// Read until `buf` is full or the reader is exhausted
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;
    use tempfile::tempdir;

    /// Deterministic payload so wrong-password outcomes are reproducible.
    /// Roughly one wrong key in 256 still yields valid padding; the seeds
    /// used with `vault-N`/`guess-N` below are pairs that do not.
    fn payload(seed: usize) -> Vec<u8> {
        let len = (seed * 37) % 300 + 1;
        (0..len).map(|j| ((seed * 31 + j * 7) % 251) as u8).collect()
    }

    #[test]
    fn test_bytes_roundtrip_across_block_boundaries() {
        for len in [0usize, 1, 15, 16, 17, 31, 32, 1000] {
            let mut data = vec![0u8; len];
            rand::thread_rng().fill_bytes(&mut data);

            let encrypted = encrypt_bytes(&data, "abc123").unwrap();
            assert_eq!(encrypted.len(), (len / BLOCK_LEN + 1) * BLOCK_LEN);

            let decrypted = decrypt_bytes(&encrypted, "abc123").unwrap();
            assert_eq!(decrypted, data);
        }
    }

    #[test]
    fn test_file_roundtrip_across_chunk_boundary() {
        let dir = tempdir().unwrap();

        for len in [CHUNK_LEN - 1, CHUNK_LEN, CHUNK_LEN + 1, 3 * CHUNK_LEN + 5] {
            let input = dir.path().join(format!("in-{}", len));
            let sealed = dir.path().join(format!("sealed-{}", len));
            let output = dir.path().join(format!("out-{}", len));

            let mut data = vec![0u8; len];
            rand::thread_rng().fill_bytes(&mut data);
            fs::write(&input, &data).unwrap();

            encrypt_file(&input, &sealed, "pw").unwrap();
            decrypt_file(&sealed, &output, "pw").unwrap();

            assert_eq!(fs::read(&output).unwrap(), data);
        }
    }

    #[test]
    fn test_wrong_password_is_incorrect_password() {
        for i in 0..100 {
            let data = payload(i);
            let encrypted = encrypt_bytes(&data, &format!("vault-{}", i)).unwrap();
            let result = decrypt_bytes(&encrypted, &format!("guess-{}", i));

            assert!(
                matches!(result, Err(VaultError::IncorrectPassword)),
                "pair {} did not fail with IncorrectPassword",
                i
            );
        }
    }

    #[test]
    fn test_wrong_key_sometimes_passes_padding() {
        let right = CipherKey::derive("right", b"salt", 1).unwrap();
        let mut sealed = Vec::new();
        let len = encrypt_stream(&right, &mut Cursor::new(payload(7)), &mut sealed).unwrap();

        let trials = 4096;
        let mut accepted = 0;
        for i in 0..trials {
            let key = CipherKey::derive(&format!("wrong-{}", i), b"salt", 1).unwrap();
            let mut out = Vec::new();
            match decrypt_stream(&key, &mut Cursor::new(&sealed), len, &mut out) {
                Ok(_) => accepted += 1,
                Err(e) => assert!(matches!(e, VaultError::IncorrectPassword)),
            }
        }

        // About trials / 256; no tag means these go unnoticed
        assert!(accepted > 0 && accepted < 64, "{} of {} wrong keys accepted", accepted, trials);
    }

    #[test]
    fn test_string_roundtrip() {
        let encoded = encrypt_string("{\"Password\":\"p\"}", "app-key").unwrap();
        assert_eq!(decrypt_string(&encoded, "app-key").unwrap(), "{\"Password\":\"p\"}");

        assert!(matches!(
            decrypt_string("***not base64***", "app-key"),
            Err(VaultError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_partial_block_is_not_a_password_error() {
        let encrypted = encrypt_bytes(b"some payload", "pw").unwrap();
        let result = decrypt_bytes(&encrypted[..encrypted.len() - 3], "pw");
        assert!(matches!(result, Err(VaultError::DecryptionFailed(_))));

        assert!(matches!(
            decrypt_bytes(&[], "pw"),
            Err(VaultError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_missing_input_is_not_found() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("out");

        let result = encrypt_file(&dir.path().join("missing"), &output, "pw");
        assert!(matches!(result, Err(VaultError::NotFound(_))));
        assert!(!output.exists());
    }

    #[test]
    fn test_existing_output_is_never_clobbered() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        fs::write(&input, b"new").unwrap();
        fs::write(&output, b"keep me").unwrap();

        let result = encrypt_file(&input, &output, "pw");
        assert!(matches!(result, Err(VaultError::AlreadyExists(_))));
        assert_eq!(fs::read(&output).unwrap(), b"keep me");
    }

    #[test]
    fn test_failed_decrypt_removes_partial_output() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in");
        let sealed = dir.path().join("sealed");
        let output = dir.path().join("out");

        fs::write(&input, payload(3)).unwrap();
        encrypt_file(&input, &sealed, "vault-3").unwrap();

        let result = decrypt_file(&sealed, &output, "guess-3");
        assert!(matches!(result, Err(VaultError::IncorrectPassword)));
        assert!(!output.exists());
    }
}
