//! Passphrase-based authenticated encryption for backup archives
//!
//! Every archive gets a fresh salt and nonce. The key is derived with
//! PBKDF2-HMAC-SHA256 and the payload sealed with AES-256-GCM. The output
//! layout is:
//!
//! ```text
//! salt (16) || nonce (12) || tag (16) || ciphertext (len(plaintext))
//! ```

use aes_gcm::{
    Aes256Gcm, Key, Nonce, Tag,
    aead::{AeadInPlace, KeyInit, OsRng, rand_core::RngCore},
};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{CodecError, CodecResult};
use crate::passphrase::Passphrase;

pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const KEY_LEN: usize = 32;
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Header length plus at least one byte of ciphertext
pub const MIN_ARCHIVE_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN + 1;

const HEADER_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN;

/// Derive the 256-bit archive key from a passphrase and salt
fn derive_key(passphrase: &Passphrase, salt: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, PBKDF2_ITERATIONS, key.as_mut());
    key
}

fn cipher_for(passphrase: &Passphrase, salt: &[u8]) -> Aes256Gcm {
    let key = derive_key(passphrase, salt);
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_ref()))
}

/// Encrypt `plaintext` under `passphrase`
///
/// Two calls with the same inputs produce different archives.
///
/// # Errors
///
/// Returns `CodecError::EncryptionFailed` if the cipher rejects the input.
pub fn encrypt(plaintext: &[u8], passphrase: &Passphrase) -> CodecResult<Vec<u8>> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce_bytes);

    let cipher = cipher_for(passphrase, &salt);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(nonce, b"", &mut buffer)
        .map_err(|_| CodecError::EncryptionFailed)?;

    let mut archive = Vec::with_capacity(HEADER_LEN + buffer.len());
    archive.extend_from_slice(&salt);
    archive.extend_from_slice(&nonce_bytes);
    archive.extend_from_slice(tag.as_slice());
    archive.extend_from_slice(&buffer);
    Ok(archive)
}

/// Decrypt an archive produced by [`encrypt`]
///
/// # Errors
///
/// - `CodecError::InvalidArchive` if the input is shorter than [`MIN_ARCHIVE_LEN`]
/// - `CodecError::DecryptionFailed` for a wrong passphrase or any tampering
pub fn decrypt(archive: &[u8], passphrase: &Passphrase) -> CodecResult<Vec<u8>> {
    if archive.len() < MIN_ARCHIVE_LEN {
        return Err(CodecError::InvalidArchive {
            len: archive.len(),
            min: MIN_ARCHIVE_LEN,
        });
    }

    let (salt, rest) = archive.split_at(SALT_LEN);
    let (nonce_bytes, rest) = rest.split_at(NONCE_LEN);
    let (tag_bytes, ciphertext) = rest.split_at(TAG_LEN);

    let cipher = cipher_for(passphrase, salt);
    let nonce = Nonce::from_slice(nonce_bytes);
    let tag = Tag::from_slice(tag_bytes);

    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(nonce, b"", &mut buffer, tag)
        .map_err(|_| CodecError::DecryptionFailed)?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn key() -> Passphrase {
        Passphrase::new("correct horse battery staple")
    }

    #[test]
    fn test_roundtrip() {
        let plaintext = b"the quick brown fox";
        let archive = encrypt(plaintext, &key()).unwrap();

        assert_eq!(archive.len(), HEADER_LEN + plaintext.len());
        assert_eq!(decrypt(&archive, &key()).unwrap(), plaintext);
    }

    #[test]
    fn test_fresh_salt_and_nonce_per_call() {
        let a = encrypt(b"same input", &key()).unwrap();
        let b = encrypt(b"same input", &key()).unwrap();

        assert_ne!(a[..SALT_LEN], b[..SALT_LEN]);
        assert_ne!(a[SALT_LEN..SALT_LEN + NONCE_LEN], b[SALT_LEN..SALT_LEN + NONCE_LEN]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_passphrase_fails() {
        let archive = encrypt(b"secret rows", &key()).unwrap();
        let result = decrypt(&archive, &Passphrase::new("wrong"));
        assert_eq!(result, Err(CodecError::DecryptionFailed));
    }

    #[test]
    fn test_any_flipped_byte_is_detected() {
        let archive = encrypt(b"tamper", &key()).unwrap();

        // Salt and nonce flips change the derived key or keystream; tag and
        // ciphertext flips break authentication.
        for index in 0..archive.len() {
            let mut tampered = archive.clone();
            tampered[index] ^= 0x01;
            assert_eq!(
                decrypt(&tampered, &key()),
                Err(CodecError::DecryptionFailed),
                "flip at byte {index} went undetected"
            );
        }
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let archive = encrypt(b"two or more bytes", &key()).unwrap();
        let truncated = &archive[..archive.len() - 1];
        assert_eq!(decrypt(truncated, &key()), Err(CodecError::DecryptionFailed));
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(16)]
    #[case(28)]
    #[case(44)]
    fn test_short_input_is_invalid_archive(#[case] len: usize) {
        let input = vec![0u8; len];
        assert_eq!(
            decrypt(&input, &key()),
            Err(CodecError::InvalidArchive {
                len,
                min: MIN_ARCHIVE_LEN
            })
        );
    }

    #[test]
    fn test_minimum_length_input_is_decryption_failure() {
        let input = vec![0u8; MIN_ARCHIVE_LEN];
        assert_eq!(decrypt(&input, &key()), Err(CodecError::DecryptionFailed));
    }
}
