//! Codec error types

use thiserror::Error;

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised by the crypto and archive codecs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The AEAD primitive refused to encrypt
    #[error("Encryption failed")]
    EncryptionFailed,

    /// Wrong passphrase, or the archive was corrupted or tampered with.
    ///
    /// The two cases are deliberately not distinguished.
    #[error("Decryption failed: wrong encryption key or corrupt archive")]
    DecryptionFailed,

    /// The archive is too short to contain the header and any ciphertext
    #[error("Invalid archive: {len} bytes is shorter than the {min} byte minimum")]
    InvalidArchive { len: usize, min: usize },

    /// A value in the blob has no archive representation
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// The compressed stream could not be inflated
    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    /// The payload decoded but does not have the backup shape
    #[error("Malformed archive: {0}")]
    MalformedArchive(String),
}

impl CodecError {
    /// True when the failure happened while opening the encrypted envelope
    pub fn is_envelope_error(&self) -> bool {
        matches!(
            self,
            CodecError::DecryptionFailed | CodecError::InvalidArchive { .. }
        )
    }
}
