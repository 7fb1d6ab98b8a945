//! Compact archive encoding for [`BackupBlob`]
//!
//! A blob is written as compact JSON with sorted keys and compressed with
//! gzip at the best compression level.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::blob::BackupBlob;
use crate::crypto;
use crate::error::{CodecError, CodecResult};
use crate::passphrase::Passphrase;

/// Serialize and compress a blob
///
/// # Errors
///
/// Returns `CodecError::SerializationFailed` if a value has no archive
/// representation (binary columns) or the compressor fails.
pub fn serialize(blob: &BackupBlob) -> CodecResult<Vec<u8>> {
    let json =
        serde_json::to_vec(blob).map_err(|e| CodecError::SerializationFailed(e.to_string()))?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(&json)
        .map_err(|e| CodecError::SerializationFailed(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| CodecError::SerializationFailed(e.to_string()))
}

/// Decompress and parse a blob
///
/// # Errors
///
/// - `CodecError::DecompressionFailed` if the gzip stream is invalid
/// - `CodecError::MalformedArchive` if the payload is not a backup document
pub fn deserialize(compressed: &[u8]) -> CodecResult<BackupBlob> {
    let mut decoder = GzDecoder::new(compressed);
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .map_err(|e| CodecError::DecompressionFailed(e.to_string()))?;

    let document: serde_json::Value = serde_json::from_slice(&json)
        .map_err(|e| CodecError::MalformedArchive(format!("invalid JSON: {e}")))?;

    for key in ["meta", "tables"] {
        match document.get(key) {
            Some(serde_json::Value::Object(_)) => {}
            Some(_) => {
                return Err(CodecError::MalformedArchive(format!(
                    "`{key}` must be an object"
                )));
            }
            None => {
                return Err(CodecError::MalformedArchive(format!(
                    "missing top-level `{key}`"
                )));
            }
        }
    }

    let blob: BackupBlob = serde_json::from_value(document)
        .map_err(|e| CodecError::MalformedArchive(e.to_string()))?;

    if !blob.is_consistent() {
        tracing::warn!(
            listed = blob.meta.tables.len(),
            present = blob.tables.len(),
            "Backup metadata table list does not match table data"
        );
    }

    Ok(blob)
}

/// Serialize, compress, then encrypt a blob
pub fn seal(blob: &BackupBlob, passphrase: &Passphrase) -> CodecResult<Vec<u8>> {
    let compressed = serialize(blob)?;
    crypto::encrypt(&compressed, passphrase)
}

/// Decrypt, decompress, then parse an archive produced by [`seal`]
pub fn open(archive: &[u8], passphrase: &Passphrase) -> CodecResult<BackupBlob> {
    let compressed = crypto::decrypt(archive, passphrase)?;
    deserialize(&compressed)
}
