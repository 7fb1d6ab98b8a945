//! # Strongbox Core
//!
//! The backup data model and the two codecs every archive passes through:
//! an archive codec (compact JSON, gzip) and a crypto codec (PBKDF2 key
//! derivation, AES-256-GCM).
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use strongbox_core::{BackupBlob, Passphrase, archive};
//!
//! let blob = BackupBlob::new(BTreeMap::new());
//! let key = Passphrase::new("correct horse battery staple");
//! let sealed = archive::seal(&blob, &key)?;
//! assert_eq!(archive::open(&sealed, &key)?, blob);
//! # Ok::<(), strongbox_core::CodecError>(())
//! ```

pub mod archive;
pub mod blob;
pub mod crypto;
pub mod error;
pub mod passphrase;
pub mod value;

pub use blob::{BackupBlob, BackupMeta, FORMAT_VERSION};
pub use error::{CodecError, CodecResult};
pub use passphrase::Passphrase;
pub use value::{Row, Value};
