//! Caller-supplied backup passphrase

use std::fmt;

use zeroize::Zeroizing;

/// Passphrase used to derive the archive key.
///
/// The contents are wiped on drop and never appear in `Debug` output.
#[derive(Clone)]
pub struct Passphrase(Zeroizing<String>);

impl Passphrase {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Passphrase typed or pasted by a user.
    ///
    /// Surrounding whitespace is dropped so the same key derives the same
    /// archive key whichever way it was supplied. Returns `None` when blank.
    pub fn from_input(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self::new(trimmed))
    }

    /// Load the passphrase from an environment variable
    ///
    /// Returns `None` when the variable is unset or blank.
    pub fn from_env(var_name: &str) -> Option<Self> {
        let value = std::env::var(var_name).ok()?;
        Self::from_input(&value)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<&str> for Passphrase {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Passphrase {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}
