//! Key normalization: any user string → the fixed 8-byte XCODE key.
//!
//! | input                     | key bytes                         |
//! |---------------------------|-----------------------------------|
//! | absent / `""`             | `"Progress"`                      |
//! | `"ABCDEFGHIJK"` (> 8)     | `"ABCDEFGH"` + `Truncated` warning |
//! | `"abc"` (< 8)             | `"abc\0\0\0\0\0"`                 |
//! | `"clé"` (non-ASCII)       | `"cl?\0\0\0\0\0"` + `NonAscii` warning |
//!
//! Normalization never fails; problems are reported as [`KeyWarning`]s.

use std::fmt;

use log::{info, warn};

use crate::transform::crc16;

/// Length of every key fed to the transform.
pub const KEY_LEN: usize = 8;

/// Key used when the caller supplies none.
pub const DEFAULT_KEY: &str = "Progress";

/// Filler byte appended to keys shorter than [`KEY_LEN`].
pub const KEY_FILLER: u8 = 0x00;

/// Replacement for characters outside the ASCII range.
const NON_ASCII_REPLACEMENT: u8 = b'?';

// ── KeyWarning ────────────────────────────────────────────────────────────────

/// Non-fatal remark produced while normalizing a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyWarning {
    /// No key was given; [`DEFAULT_KEY`] is in use.
    DefaultKeyUsed,
    /// The key exceeded [`KEY_LEN`] characters; only `used` is kept.
    Truncated { used: String },
    /// At least one character was outside ASCII and was replaced by `?`.
    NonAscii,
}

impl fmt::Display for KeyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyWarning::DefaultKeyUsed => {
                write!(f, "using default encryption key \"{DEFAULT_KEY}\"")
            }
            KeyWarning::Truncated { used } => write!(
                f,
                "the max length for an encryption key is {KEY_LEN} characters, \
                 the actual key used will be \"{used}\""
            ),
            KeyWarning::NonAscii => {
                write!(f, "non-ASCII characters in the encryption key were replaced by '?'")
            }
        }
    }
}

// ── EncryptionKey ─────────────────────────────────────────────────────────────

/// The canonical 8-byte key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncryptionKey([u8; KEY_LEN]);

/// Result of [`EncryptionKey::normalize`].
#[derive(Debug, Clone)]
pub struct NormalizedKey {
    pub key:      EncryptionKey,
    pub warnings: Vec<KeyWarning>,
}

impl EncryptionKey {
    /// Canonicalize a user-supplied key.
    pub fn normalize(raw: Option<&str>) -> NormalizedKey {
        let mut warnings = Vec::new();

        let raw = match raw {
            Some(s) if !s.is_empty() => s,
            _ => {
                warnings.push(KeyWarning::DefaultKeyUsed);
                DEFAULT_KEY
            }
        };

        let kept: String = raw.chars().take(KEY_LEN).collect();
        if raw.chars().count() > KEY_LEN {
            warnings.push(KeyWarning::Truncated { used: kept.clone() });
        }

        let mut bytes = [KEY_FILLER; KEY_LEN];
        let mut non_ascii = false;
        for (slot, c) in bytes.iter_mut().zip(kept.chars()) {
            *slot = if c.is_ascii() {
                c as u8
            } else {
                non_ascii = true;
                NON_ASCII_REPLACEMENT
            };
        }
        if non_ascii {
            warnings.push(KeyWarning::NonAscii);
        }

        for w in &warnings {
            match w {
                KeyWarning::DefaultKeyUsed => info!("{w}"),
                _ => warn!("{w}"),
            }
        }

        NormalizedKey { key: EncryptionKey(bytes), warnings }
    }

    /// Shorthand for `normalize(raw).key` when warnings are not needed.
    pub fn from_str_lossy(raw: &str) -> Self {
        Self::normalize(Some(raw)).key
    }

    /// Raw bytes, bypassing normalization.  Lets tests drive the transform
    /// with keys outside the ASCII range.
    pub(crate) fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        EncryptionKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// CRC-16 of the key bytes, stored in every header so that decoding with
    /// the wrong key is refused instead of producing garbage.
    pub fn fingerprint(&self) -> u16 {
        crc16(&self.0)
    }
}

impl Default for EncryptionKey {
    fn default() -> Self {
        let mut bytes = [KEY_FILLER; KEY_LEN];
        bytes.copy_from_slice(DEFAULT_KEY.as_bytes());
        EncryptionKey(bytes)
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey({})", hex::encode(self.0))
    }
}
