//! Reversible XCODE-style file obfuscation.
//!
//! Not a cipher: the key space is eight ASCII characters and the transform
//! is a keyed XOR stream.  It hides source text from casual reading, nothing
//! more.

pub mod key;
pub mod transform;
pub mod header;
pub mod stream;
pub mod pipeline;
pub mod classify;
pub mod report;
pub mod commands;

pub use key::{EncryptionKey, KeyWarning, NormalizedKey};
pub use header::{detect, FileHeader, FileState, HEADER_LEN};
pub use transform::{transform, Keystream};
pub use stream::{decode_bytes, decode_stream, encode_bytes, encode_stream, XcodeError};
pub use pipeline::{
    BatchResult, CancelToken, ConversionOutcome, ConvertOptions, Direction, Pipeline, SkipReason,
};
pub use classify::{classify, Classification};
pub use report::BatchSummary;
