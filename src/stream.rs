//! Streaming codec: `[FileHeader][transformed payload]` over `Read`/`Write`.
//!
//! Payload bytes move through a fixed [`CHUNK_SIZE`] buffer, so memory use is
//! constant regardless of file size.

use std::io::{self, Read, Write};

use log::trace;
use thiserror::Error;

use crate::header::{self, FileHeader, HeaderError, HEADER_LEN};
use crate::key::EncryptionKey;
use crate::transform::Keystream;

/// Working buffer size: 64 KiB.
pub const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum XcodeError {
    #[error("Header error: {0}")]
    Header(#[from] HeaderError),
    #[error("Payload truncated: expected {expected} bytes, found {actual}")]
    Truncated { expected: u64, actual: u64 },
    #[error("Unexpected data after the declared {0}-byte payload")]
    TrailingData(u64),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Transform everything `reader` yields into `writer`.  Returns the byte count.
fn pump<R: Read, W: Write>(ks: &mut Keystream, mut reader: R, mut writer: W) -> io::Result<u64> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        ks.apply(&mut buf[..n]);
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
    Ok(total)
}

/// Fail if `reader` has anything left.
fn expect_eof<R: Read>(mut reader: R, declared: u64) -> Result<(), XcodeError> {
    let mut extra = [0u8; 1];
    loop {
        match reader.read(&mut extra) {
            Ok(0) => return Ok(()),
            Ok(_) => return Err(XcodeError::TrailingData(declared)),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Write the header for a `payload_len`-byte payload, then the transformed
/// payload read from `reader`.
///
/// `reader` must yield exactly `payload_len` bytes; a source that grows or
/// shrinks while being read is reported rather than producing a header that
/// lies about its payload.
pub fn encode_stream<R: Read, W: Write>(
    key:         &EncryptionKey,
    mut reader:  R,
    payload_len: u64,
    mut writer:  W,
) -> Result<FileHeader, XcodeError> {
    let header = FileHeader::new(key, payload_len);
    header.write(&mut writer)?;

    let mut ks = Keystream::new(key);
    let actual = pump(&mut ks, (&mut reader).take(payload_len), &mut writer)?;
    if actual < payload_len {
        return Err(XcodeError::Truncated { expected: payload_len, actual });
    }
    expect_eof(&mut reader, payload_len)?;
    trace!("encoded {payload_len} payload bytes");
    Ok(header)
}

/// Validate the header (signature, checksum, key fingerprint) and write the
/// restored payload to `writer`.
pub fn decode_stream<R: Read, W: Write>(
    key:        &EncryptionKey,
    mut reader: R,
    mut writer: W,
) -> Result<FileHeader, XcodeError> {
    let header = FileHeader::read(&mut reader)?;
    header.verify_key(key)?;

    let expected = header.payload_len;
    let mut ks = Keystream::new(key);
    let actual = pump(&mut ks, (&mut reader).take(expected), &mut writer)?;
    if actual < expected {
        return Err(XcodeError::Truncated { expected, actual });
    }
    expect_eof(&mut reader, expected)?;
    trace!("decoded {expected} payload bytes");
    Ok(header)
}

/// In-memory encode.
pub fn encode_bytes(key: &EncryptionKey, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&FileHeader::new(key, payload.len() as u64).to_bytes());
    let start = out.len();
    out.extend_from_slice(payload);
    Keystream::new(key).apply(&mut out[start..]);
    out
}

/// In-memory decode.
pub fn decode_bytes(key: &EncryptionKey, encoded: &[u8]) -> Result<Vec<u8>, XcodeError> {
    let (header, payload) = header::strip(encoded)?;
    header.verify_key(key)?;
    let declared = header.payload_len;
    let actual = payload.len() as u64;
    if actual < declared {
        return Err(XcodeError::Truncated { expected: declared, actual });
    }
    if actual > declared {
        return Err(XcodeError::TrailingData(declared));
    }
    let mut out = payload.to_vec();
    Keystream::new(key).apply(&mut out);
    Ok(out)
}
