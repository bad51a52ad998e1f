//! File header: marks a file as XCODE-transformed.
//!
//! # Layout (20 bytes, little-endian)
//!
//! | offset | size | field           |
//! |--------|------|-----------------|
//! | 0      | 4    | signature `11 58 43 44` (`\x11XCD`) |
//! | 4      | 1    | version (1)     |
//! | 5      | 1    | flags (reserved, 0) |
//! | 6      | 2    | key fingerprint (CRC-16 of the key) |
//! | 8      | 8    | payload length  |
//! | 16     | 4    | CRC-32 of bytes 0..16 |
//!
//! Detection reads at most [`HEADER_LEN`] bytes and never needs the key.

use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use log::trace;
use thiserror::Error;

use crate::key::EncryptionKey;

pub const SIGNATURE: [u8; 4] = [0x11, b'X', b'C', b'D'];
pub const VERSION: u8 = 1;
pub const HEADER_LEN: usize = 20;

/// Bytes covered by the header checksum.
const CHECKED_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Invalid signature")]
    BadSignature,
    #[error("Unsupported header version: {0}")]
    UnsupportedVersion(u8),
    #[error("Unsupported header flags: {0:#04x}")]
    UnsupportedFlags(u8),
    #[error("Header checksum mismatch (stored {stored:08x}, computed {computed:08x})")]
    ChecksumMismatch { stored: u32, computed: u32 },
    #[error("Header truncated: only {0} bytes present")]
    Truncated(usize),
    #[error("Wrong key: file was encoded with key fingerprint {expected:04x}, got {found:04x}")]
    KeyMismatch { expected: u16, found: u16 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── FileState ─────────────────────────────────────────────────────────────────

/// Why a file that looks transformed cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    /// Fewer than [`HEADER_LEN`] bytes, all matching the start of a header.
    Truncated { len: usize },
    UnsupportedVersion(u8),
    /// Reserved flag bits are set.
    UnsupportedFlags(u8),
    ChecksumMismatch,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::Truncated { len } => {
                write!(f, "truncated header ({len} of {HEADER_LEN} bytes)")
            }
            InvalidReason::UnsupportedVersion(v) => write!(f, "unsupported version {v}"),
            InvalidReason::UnsupportedFlags(b) => write!(f, "unsupported flags {b:#04x}"),
            InvalidReason::ChecksumMismatch => write!(f, "header checksum mismatch"),
        }
    }
}

/// Result of [`detect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileState {
    Plain,
    Encoded,
    Invalid(InvalidReason),
}

impl FileState {
    pub fn is_encoded(&self) -> bool {
        matches!(self, FileState::Encoded)
    }
}

// ── FileHeader ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub version:         u8,
    pub flags:           u8,
    pub key_fingerprint: u16,
    pub payload_len:     u64,
}

impl FileHeader {
    pub fn new(key: &EncryptionKey, payload_len: u64) -> Self {
        Self {
            version:         VERSION,
            flags:           0,
            key_fingerprint: key.fingerprint(),
            payload_len,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&SIGNATURE);
        buf[4] = self.version;
        buf[5] = self.flags;
        buf[6..8].copy_from_slice(&self.key_fingerprint.to_le_bytes());
        buf[8..16].copy_from_slice(&self.payload_len.to_le_bytes());
        let crc = crc32fast::hash(&buf[..CHECKED_LEN]);
        buf[CHECKED_LEN..].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.to_bytes())
    }

    /// Parse a complete header.
    pub fn parse(buf: &[u8; HEADER_LEN]) -> Result<Self, HeaderError> {
        if buf[..SIGNATURE.len()] != SIGNATURE {
            return Err(HeaderError::BadSignature);
        }
        let mut r = Cursor::new(&buf[SIGNATURE.len()..]);
        let version = r.read_u8()?;
        if version != VERSION {
            return Err(HeaderError::UnsupportedVersion(version));
        }
        let flags           = r.read_u8()?;
        let key_fingerprint = r.read_u16::<LittleEndian>()?;
        let payload_len     = r.read_u64::<LittleEndian>()?;
        let stored          = r.read_u32::<LittleEndian>()?;

        let computed = crc32fast::hash(&buf[..CHECKED_LEN]);
        if stored != computed {
            return Err(HeaderError::ChecksumMismatch { stored, computed });
        }
        if flags != 0 {
            return Err(HeaderError::UnsupportedFlags(flags));
        }
        trace!("parsed header {}", hex::encode(buf));
        Ok(Self { version, flags, key_fingerprint, payload_len })
    }

    /// Read and parse a header from the start of `reader`.
    pub fn read<R: Read>(reader: R) -> Result<Self, HeaderError> {
        let (buf, n) = read_prefix(reader)?;
        if n < HEADER_LEN {
            return Err(HeaderError::Truncated(n));
        }
        Self::parse(&buf)
    }

    /// Refuse to decode with a key other than the one used to encode.
    pub fn verify_key(&self, key: &EncryptionKey) -> Result<(), HeaderError> {
        let found = key.fingerprint();
        if found != self.key_fingerprint {
            return Err(HeaderError::KeyMismatch { expected: self.key_fingerprint, found });
        }
        Ok(())
    }
}

/// Split an encoded buffer into its header and the payload that follows.
pub fn strip(bytes: &[u8]) -> Result<(FileHeader, &[u8]), HeaderError> {
    if bytes.len() < HEADER_LEN {
        return Err(HeaderError::Truncated(bytes.len()));
    }
    let (head, payload) = bytes.split_at(HEADER_LEN);
    let mut buf = [0u8; HEADER_LEN];
    buf.copy_from_slice(head);
    Ok((FileHeader::parse(&buf)?, payload))
}

// ── Detection ─────────────────────────────────────────────────────────────────

/// Read up to `HEADER_LEN` bytes, stopping early only at end of stream.
fn read_prefix<R: Read>(mut reader: R) -> io::Result<([u8; HEADER_LEN], usize)> {
    let mut buf = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok((buf, filled))
}

/// Classify the leading bytes of a file.
pub fn classify_prefix(prefix: &[u8]) -> FileState {
    let sig = prefix.len().min(SIGNATURE.len());
    let starts_like_header = !prefix.is_empty() && prefix[..sig] == SIGNATURE[..sig];

    if prefix.len() < HEADER_LEN {
        return if starts_like_header {
            FileState::Invalid(InvalidReason::Truncated { len: prefix.len() })
        } else {
            FileState::Plain
        };
    }
    if !starts_like_header {
        return FileState::Plain;
    }

    let mut buf = [0u8; HEADER_LEN];
    buf.copy_from_slice(&prefix[..HEADER_LEN]);
    match FileHeader::parse(&buf) {
        Ok(_) => FileState::Encoded,
        Err(HeaderError::UnsupportedVersion(v)) => {
            FileState::Invalid(InvalidReason::UnsupportedVersion(v))
        }
        Err(HeaderError::UnsupportedFlags(b)) => {
            FileState::Invalid(InvalidReason::UnsupportedFlags(b))
        }
        Err(_) => FileState::Invalid(InvalidReason::ChecksumMismatch),
    }
}

/// Classify a stream by its first [`HEADER_LEN`] bytes.
pub fn detect_reader<R: Read>(reader: R) -> io::Result<FileState> {
    let (buf, n) = read_prefix(reader)?;
    Ok(classify_prefix(&buf[..n]))
}

/// Classify a file on disk.  Reads at most [`HEADER_LEN`] bytes.
pub fn detect<P: AsRef<Path>>(path: P) -> io::Result<FileState> {
    detect_reader(File::open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Reader over an endless stream that records how much was consumed.
    struct CountingReader {
        consumed: usize,
    }

    impl Read for CountingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            buf.fill(b'a');
            self.consumed += buf.len();
            Ok(buf.len())
        }
    }

    fn header_bytes() -> [u8; HEADER_LEN] {
        FileHeader::new(&EncryptionKey::default(), 11).to_bytes()
    }

    #[test]
    fn layout_is_stable() {
        let bytes = header_bytes();
        assert_eq!(&bytes[..4], b"\x11XCD");
        assert_eq!(bytes[4], VERSION);
        assert_eq!(bytes[5], 0);
        assert_eq!(
            u16::from_le_bytes([bytes[6], bytes[7]]),
            EncryptionKey::default().fingerprint()
        );
        assert_eq!(&bytes[8..16], &11u64.to_le_bytes());
        assert_eq!(&bytes[16..], &crc32fast::hash(&bytes[..16]).to_le_bytes());
    }

    #[test]
    fn parse_roundtrip() {
        let h = FileHeader::new(&EncryptionKey::from_str_lossy("abc"), 1 << 40);
        assert_eq!(FileHeader::parse(&h.to_bytes()).unwrap(), h);
        assert_eq!(FileHeader::read(Cursor::new(h.to_bytes())).unwrap(), h);
    }

    #[test]
    fn detect_states() {
        let mut encoded = header_bytes().to_vec();
        encoded.extend_from_slice(b"payload....");
        assert_eq!(detect_reader(Cursor::new(&encoded)).unwrap(), FileState::Encoded);

        assert_eq!(classify_prefix(b"HELLO WORLD"), FileState::Plain);
        assert_eq!(classify_prefix(b""), FileState::Plain);
        assert_eq!(classify_prefix(&[0u8; 64]), FileState::Plain);

        assert_eq!(
            classify_prefix(&header_bytes()[..7]),
            FileState::Invalid(InvalidReason::Truncated { len: 7 })
        );
        assert_eq!(
            classify_prefix(&[0x11]),
            FileState::Invalid(InvalidReason::Truncated { len: 1 })
        );
    }

    #[test]
    fn detect_reads_only_the_header() {
        let mut plain = CountingReader { consumed: 0 };
        assert_eq!(detect_reader(&mut plain).unwrap(), FileState::Plain);
        assert!(plain.consumed <= HEADER_LEN);

        let mut encoded = header_bytes().to_vec();
        encoded.resize(4 * 1024 * 1024, 0x5A);
        let mut cursor = Cursor::new(&encoded);
        assert_eq!(detect_reader(&mut cursor).unwrap(), FileState::Encoded);
        assert_eq!(cursor.position(), HEADER_LEN as u64);
    }

    #[test]
    fn detect_does_not_need_the_key() {
        let h = FileHeader::new(&EncryptionKey::from_str_lossy("secret"), 0).to_bytes();
        assert_eq!(classify_prefix(&h), FileState::Encoded);
    }

    #[test]
    fn corrupt_header_is_invalid() {
        let mut bytes = header_bytes();
        bytes[10] ^= 0xFF;
        assert_eq!(classify_prefix(&bytes), FileState::Invalid(InvalidReason::ChecksumMismatch));

        let mut bytes = header_bytes();
        bytes[4] = 9;
        assert_eq!(
            classify_prefix(&bytes),
            FileState::Invalid(InvalidReason::UnsupportedVersion(9))
        );
    }

    #[test]
    fn reserved_flags_are_rejected() {
        let mut h = FileHeader::new(&EncryptionKey::default(), 3);
        h.flags = 0x02;
        let bytes = h.to_bytes();
        assert!(matches!(FileHeader::parse(&bytes), Err(HeaderError::UnsupportedFlags(0x02))));
        assert_eq!(
            classify_prefix(&bytes),
            FileState::Invalid(InvalidReason::UnsupportedFlags(0x02))
        );
    }

    #[test]
    fn strip_splits_payload() {
        let mut encoded = header_bytes().to_vec();
        encoded.extend_from_slice(b"rest");
        let (h, payload) = strip(&encoded).unwrap();
        assert_eq!(h.payload_len, 11);
        assert_eq!(payload, b"rest");
        assert!(matches!(strip(&encoded[..5]), Err(HeaderError::Truncated(5))));
    }

    #[test]
    fn verify_key() {
        let h = FileHeader::new(&EncryptionKey::default(), 0);
        assert!(h.verify_key(&EncryptionKey::from_str_lossy("Progress")).is_ok());
        assert!(matches!(
            h.verify_key(&EncryptionKey::from_str_lossy("other")),
            Err(HeaderError::KeyMismatch { .. })
        ));
    }

    proptest! {
        #[test]
        fn content_without_signature_is_plain(
            data in proptest::collection::vec(any::<u8>(), HEADER_LEN..1024)
                .prop_filter("starts like a header", |d| d[0] != SIGNATURE[0]),
        ) {
            prop_assert_eq!(detect_reader(Cursor::new(&data)).unwrap(), FileState::Plain);
        }
    }
}
