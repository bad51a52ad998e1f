//! The keyed, self-inverse XCODE byte transform.
//!
//! # Keystream
//!
//! The payload is XORed with a keystream generated by a rolling CRC-16
//! register (CRC-16/MODBUS: reflected polynomial `0xA001`, init `0xFFFF`):
//!
//! ```text
//! state₀  = crc16(key[0..8])
//! stateₙ₊₁ = crc16_update(stateₙ, key[n mod 8] ^ (n mod 256))
//! ksₙ     = lo(stateₙ₊₁) ^ rotl(hi(stateₙ₊₁), n mod 8)
//! outₙ    = inₙ ^ ksₙ
//! ```
//!
//! The keystream depends only on the key and the byte position, never on the
//! data, so applying the transform twice with the same key is the identity.
//! Working state is three words regardless of payload size.
//!
//! This is an obfuscation scheme, not encryption.

use crate::key::{EncryptionKey, KEY_LEN};

const CRC16_POLY: u16 = 0xA001;
const CRC16_INIT: u16 = 0xFFFF;

const fn build_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ CRC16_POLY } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC16_TABLE: [u16; 256] = build_crc16_table();

/// Feed one byte into a CRC-16 register.
#[inline]
pub fn crc16_update(crc: u16, byte: u8) -> u16 {
    (crc >> 8) ^ CRC16_TABLE[((crc ^ byte as u16) & 0xFF) as usize]
}

/// CRC-16/MODBUS of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(CRC16_INIT, |crc, &b| crc16_update(crc, b))
}

// ── Keystream ─────────────────────────────────────────────────────────────────

/// Incremental transform state.  Feed consecutive chunks of one stream to
/// [`Keystream::apply`]; the result is independent of how the stream is cut.
#[derive(Debug, Clone)]
pub struct Keystream {
    key:   [u8; KEY_LEN],
    state: u16,
    pos:   u64,
}

impl Keystream {
    pub fn new(key: &EncryptionKey) -> Self {
        Self {
            key:   *key.as_bytes(),
            state: crc16(key.as_bytes()),
            pos:   0,
        }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.pos
    }

    #[inline]
    fn next_byte(&mut self) -> u8 {
        let lane = (self.pos % KEY_LEN as u64) as usize;
        self.state = crc16_update(self.state, self.key[lane] ^ self.pos as u8);
        self.pos += 1;
        (self.state as u8) ^ ((self.state >> 8) as u8).rotate_left(lane as u32)
    }

    /// Transform `buf` in place.
    pub fn apply(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b ^= self.next_byte();
        }
    }
}

/// One-shot transform.  `transform(k, &transform(k, p)) == p`.
pub fn transform(key: &EncryptionKey, payload: &[u8]) -> Vec<u8> {
    let mut out = payload.to_vec();
    Keystream::new(key).apply(&mut out);
    out
}
