//! Record and content keys.
//!
//! - [`PrimaryKey`]: sequential 128-bit identifier assigned at ingestion time,
//!   stored as 16 big-endian bytes and transported as hex.
//! - [`ContentKey`]: 128-bit digest of a display string (title or author name),
//!   used to link every record that shares that exact string.
//!
//! The [`KeyAllocator`] hands out primary keys in strictly increasing order.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Sequential identifier for an ingested record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PrimaryKey(u128);

impl PrimaryKey {
    pub const fn new(raw: u128) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u128 {
        self.0
    }

    /// The 16-byte big-endian form used as the storage key.
    pub fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_be_bytes(bytes))
    }

    /// 32-digit lowercase hex, the form handed out in query responses.
    pub fn to_hex(self) -> String {
        format!("{:032x}", self.0)
    }

    /// Parse 1 to 32 hex digits. Returns `None` on anything else.
    pub fn from_hex(s: &str) -> Option<Self> {
        parse_hex_u128(s).map(Self)
    }
}

impl std::fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Deterministic digest of a display string.
///
/// The first 16 bytes of SHA-256 over the raw UTF-8 bytes, read big-endian.
/// No normalization is applied: strings that differ by a single byte address
/// different keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ContentKey(u128);

impl ContentKey {
    /// Digest a title or author name.
    pub fn of(text: &str) -> Self {
        let digest = Sha256::digest(text.as_bytes());
        let mut head = [0u8; 16];
        head.copy_from_slice(&digest[..16]);
        Self(u128::from_be_bytes(head))
    }

    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u128 {
        self.0
    }

    pub fn to_hex(self) -> String {
        format!("{:032x}", self.0)
    }
}

impl std::fmt::Display for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

fn parse_hex_u128(s: &str) -> Option<u128> {
    if s.is_empty() || s.len() > 32 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u128::from_str_radix(s, 16).ok()
}

/// Hands out primary keys in ingestion order, starting at 0.
///
/// Owned by a single ingestion pipeline; a key that was handed out is never
/// reissued, even if the record it was meant for failed to be written.
#[derive(Debug, Default)]
pub struct KeyAllocator {
    next: u128,
}

impl KeyAllocator {
    /// Create an allocator whose first key is 0.
    pub fn new() -> Self {
        Self { next: 0 }
    }

    /// Create an allocator that resumes at `start`.
    pub fn starting_from(start: u128) -> Self {
        Self { next: start }
    }

    /// Allocate the next key.
    pub fn next_key(&mut self) -> PrimaryKey {
        let key = PrimaryKey(self.next);
        self.next += 1;
        key
    }

    /// Number of keys handed out so far (including gaps).
    pub fn issued(&self) -> u128 {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_key_is_big_endian() {
        let key = PrimaryKey::new(1);
        let bytes = key.to_bytes();
        assert_eq!(bytes[15], 1);
        assert!(bytes[..15].iter().all(|b| *b == 0));
        assert_eq!(PrimaryKey::from_bytes(bytes), key);
    }

    #[test]
    fn primary_key_hex() {
        let key = PrimaryKey::new(0x2a);
        assert_eq!(key.to_hex(), "0000000000000000000000000000002a");
        assert_eq!(PrimaryKey::from_hex("2a"), Some(key));
        assert_eq!(PrimaryKey::from_hex(&key.to_hex()), Some(key));
        assert_eq!(PrimaryKey::from_hex(""), None);
        assert_eq!(PrimaryKey::from_hex("xyz"), None);
        assert_eq!(PrimaryKey::from_hex("+1"), None);
        assert_eq!(PrimaryKey::from_hex(&"f".repeat(33)), None);
    }

    #[test]
    fn content_key_is_deterministic() {
        let a = ContentKey::of("Donald E. Knuth");
        let b = ContentKey::of("Donald E. Knuth");
        let c = ContentKey::of("Donald E. Knuth ");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn allocator_counts_from_zero() {
        let mut alloc = KeyAllocator::new();
        let keys: Vec<u128> = (0..4).map(|_| alloc.next_key().get()).collect();
        assert_eq!(keys, vec![0, 1, 2, 3]);
        assert_eq!(alloc.issued(), 4);

        let mut resumed = KeyAllocator::starting_from(10);
        assert_eq!(resumed.next_key(), PrimaryKey::new(10));
    }
}
