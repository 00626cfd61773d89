//! Bloom filter for negative-cache fast rejects.
//!
//! A fixed-size bit array answering "definitely absent" or "possibly
//! present". The cache consults it before the authoritative negative-cache
//! map so that the common case (key never failed upstream) costs two hashes
//! and `k` bit probes.
//!
//! ## Sizing
//!
//! ```text
//!   n = expected elements, p = target false-positive rate
//!
//!   m = ceil(-n · ln(p) / (ln 2)²)        bits
//!   k = max(1, round((m / n) · ln 2))     hash functions
//!
//!   n = 10_000, p = 0.01  →  m = 95_851 bits (~11.7 KiB), k = 7
//! ```
//!
//! ## Hashing
//!
//! Two independent digests are combined by double hashing, so only two hash
//! computations are needed regardless of `k`:
//!
//! ```text
//!   h1 = SHA-256(key)[0..8]   (big-endian u64)
//!   h2 = XXH3-128(key) low 64 bits
//!   position_i = (h1 + i · h2) mod m     for i in [0, k)
//! ```
//!
//! ## Binary Layout
//!
//! ```text
//!   ┌──────────┬────────────────┬───────────────┬──────────────────┬──────────────┐
//!   │ size u32 │ hash_funcs u32 │ elements u32  │ bit_array_len u32│ bit array …  │
//!   └──────────┴────────────────┴───────────────┴──────────────────┴──────────────┘
//!     all header fields big-endian, 16 bytes total
//! ```
//!
//! ## Example Usage
//!
//! ```
//! use cacheshield::ds::BloomFilter;
//!
//! let mut filter = BloomFilter::new(1_000, 0.01);
//! filter.add("property:404");
//! assert!(filter.has("property:404"));
//!
//! let restored = BloomFilter::from_bytes(&filter.to_bytes()).unwrap();
//! assert!(restored.has("property:404"));
//! assert_eq!(restored.stats().hash_functions, filter.stats().hash_functions);
//! ```

use sha2::{Digest, Sha256};
use xxhash_rust::xxh3::xxh3_128;

use crate::error::{CacheError, Result};

const HEADER_LEN: usize = 16;

/// Upper bound on `k` accepted by [`BloomFilter::from_bytes`]; sizing never
/// produces more than ~30.
const MAX_HASH_FUNCTIONS: u32 = 64;

/// Fixed-size Bloom filter over string keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<u8>,
    size: u32,
    hash_functions: u32,
    element_count: u32,
}

/// Point-in-time filter statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BloomStats {
    /// Bit array size in bits (`m`).
    pub size: u32,
    /// Number of hash functions (`k`).
    pub hash_functions: u32,
    /// Number of `add` calls (`n`).
    pub element_count: u32,
    /// `(1 - e^(-k·n/m))^k`
    pub estimated_false_positive_rate: f64,
    /// Fraction of bits set.
    pub fill_ratio: f64,
    /// Bytes used by the bit array.
    pub bytes: usize,
}

impl BloomFilter {
    /// Creates a filter sized for `expected_elements` at `false_positive_rate`.
    ///
    /// `expected_elements` is clamped to at least 1 and the rate into
    /// `[1e-9, 0.5]`.
    pub fn new(expected_elements: usize, false_positive_rate: f64) -> Self {
        let n = expected_elements.max(1) as f64;
        let p = if false_positive_rate.is_finite() {
            false_positive_rate.clamp(1e-9, 0.5)
        } else {
            0.01
        };
        let ln2 = std::f64::consts::LN_2;
        let m = (-n * p.ln() / (ln2 * ln2)).ceil();
        let m = m.clamp(8.0, u32::MAX as f64) as u32;
        let k = ((m as f64 / n) * ln2).round().max(1.0) as u32;
        Self::with_parameters(m, k)
    }

    fn with_parameters(size: u32, hash_functions: u32) -> Self {
        Self {
            bits: vec![0; Self::byte_len(size)],
            size,
            hash_functions,
            element_count: 0,
        }
    }

    fn byte_len(size: u32) -> usize {
        (size as usize).div_ceil(8)
    }

    fn positions(&self, key: &str) -> impl Iterator<Item = usize> {
        let digest = Sha256::digest(key.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let h1 = u64::from_be_bytes(head);
        let h2 = xxh3_128(key.as_bytes()) as u64;
        let m = u64::from(self.size);
        (0..u64::from(self.hash_functions))
            .map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) % m) as usize)
    }

    /// Adds `key`. Bits only ever turn on.
    pub fn add(&mut self, key: &str) {
        for pos in self.positions(key) {
            self.bits[pos / 8] |= 1 << (pos % 8);
        }
        self.element_count = self.element_count.saturating_add(1);
    }

    /// `false` means `key` was definitely never added.
    pub fn has(&self, key: &str) -> bool {
        self.positions(key)
            .all(|pos| self.bits[pos / 8] & (1 << (pos % 8)) != 0)
    }

    /// Unions `other` into `self`.
    ///
    /// Fails with [`CacheError::InvalidConfiguration`] unless both filters
    /// share size and hash-function count.
    pub fn merge(&mut self, other: &BloomFilter) -> Result<()> {
        if self.size != other.size || self.hash_functions != other.hash_functions {
            return Err(CacheError::InvalidConfiguration(format!(
                "cannot merge bloom filters with different parameters: \
                 size {} vs {}, hash functions {} vs {}",
                self.size, other.size, self.hash_functions, other.hash_functions
            )));
        }
        for (dst, src) in self.bits.iter_mut().zip(&other.bits) {
            *dst |= *src;
        }
        self.element_count = self.element_count.saturating_add(other.element_count);
        Ok(())
    }

    /// Resets every bit. Size and hash count are unchanged.
    pub fn clear(&mut self) {
        self.bits.iter_mut().for_each(|b| *b = 0);
        self.element_count = 0;
    }

    pub fn stats(&self) -> BloomStats {
        let m = f64::from(self.size);
        let k = f64::from(self.hash_functions);
        let n = f64::from(self.element_count);
        let estimated_false_positive_rate = (1.0 - (-k * n / m).exp()).powf(k);
        let set_bits: u32 = self.bits.iter().map(|b| b.count_ones()).sum();
        BloomStats {
            size: self.size,
            hash_functions: self.hash_functions,
            element_count: self.element_count,
            estimated_false_positive_rate,
            fill_ratio: f64::from(set_bits) / m,
            bytes: self.bits.len(),
        }
    }

    /// Encodes the filter as a 16-byte big-endian header plus the bit array.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.bits.len());
        out.extend_from_slice(&self.size.to_be_bytes());
        out.extend_from_slice(&self.hash_functions.to_be_bytes());
        out.extend_from_slice(&self.element_count.to_be_bytes());
        out.extend_from_slice(&(self.bits.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.bits);
        out
    }

    /// Decodes a filter written by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(CacheError::Serialization(format!(
                "bloom filter header needs {HEADER_LEN} bytes, got {}",
                data.len()
            )));
        }
        let field = |idx: usize| {
            let mut word = [0u8; 4];
            word.copy_from_slice(&data[idx * 4..idx * 4 + 4]);
            u32::from_be_bytes(word)
        };
        let size = field(0);
        let hash_functions = field(1);
        let element_count = field(2);
        let bit_array_length = field(3) as usize;

        if size == 0 || hash_functions == 0 {
            return Err(CacheError::Serialization(
                "bloom filter size and hash function count must be non-zero".into(),
            ));
        }
        if hash_functions > MAX_HASH_FUNCTIONS {
            return Err(CacheError::Serialization(format!(
                "bloom filter hash function count {hash_functions} exceeds {MAX_HASH_FUNCTIONS}"
            )));
        }
        if bit_array_length != Self::byte_len(size) {
            return Err(CacheError::Serialization(format!(
                "bloom filter bit array length {bit_array_length} does not match size {size}"
            )));
        }
        let body = &data[HEADER_LEN..];
        if body.len() != bit_array_length {
            return Err(CacheError::Serialization(format!(
                "bloom filter body is {} bytes, header says {bit_array_length}",
                body.len()
            )));
        }
        Ok(Self {
            bits: body.to_vec(),
            size,
            hash_functions,
            element_count,
        })
    }
}
