//! Prefix-interned key index for pattern lookups.
//!
//! Cache keys for an upstream API are highly repetitive
//! (`property:123:hostnames`, `property:124:hostnames`, ...). The index splits
//! each key into a shared prefix and a per-key suffix, interning the prefix so
//! every key with the same lead shares one allocation.
//!
//! ## Architecture
//!
//! ```text
//!   prefixes: FxHashMap<Arc<str>, FxHashSet<Box<str>>>
//!
//!   "user:"    ──► { "alice:prefs", "bob:prefs", "carol:prefs" }
//!   "zone/ex"  ──► { "ample.com", "ample.net" }
//!   "tenant-"  ──► { "42" }
//!
//!   key = prefix + suffix   (exactly one decomposition per key)
//! ```
//!
//! ## Split Heuristic
//!
//! Best-effort compression, not correctness-critical:
//!
//! 1. scan backward from the midpoint for `:` `/` `_` `-`; split after it
//! 2. else split at the nearest digit/non-digit boundary before the midpoint
//! 3. else split at the midpoint
//!
//! ## Pattern Lookup
//!
//! Glob patterns (`*` any run, `?` one char) compile to an anchored regex.
//! The literal lead of the pattern prunes whole prefixes before any suffix is
//! tested:
//!
//! ```text
//!   pattern "user:a*"  lead "user:a"
//!     prefix "user:"   → lead starts with prefix      → test suffixes
//!     prefix "zone/ex" → neither is a prefix of other → skipped
//! ```
//!
//! ## Example Usage
//!
//! ```
//! use cacheshield::ds::KeyIndex;
//!
//! let mut index = KeyIndex::new();
//! index.add("user:alice:prefs");
//! index.add("user:bob:prefs");
//! index.add("zone:example.com");
//!
//! let mut users = index.get_by_pattern("user:*").unwrap();
//! users.sort();
//! assert_eq!(users, vec!["user:alice:prefs", "user:bob:prefs"]);
//!
//! assert!(index.delete("zone:example.com"));
//! assert!(!index.has("zone:example.com"));
//! assert_eq!(index.stats().total_keys, 2);
//! ```

use std::sync::Arc;

use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{CacheError, Result};

const SEPARATORS: [char; 4] = [':', '/', '_', '-'];

/// Set of keys stored as interned prefix plus suffix.
#[derive(Debug, Default)]
pub struct KeyIndex {
    prefixes: FxHashMap<Arc<str>, FxHashSet<Box<str>>>,
    len: usize,
}

/// Space accounting for a [`KeyIndex`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyIndexStats {
    pub total_keys: usize,
    pub unique_prefixes: usize,
    /// Bytes saved versus storing every key in full.
    pub estimated_bytes_saved: usize,
    /// Stored bytes divided by naive bytes (1.0 when empty).
    pub compression_ratio: f64,
}

/// Splits `key` into `(prefix, suffix)` using the separator, digit-boundary,
/// midpoint heuristic.
pub fn split_key(key: &str) -> (&str, &str) {
    let bounds: Vec<(usize, char)> = key.char_indices().collect();
    if bounds.len() < 2 {
        return ("", key);
    }
    let mid = bounds.len() / 2;

    for i in (0..mid).rev() {
        let (byte, ch) = bounds[i];
        if SEPARATORS.contains(&ch) {
            return key.split_at(byte + ch.len_utf8());
        }
    }

    for i in (1..=mid).rev() {
        if bounds[i - 1].1.is_ascii_digit() != bounds[i].1.is_ascii_digit() {
            return key.split_at(bounds[i].0);
        }
    }

    key.split_at(bounds[mid].0)
}

/// Compiles a glob into an anchored regex and returns it with the pattern's
/// literal lead.
fn compile_glob(pattern: &str) -> Result<(Regex, String)> {
    let mut source = String::with_capacity(pattern.len() + 8);
    let mut lead = String::new();
    let mut in_lead = true;
    source.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => {
                in_lead = false;
                source.push_str(".*");
            },
            '?' => {
                in_lead = false;
                source.push('.');
            },
            other => {
                if in_lead {
                    lead.push(other);
                }
                let mut buf = [0u8; 4];
                source.push_str(&regex::escape(other.encode_utf8(&mut buf)));
            },
        }
    }
    source.push('$');
    let regex = Regex::new(&source).map_err(|e| CacheError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;
    Ok((regex, lead))
}

impl KeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the canonical instance of `prefix`, interning it if missing.
    fn intern_prefix(&mut self, prefix: &str) -> Arc<str> {
        if let Some((canonical, _)) = self.prefixes.get_key_value(prefix) {
            return Arc::clone(canonical);
        }
        let canonical: Arc<str> = Arc::from(prefix);
        self.prefixes
            .insert(Arc::clone(&canonical), FxHashSet::default());
        canonical
    }

    /// Adds `key`. Re-adding an existing key is a no-op.
    pub fn add(&mut self, key: &str) {
        let (prefix, suffix) = split_key(key);
        let canonical = self.intern_prefix(prefix);
        let inserted = self
            .prefixes
            .get_mut(&canonical)
            .map(|suffixes| suffixes.insert(Box::from(suffix)))
            .unwrap_or(false);
        if inserted {
            self.len += 1;
        }
    }

    /// Removes `key`, returning whether it was present.
    pub fn delete(&mut self, key: &str) -> bool {
        let (prefix, suffix) = split_key(key);
        let Some(suffixes) = self.prefixes.get_mut(prefix) else {
            return false;
        };
        if !suffixes.remove(suffix) {
            return false;
        }
        if suffixes.is_empty() {
            self.prefixes.remove(prefix);
        }
        self.len -= 1;
        true
    }

    pub fn has(&self, key: &str) -> bool {
        let (prefix, suffix) = split_key(key);
        self.prefixes
            .get(prefix)
            .is_some_and(|suffixes| suffixes.contains(suffix))
    }

    /// All keys, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.len);
        for (prefix, suffixes) in &self.prefixes {
            for suffix in suffixes {
                out.push(format!("{prefix}{suffix}"));
            }
        }
        out
    }

    /// Keys matching a glob pattern, in no particular order.
    pub fn get_by_pattern(&self, pattern: &str) -> Result<Vec<String>> {
        let (regex, lead) = compile_glob(pattern)?;
        let mut out = Vec::new();
        for (prefix, suffixes) in &self.prefixes {
            let prefix: &str = prefix;
            if !(prefix.starts_with(lead.as_str()) || lead.starts_with(prefix)) {
                continue;
            }
            let mut key = String::with_capacity(prefix.len() + 16);
            for suffix in suffixes {
                key.clear();
                key.push_str(prefix);
                key.push_str(suffix);
                if regex.is_match(&key) {
                    out.push(key.clone());
                }
            }
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.prefixes.clear();
        self.len = 0;
    }

    pub fn stats(&self) -> KeyIndexStats {
        let mut naive = 0usize;
        let mut stored = 0usize;
        for (prefix, suffixes) in &self.prefixes {
            stored += prefix.len();
            for suffix in suffixes {
                stored += suffix.len();
                naive += prefix.len() + suffix.len();
            }
        }
        KeyIndexStats {
            total_keys: self.len,
            unique_prefixes: self.prefixes.len(),
            estimated_bytes_saved: naive.saturating_sub(stored),
            compression_ratio: if naive == 0 {
                1.0
            } else {
                stored as f64 / naive as f64
            },
        }
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        let counted: usize = self.prefixes.values().map(|s| s.len()).sum();
        assert_eq!(counted, self.len);
        assert!(self.prefixes.values().all(|s| !s.is_empty()));
        for (prefix, suffixes) in &self.prefixes {
            for suffix in suffixes {
                let key = format!("{prefix}{suffix}");
                assert_eq!(split_key(&key), (&**prefix, &**suffix));
            }
        }
    }
}
