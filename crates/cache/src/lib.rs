#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `cache` is the content-addressed digest cache used by the hashing
//! daemon. Digests are keyed by `(pathname, mtime)`: a cache hit means "this
//! exact pathname was hashed the last time it had this exact modification
//! time", so a later write that bumps `mtime` is a guaranteed miss.
//!
//! # Design
//!
//! The table is a fixed array of `bucket_count` chains, indexed by a djb2
//! hash of the pathname continued over the mtime. Entries are inserted at
//! the head of their chain; there is no eviction and no entry is ever
//! removed, so the cache grows for the lifetime of the process. A single
//! [`std::sync::Mutex`] guards every bucket; lookups and inserts are
//! O(chain length), which stays short because real-world pathname sets
//! rarely collide past a handful of entries per bucket at the default
//! table size.
//!
//! # Invariants
//!
//! - `bucket_count` must be a power of two so the hash can be masked instead
//!   of reduced with a division on the hot path.
//! - The cache mutex is never held across file I/O: callers compute a
//!   digest first and call [`DigestCache::insert`] afterward.

use std::sync::Mutex;

use thiserror::Error;

/// Default number of buckets in a new [`DigestCache`].
pub const DEFAULT_BUCKET_COUNT: usize = 1024;

/// Minimum bucket count accepted by [`DigestCache::with_bucket_count`].
pub const MIN_BUCKET_COUNT: usize = 256;

/// Errors constructing a [`DigestCache`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    /// The requested bucket count was below [`MIN_BUCKET_COUNT`] or not a
    /// power of two.
    #[error("bucket count {0} must be a power of two no smaller than {MIN_BUCKET_COUNT}")]
    InvalidBucketCount(usize),
}

#[derive(Clone)]
struct Entry {
    pathname: String,
    mtime: i64,
    digest: [u8; 32],
}

/// A content-addressed cache of file digests keyed by pathname and mtime.
pub struct DigestCache {
    buckets: Mutex<Vec<Vec<Entry>>>,
    mask: u64,
}

impl DigestCache {
    /// Builds a cache with [`DEFAULT_BUCKET_COUNT`] buckets.
    #[must_use]
    pub fn new() -> Self {
        Self::with_bucket_count(DEFAULT_BUCKET_COUNT)
            .expect("DEFAULT_BUCKET_COUNT is a power of two")
    }

    /// Builds a cache with a caller-chosen bucket count.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidBucketCount`] if `bucket_count` is
    /// smaller than [`MIN_BUCKET_COUNT`] or not a power of two.
    pub fn with_bucket_count(bucket_count: usize) -> Result<Self, CacheError> {
        if bucket_count < MIN_BUCKET_COUNT || !bucket_count.is_power_of_two() {
            return Err(CacheError::InvalidBucketCount(bucket_count));
        }
        Ok(Self {
            buckets: Mutex::new(vec![Vec::new(); bucket_count]),
            mask: (bucket_count - 1) as u64,
        })
    }

    fn bucket_index(&self, pathname: &str, mtime: i64) -> usize {
        let mut hash: u64 = 5381;
        for byte in pathname.bytes() {
            hash = hash.wrapping_shl(5).wrapping_add(hash).wrapping_add(u64::from(byte));
        }
        hash = hash.wrapping_shl(5).wrapping_add(hash).wrapping_add(mtime as u64);
        (hash & self.mask) as usize
    }

    /// Looks up a previously computed digest for `(pathname, mtime)`.
    ///
    /// Returns `None` on a miss, including when the file was hashed before
    /// but under a different `mtime`.
    #[must_use]
    pub fn lookup(&self, pathname: &str, mtime: i64) -> Option<[u8; 32]> {
        let idx = self.bucket_index(pathname, mtime);
        let buckets = self.buckets.lock().expect("cache mutex poisoned");
        buckets[idx]
            .iter()
            .find(|entry| entry.mtime == mtime && entry.pathname == pathname)
            .map(|entry| entry.digest)
    }

    /// Inserts a digest for `(pathname, mtime)` at the head of its bucket.
    ///
    /// Duplicate inserts (two workers racing on the same coalesced request)
    /// are tolerated: both entries are kept and the most recent insert wins
    /// future lookups, by virtue of being inserted at the head of the chain.
    pub fn insert(&self, pathname: &str, mtime: i64, digest: [u8; 32]) {
        let idx = self.bucket_index(pathname, mtime);
        let mut buckets = self.buckets.lock().expect("cache mutex poisoned");
        buckets[idx].insert(
            0,
            Entry {
                pathname: pathname.to_owned(),
                mtime,
                digest,
            },
        );
    }
}

impl Default for DigestCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_on_empty_cache() {
        let cache = DigestCache::new();
        assert_eq!(cache.lookup("/tmp/a", 100), None);
    }

    #[test]
    fn hit_after_insert() {
        let cache = DigestCache::new();
        let digest = [7u8; 32];
        cache.insert("/tmp/a", 100, digest);
        assert_eq!(cache.lookup("/tmp/a", 100), Some(digest));
    }

    #[test]
    fn mtime_change_is_a_miss() {
        let cache = DigestCache::new();
        cache.insert("/tmp/a", 100, [1u8; 32]);
        assert_eq!(cache.lookup("/tmp/a", 200), None);
    }

    #[test]
    fn distinct_pathnames_do_not_collide_in_value() {
        let cache = DigestCache::new();
        cache.insert("/tmp/a", 1, [1u8; 32]);
        cache.insert("/tmp/b", 1, [2u8; 32]);
        assert_eq!(cache.lookup("/tmp/a", 1), Some([1u8; 32]));
        assert_eq!(cache.lookup("/tmp/b", 1), Some([2u8; 32]));
    }

    #[test]
    fn duplicate_insert_keeps_most_recent_first() {
        let cache = DigestCache::new();
        cache.insert("/tmp/a", 1, [1u8; 32]);
        cache.insert("/tmp/a", 1, [2u8; 32]);
        assert_eq!(cache.lookup("/tmp/a", 1), Some([2u8; 32]));
    }

    #[test]
    fn rejects_non_power_of_two_bucket_count() {
        match DigestCache::with_bucket_count(1000) {
            Err(err) => assert_eq!(err, CacheError::InvalidBucketCount(1000)),
            Ok(_) => panic!("expected InvalidBucketCount"),
        }
        match DigestCache::with_bucket_count(0) {
            Err(err) => assert_eq!(err, CacheError::InvalidBucketCount(0)),
            Ok(_) => panic!("expected InvalidBucketCount"),
        }
    }

    #[test]
    fn rejects_bucket_count_below_minimum() {
        match DigestCache::with_bucket_count(64) {
            Err(err) => assert_eq!(err, CacheError::InvalidBucketCount(64)),
            Ok(_) => panic!("expected InvalidBucketCount"),
        }
    }

    #[test]
    fn accepts_custom_power_of_two_bucket_count() {
        assert!(DigestCache::with_bucket_count(512).is_ok());
    }

    #[test]
    fn hash_matches_reference_djb2_continuation() {
        let cache = DigestCache::with_bucket_count(1024).unwrap();
        let mut hash: u64 = 5381;
        for byte in b"/tmp/a" {
            hash = hash.wrapping_shl(5).wrapping_add(hash).wrapping_add(u64::from(*byte));
        }
        hash = hash.wrapping_shl(5).wrapping_add(hash).wrapping_add(42u64);
        let expected = (hash & 1023) as usize;
        assert_eq!(cache.bucket_index("/tmp/a", 42), expected);
    }
}
