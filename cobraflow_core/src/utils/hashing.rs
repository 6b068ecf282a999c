//! Utility functions for getting hashes
use std::hash::{DefaultHasher, Hash, Hasher};

pub(crate) fn calculate_hash<T: Hash + ?Sized>(t: &T) -> u64 {
    let mut s = DefaultHasher::new();
    t.hash(&mut s);
    s.finish()
}

/// Fixed width hexadecimal hash, only comparable within one build of the crate
pub(crate) fn hash_as_hex_string<T: Hash + ?Sized>(t: &T) -> String {
    format!("{:016x}", calculate_hash(t))
}
