//! Internal helpers
pub(crate) mod hashing;
