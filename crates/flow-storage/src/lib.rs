//! Concrete storage implementations for the local working set.
//! One file per key, replaced atomically on every write.

pub mod file_store;
