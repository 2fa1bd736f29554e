//! Task Query Engine: pure, synchronous views over a snapshot of the
//! working set. Nothing here performs I/O or reads the clock; callers pass
//! the reference instant in.

pub mod select;
pub mod stats;

pub use select::filter_and_sort;
pub use stats::{derive_dashboard, derive_stats, Dashboard, Stats};
