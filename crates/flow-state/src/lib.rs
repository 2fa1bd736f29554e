//! Application state: the working set, the current view, and the focus timer.

pub mod clock;
pub mod error;
pub mod focus;
pub mod store;

pub use clock::{Clock, SystemClock};
pub use error::StateError;
pub use focus::{FocusError, FocusTimer};
pub use store::TaskStore;
