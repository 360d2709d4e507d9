//! Time sources used by the toolkit.

pub mod clock;

pub use clock::{Clock, MockClock, SystemClock};
