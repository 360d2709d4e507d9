//! Call-rate shaping
//!
//! - [`Debounce`]: run once after calls stop arriving (trailing edge)
//! - [`Throttle`]: run at most once per window, dropping the rest (leading edge)

mod debounce;
mod throttle;

pub use self::debounce::{Debounce, DebounceStats};
pub use self::throttle::{Throttle, ThrottleStats};
