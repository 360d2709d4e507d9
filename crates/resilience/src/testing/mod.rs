//! Testing utilities
//!
//! - [`init_test_tracing`]: install a fmt subscriber once per test binary
//! - [`CallCounter`]: shared invocation counter for wrapped operations
//!
//! ## Usage
//!
//! ```rust
//! use walletscope_resilience::testing::{init_test_tracing, CallCounter};
//!
//! init_test_tracing();
//! let calls = CallCounter::new();
//! let op = {
//!     let calls = calls.clone();
//!     move || calls.increment()
//! };
//! assert_eq!(op(), 1);
//! assert_eq!(calls.count(), 1);
//! ```

// Test helpers are self-explanatory
#![allow(clippy::missing_panics_doc)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once};

use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Install a test-friendly tracing subscriber
///
/// Honours `RUST_LOG`, defaulting to `walletscope_resilience=debug`. Safe to
/// call from every test.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("walletscope_resilience=debug"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}

/// Counts invocations across clones
#[derive(Debug, Clone, Default)]
pub struct CallCounter {
    count: Arc<AtomicU32>,
}

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a call, returning its 1-based sequence number
    pub fn increment(&self) -> u32 {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
    }
}
