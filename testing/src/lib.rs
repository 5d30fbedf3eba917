//! # Checkout Testing
//!
//! Testing utilities for the checkout reducer architecture.
//!
//! This crate provides:
//! - Deterministic [`Clock`] implementations
//! - [`ReducerTest`], a Given-When-Then harness for reducers
//! - Effect assertion helpers
//!
//! ## Example
//!
//! ```ignore
//! use checkout_testing::{ReducerTest, test_clock};
//!
//! ReducerTest::new(CheckoutReducer::new())
//!     .with_env(test_environment(test_clock()))
//!     .given_state(CheckoutState::new(event, Some(profile)))
//!     .when_action(CheckoutAction::ApplyCoupon)
//!     .then_state(|s| assert!(s.coupon.is_validating()))
//!     .run();
//! ```

use checkout_core::environment::Clock;
use chrono::{DateTime, Utc};


pub use reducer_test::{ReducerTest, assertions};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use checkout_testing::mocks::FixedClock;
    /// use checkout_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// A clock tests can move forward
    ///
    /// Clones share the same instant, so a test can keep one handle and give
    /// another to the environment under test.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock starting at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Move the clock to `time`
        pub fn set(&self, time: DateTime<Utc>) {
            if let Ok(mut current) = self.time.write() {
                *current = time;
            }
        }

        /// Move the clock forward by `delta`
        pub fn advance(&self, delta: chrono::Duration) {
            if let Ok(mut current) = self.time.write() {
                *current += delta;
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
                .read()
                .map_or_else(|poisoned| *poisoned.into_inner(), |t| *t)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::days(20_089))
    }
}

pub use mocks::{FixedClock, ManualClock, test_clock};
