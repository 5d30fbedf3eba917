//! Environment dependencies for the checkout reducer.

use crate::gateway::{CouponValidator, PurchaseGateway};
use checkout_core::environment::Clock;
use std::sync::Arc;

/// Collaborators injected into the checkout reducer
///
/// Production wires in [`BackendClient`](crate::gateway::BackendClient) and
/// `SystemClock`; tests use the in-memory collaborators and a fixed clock.
#[derive(Clone)]
pub struct CheckoutEnvironment {
    clock: Arc<dyn Clock>,
    coupons: Arc<dyn CouponValidator>,
    purchases: Arc<dyn PurchaseGateway>,
}

impl CheckoutEnvironment {
    /// Create a new environment
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        coupons: Arc<dyn CouponValidator>,
        purchases: Arc<dyn PurchaseGateway>,
    ) -> Self {
        Self {
            clock,
            coupons,
            purchases,
        }
    }

    /// Clock used to timestamp notices
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Coupon validation gate
    #[must_use]
    pub fn coupons(&self) -> &dyn CouponValidator {
        self.coupons.as_ref()
    }

    /// Purchase endpoint
    #[must_use]
    pub fn purchases(&self) -> &dyn PurchaseGateway {
        self.purchases.as_ref()
    }
}

impl std::fmt::Debug for CheckoutEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutEnvironment").finish_non_exhaustive()
    }
}
