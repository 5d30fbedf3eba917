//! Top-level error type for checkout setup and binaries.

use crate::config::ConfigError;
use crate::coupon::CouponRejection;
use crate::gateway::GatewayError;
use crate::pricing::PricingError;
use crate::session::SessionError;
use checkout_runtime::StoreError;
use thiserror::Error;

/// Any error the checkout can surface
#[derive(Error, Debug)]
pub enum CheckoutError {
    /// Pricing invariant violated
    #[error(transparent)]
    Pricing(#[from] PricingError),

    /// Coupon refused
    #[error("Coupon rejected: {0}")]
    Coupon(#[from] CouponRejection),

    /// Backend call failed
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Session could not be persisted
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Store runtime failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No stored session and no credentials to sign in with
    #[error("Sign-in required: no stored session and no credentials")]
    SignInRequired,
}

impl CheckoutError {
    /// Whether retrying the failed operation may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Gateway(error) => error.is_retryable(),
            Self::Store(StoreError::Timeout) => true,
            _ => false,
        }
    }
}
