//! Remote collaborators of the checkout.
//!
//! The checkout talks to the ticketing backend through two traits:
//! [`CouponValidator`] and [`PurchaseGateway`]. [`BackendClient`] implements
//! both over HTTP; [`MockPurchaseGateway`] and
//! [`InMemoryCouponBook`](crate::coupon::InMemoryCouponBook) stand in for the
//! backend in tests and the demo binary.
//!
//! Every call takes the caller's [`Session`] explicitly. Nothing here keeps
//! authentication state between calls.

use crate::coupon::CouponVerdict;
use crate::session::Session;
use crate::types::{EventId, Money, PaymentMethod, Quantity, TicketId, Tier};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

mod http;
mod mock;

pub use http::BackendClient;
pub use mock::MockPurchaseGateway;

/// Gateway result
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors talking to the backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The request never got a response
    #[error("Network error: {0}")]
    Network(String),

    /// The backend did not answer in time
    #[error("Request timed out")]
    Timeout,

    /// The session token was missing, expired or rejected
    #[error("Unauthorized")]
    Unauthorized,

    /// The backend answered with an error status
    #[error("Backend error (status {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error detail from the backend
        message: String,
    },

    /// The response body did not have the expected shape
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Whether retrying the same request may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::Unauthorized | Self::Decode(_) => false,
        }
    }
}

/// Body of `POST /purchase-tickets`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    /// Event to buy tickets for
    pub event_id: EventId,
    /// Number of tickets
    pub quantity: Quantity,
    /// Tier, sent as `regular` or `ieee`
    pub ticket_type: Tier,
    /// How the purchaser pays
    pub payment_method: PaymentMethod,
    /// Computed total, after discount
    pub total_amount: Money,
    /// Coupon code, only when a coupon was applied
    pub coupon_code: Option<String>,
}

/// Confirmation of a purchase
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    /// Id of the issued ticket
    pub ticket_id: TicketId,
    /// Confirmation message
    #[serde(default)]
    pub message: Option<String>,
}

/// Validates coupon codes
///
/// Implementations must not change a coupon while validating it.
pub trait CouponValidator: Send + Sync {
    /// Checks whether `coupon_code` may be applied to `event_id`
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] if the validator could not be reached. A
    /// refused coupon is a successful call returning
    /// [`CouponVerdict::Rejected`].
    fn validate(
        &self,
        session: &Session,
        coupon_code: &str,
        event_id: &EventId,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<CouponVerdict>> + Send>>;
}

/// Places ticket orders
pub trait PurchaseGateway: Send + Sync {
    /// Buys tickets
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] if the purchase was not confirmed.
    fn purchase(
        &self,
        session: &Session,
        request: PurchaseRequest,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<PurchaseReceipt>> + Send>>;
}
