//! Actions for the checkout flow.

use crate::coupon::CouponVerdict;
use crate::gateway::GatewayError;
use crate::session::Session;
use crate::types::{PaymentMethod, TicketId, Tier};

/// Everything a checkout reacts to
///
/// Purchaser inputs come first; the variants carrying a `generation` are fed
/// back by effects and are dropped when a newer request superseded them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckoutAction {
    /// Pick a ticket tier
    SelectTier(Tier),

    /// Quantity field edited; the text is coerced to a valid quantity
    QuantityInput(String),

    /// Quantity stepper `+`
    IncrementQuantity,

    /// Quantity stepper `-`, never below one
    DecrementQuantity,

    /// Coupon field edited
    ///
    /// Any applied or rejected coupon reverts to unvalidated, and an
    /// in-flight validation is abandoned.
    EditCouponCode(String),

    /// Validate the coupon field
    ApplyCoupon,

    /// The validator answered
    CouponValidated {
        /// Tag of the validation this answers
        generation: u64,
        /// The answer
        verdict: CouponVerdict,
    },

    /// The validator could not be reached
    CouponValidationFailed {
        /// Tag of the validation this answers
        generation: u64,
        /// What went wrong
        error: GatewayError,
    },

    /// Open the payment form
    ProceedToCheckout,

    /// Choose how to pay
    SelectPaymentMethod(PaymentMethod),

    /// Place the order
    SubmitPurchase,

    /// The purchase was confirmed
    PurchaseSucceeded {
        /// Tag of the purchase this answers
        generation: u64,
        /// Issued ticket
        ticket_id: TicketId,
    },

    /// The purchase failed
    PurchaseFailed {
        /// Tag of the purchase this answers
        generation: u64,
        /// What went wrong
        error: GatewayError,
    },

    /// The purchaser signed in or out
    SessionChanged(Option<Session>),

    /// Abandon the checkout; ignored while a purchase is processing
    Cancel,

    /// Hide the current notice
    DismissNotice,
}
