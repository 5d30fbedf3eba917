//! State types for the checkout flow.

use crate::coupon::CouponRejection;
use crate::pricing::{self, PriceBreakdown, PricingError};
use crate::session::Session;
use crate::types::{DiscountPercentage, Event, Money, PaymentMethod, Quantity, TicketId, Tier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Phases
// ============================================================================

/// Where the purchaser is in the purchase flow
///
/// ```text
/// Browsing → TierSelected → Checkout → Processing → Completed
///                                ↑           ↓
///                                └─ Failed ←─┘
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckoutPhase {
    /// Looking at the event
    #[default]
    Browsing,
    /// A tier was picked
    TierSelected,
    /// Payment form shown
    Checkout,
    /// Purchase request in flight
    Processing,
    /// Purchase confirmed
    Completed {
        /// Issued ticket
        ticket_id: TicketId,
    },
    /// Purchase refused or unreachable; may be resubmitted
    Failed {
        /// Why it failed
        reason: String,
    },
}

impl CheckoutPhase {
    /// Whether order inputs may still change
    #[must_use]
    pub const fn accepts_edits(&self) -> bool {
        !matches!(self, Self::Processing | Self::Completed { .. })
    }

    /// Whether a purchase may be submitted from here
    #[must_use]
    pub const fn can_submit(&self) -> bool {
        matches!(self, Self::Checkout | Self::Failed { .. })
    }

    /// Short name for logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Browsing => "browsing",
            Self::TierSelected => "tier_selected",
            Self::Checkout => "checkout",
            Self::Processing => "processing",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

// ============================================================================
// Coupon status
// ============================================================================

/// State of the coupon field
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CouponStatus {
    /// Field empty
    #[default]
    NoCoupon,
    /// Text entered but not validated
    Pending,
    /// Validation in flight
    Validating,
    /// Validated; the discount counts toward the total
    Applied {
        /// Discount granted
        discount: DiscountPercentage,
        /// Validator's confirmation
        message: String,
    },
    /// Validator refused the code
    Rejected(CouponRejection),
}

impl CouponStatus {
    /// Status for freshly edited coupon text
    #[must_use]
    pub fn for_text(text: &str) -> Self {
        if text.trim().is_empty() {
            Self::NoCoupon
        } else {
            Self::Pending
        }
    }

    /// The discount that applies to the total, if any
    #[must_use]
    pub const fn discount(&self) -> Option<DiscountPercentage> {
        match self {
            Self::Applied { discount, .. } => Some(*discount),
            _ => None,
        }
    }

    /// Whether a validation is in flight
    #[must_use]
    pub const fn is_validating(&self) -> bool {
        matches!(self, Self::Validating)
    }

    /// Whether a validated discount applies
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

// ============================================================================
// Notices
// ============================================================================

/// Severity of a notice
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeLevel {
    /// Neutral information
    Info,
    /// Something worked
    Success,
    /// Something failed
    Error,
}

/// A message for the purchaser
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Severity
    pub level: NoticeLevel,
    /// Text to show
    pub message: String,
    /// Whether repeating the action may succeed
    pub retryable: bool,
    /// When the notice was raised
    pub at: DateTime<Utc>,
}

// ============================================================================
// Order intent and checkout state
// ============================================================================

/// What the purchaser intends to buy
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderIntent {
    /// Number of tickets
    pub quantity: Quantity,
    /// Ticket tier
    pub tier: Tier,
    /// Coupon field contents, as typed
    pub coupon_code: String,
    /// Payment method
    pub payment_method: PaymentMethod,
}

impl OrderIntent {
    /// Coupon code with surrounding whitespace removed, if any was typed
    #[must_use]
    pub fn coupon_code(&self) -> Option<&str> {
        Some(self.coupon_code.trim()).filter(|code| !code.is_empty())
    }
}

/// State of one checkout
///
/// Totals are never stored; [`CheckoutState::quote`] derives them from the
/// order intent and coupon status on every call.
#[derive(Clone, Debug)]
pub struct CheckoutState {
    /// Event being purchased
    pub event: Event,
    /// Signed-in purchaser, if any
    pub session: Option<Session>,
    /// Order inputs
    pub order: OrderIntent,
    /// Coupon field state
    pub coupon: CouponStatus,
    /// Purchase flow phase
    pub phase: CheckoutPhase,
    /// Tag of the latest coupon validation; older responses are dropped
    pub coupon_generation: u64,
    /// Tag of the latest purchase request; older responses are dropped
    pub purchase_generation: u64,
    /// Latest message for the purchaser
    pub notice: Option<Notice>,
    /// Last error, for diagnostics
    pub last_error: Option<String>,
}

impl CheckoutState {
    /// Starts a checkout for `event`
    #[must_use]
    pub fn new(event: Event, session: Option<Session>) -> Self {
        Self {
            event,
            session,
            order: OrderIntent::default(),
            coupon: CouponStatus::NoCoupon,
            phase: CheckoutPhase::Browsing,
            coupon_generation: 0,
            purchase_generation: 0,
            notice: None,
            last_error: None,
        }
    }

    /// Whether the purchaser may buy member tickets
    #[must_use]
    pub fn membership_verified(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(Session::membership_verified)
    }

    /// Price of one ticket for the selected tier
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::InvalidTierSelection`] if the member tier is
    /// selected without verified membership.
    pub fn unit_price(&self) -> Result<Money, PricingError> {
        pricing::resolve_unit_price(&self.event, self.order.tier, self.membership_verified())
    }

    /// Current price breakdown
    ///
    /// Only an applied coupon discounts the total.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::InvalidTierSelection`] if the member tier is
    /// selected without verified membership.
    pub fn quote(&self) -> Result<PriceBreakdown, PricingError> {
        Ok(pricing::price_breakdown(
            self.unit_price()?,
            self.order.quantity,
            self.coupon.discount(),
        ))
    }

    /// Whether a remote request is in flight
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.coupon.is_validating() || matches!(self.phase, CheckoutPhase::Processing)
    }
}
