//! Price resolution and order totals.
//!
//! Everything here is pure: the same inputs always give the same result and
//! nothing is logged or recorded.

use crate::types::{DiscountPercentage, Event, Money, Quantity, Tier};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while pricing an order
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PricingError {
    /// Member tier chosen without verified membership
    #[error("You need to verify your IEEE membership to purchase IEEE member tickets")]
    InvalidTierSelection,

    /// Event prices violate the pricing invariants
    #[error("Invalid event price: {reason}")]
    InvalidEventPrice {
        /// What was wrong
        reason: String,
    },
}

/// Selects the per-ticket price for a tier
///
/// The member tier falls back to the regular price when the event has no
/// member price.
///
/// # Errors
///
/// Returns [`PricingError::InvalidTierSelection`] if `tier` is
/// [`Tier::Member`] and membership is not verified.
pub fn resolve_unit_price(
    event: &Event,
    tier: Tier,
    membership_verified: bool,
) -> Result<Money, PricingError> {
    match tier {
        Tier::Regular => Ok(event.regular_price()),
        Tier::Member if membership_verified => {
            Ok(event.member_price().unwrap_or(event.regular_price()))
        },
        Tier::Member => Err(PricingError::InvalidTierSelection),
    }
}

/// Total for `quantity` tickets at `unit_price`, less an optional discount
///
/// The discount applies once to the pre-discount subtotal.
#[must_use]
pub fn compute_total(
    unit_price: Money,
    quantity: Quantity,
    discount: Option<DiscountPercentage>,
) -> Money {
    price_breakdown(unit_price, quantity, discount).total
}

/// Every figure an order summary shows
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    /// Price of one ticket
    pub unit_price: Money,
    /// Number of tickets
    pub quantity: Quantity,
    /// `unit_price × quantity`
    pub subtotal: Money,
    /// Applied discount, if any
    pub discount: Option<DiscountPercentage>,
    /// Amount taken off the subtotal
    pub discount_amount: Money,
    /// Amount to pay
    pub total: Money,
}

/// Computes subtotal, discount amount and total together
#[must_use]
pub fn price_breakdown(
    unit_price: Money,
    quantity: Quantity,
    discount: Option<DiscountPercentage>,
) -> PriceBreakdown {
    let subtotal = unit_price.times(quantity);
    let discount_amount = discount.map_or(Money::ZERO, |pct| subtotal.percent(pct));

    PriceBreakdown {
        unit_price,
        quantity,
        subtotal,
        discount,
        discount_amount,
        total: subtotal - discount_amount,
    }
}
