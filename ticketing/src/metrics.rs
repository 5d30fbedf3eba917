//! Business metrics for the checkout.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `checkout_coupon_validations_total{outcome}` - Validations by outcome (valid, rejected, error)
//! - `checkout_purchases_total{status}` - Purchases by status (succeeded, failed)
//! - `checkout_revenue_cents_total` - Revenue from confirmed purchases in cents
//! - `checkout_tickets_sold_total` - Tickets in confirmed purchases
//! - `checkout_cancelled_total` - Checkouts cancelled by the purchaser
//! - `checkout_stale_responses_total{kind}` - Responses dropped because a newer request superseded them

use crate::types::{Money, Quantity};
use metrics::describe_counter;

/// Initialize and register all business metrics descriptions.
///
/// This should be called once at application startup, before any metrics are recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "checkout_coupon_validations_total",
        "Coupon validations by outcome (valid, rejected, error)"
    );
    describe_counter!(
        "checkout_purchases_total",
        "Ticket purchases by status (succeeded, failed)"
    );
    describe_counter!(
        "checkout_revenue_cents_total",
        "Revenue from confirmed purchases in cents"
    );
    describe_counter!(
        "checkout_tickets_sold_total",
        "Tickets in confirmed purchases"
    );
    describe_counter!(
        "checkout_cancelled_total",
        "Checkouts cancelled by the purchaser"
    );
    describe_counter!(
        "checkout_stale_responses_total",
        "Responses dropped because a newer request superseded them"
    );

    checkout_runtime::metrics::register_metrics();
    tracing::info!("Business metrics registered");
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Outcome of a coupon validation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// Coupon accepted
    Valid,
    /// Coupon refused
    Rejected,
    /// Validator unreachable
    Error,
}

impl ValidationOutcome {
    const fn label(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Rejected => "rejected",
            Self::Error => "error",
        }
    }
}

/// Record a finished coupon validation.
pub fn record_coupon_validation(outcome: ValidationOutcome) {
    metrics::counter!("checkout_coupon_validations_total", "outcome" => outcome.label())
        .increment(1);
}

/// Record a confirmed purchase.
///
/// # Arguments
///
/// * `total` - Amount charged
/// * `quantity` - Number of tickets
pub fn record_purchase_succeeded(total: Money, quantity: Quantity) {
    metrics::counter!("checkout_purchases_total", "status" => "succeeded").increment(1);
    metrics::counter!("checkout_revenue_cents_total")
        .increment(u64::try_from(total.cents()).unwrap_or(0));
    metrics::counter!("checkout_tickets_sold_total").increment(u64::from(quantity.get()));
    tracing::debug!(total = %total, quantity = quantity.get(), "Recorded purchase_succeeded metric");
}

/// Record a failed purchase.
pub fn record_purchase_failed() {
    metrics::counter!("checkout_purchases_total", "status" => "failed").increment(1);
}

/// Record a cancelled checkout.
pub fn record_checkout_cancelled() {
    metrics::counter!("checkout_cancelled_total").increment(1);
}

/// Record a response dropped for a superseded request.
///
/// # Arguments
///
/// * `kind` - Which request the response belonged to (`coupon` or `purchase`)
pub fn record_stale_response(kind: &'static str) {
    metrics::counter!("checkout_stale_responses_total", "kind" => kind).increment(1);
}
