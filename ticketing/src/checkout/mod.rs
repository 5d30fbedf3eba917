//! Checkout for a single event.
//!
//! The purchase flow is a reducer run by a [`Store`](checkout_runtime::Store):
//!
//! ```text
//! purchaser input → CheckoutReducer → state + effects
//!                        ↑                 ↓
//!                        └── response ← coupon validator / purchase gateway
//! ```
//!
//! # Busy guards
//!
//! At most one coupon validation and one purchase request are in flight.
//! Each runs as a cancellable effect and carries a generation number; editing
//! the coupon field, signing out or cancelling bumps the generation, so a
//! response that arrives afterwards is recognised as stale and dropped even
//! if the runtime could not abort it in time.
//!
//! A purchase is not submitted while a coupon answer is pending, and once
//! submitted it cannot be cancelled: the backend may already have charged
//! the purchaser, so only tearing the store down abandons it.
//!
//! # Pricing
//!
//! The total is never stored. [`CheckoutState::quote`] derives it from the
//! selected tier, the quantity and the applied coupon, so an edited coupon
//! can never leave a stale discount behind.

pub mod actions;
pub mod environment;
pub mod reducer;
pub mod store;
#[cfg(test)]
mod tests;
pub mod types;

pub use actions::CheckoutAction;
pub use environment::CheckoutEnvironment;
pub use reducer::{CheckoutReducer, COUPON_VALIDATION, PURCHASE};
pub use store::{checkout_store, CheckoutStore};
pub use types::{
    CheckoutPhase, CheckoutState, CouponStatus, Notice, NoticeLevel, OrderIntent,
};
