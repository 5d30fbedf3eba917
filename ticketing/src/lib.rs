//! Ticket checkout - pricing, coupon validation and the purchase flow
//!
//! A purchaser picks a ticket tier and a quantity, optionally applies a
//! coupon, and buys. This crate holds the business logic of that flow and the
//! adapters that reach the ticketing backend.
//!
//! # Architecture
//!
//! ```text
//!  purchaser input
//!        │
//!        ▼
//! ┌─────────────────┐   effects    ┌─────────────────────────────┐
//! │ CheckoutReducer │ ───────────▶ │ CouponValidator             │
//! │  (state machine)│ ◀─────────── │ PurchaseGateway             │
//! └─────────────────┘   actions    │ (BackendClient / in-memory) │
//!        │                         └─────────────────────────────┘
//!        ▼
//!  pricing (pure): unit price → subtotal → discount → total
//! ```
//!
//! # Key Features
//!
//! ## 1. Decimal money
//!
//! Prices and totals are [`Money`] values backed by a decimal type; rounding
//! to cents happens only when an amount is shown or sent to the backend.
//!
//! ## 2. Coupons that cannot go stale
//!
//! Editing the coupon field drops any applied discount, and an answer for
//! text that is no longer in the field is discarded.
//!
//! ## 3. Explicit sessions
//!
//! The signed-in purchaser is a [`Session`](session::Session) value passed to
//! every backend call; there is no ambient authentication state.
//!
//! # Usage
//!
//! See the [checkout] module for the reducer and its tests, and the `demo`
//! binary for a complete purchase against the in-memory backend.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod checkout;
pub mod config;
pub mod coupon;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod pricing;
pub mod session;
pub mod types;

pub use checkout::{
    checkout_store, CheckoutAction, CheckoutEnvironment, CheckoutReducer, CheckoutState,
    CheckoutStore,
};
pub use config::Config;
pub use error::CheckoutError;
pub use types::*;
