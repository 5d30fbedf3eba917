//! Coupons and the coupon validation gate.
//!
//! The authoritative validator is the backend; [`InMemoryCouponBook`] applies
//! the same rules locally for tests and the demo binary. Validation never
//! changes a coupon. Usage is counted only by [`InMemoryCouponBook::redeem`]
//! when a purchase is confirmed.

use crate::gateway::{CouponValidator, GatewayResult};
use crate::session::Session;
use crate::types::{DiscountPercentage, EventId};
use checkout_core::environment::Clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// A discount code
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    /// Code the purchaser types
    pub code: String,
    /// Discount granted
    pub discount_percentage: DiscountPercentage,
    /// Event the coupon is limited to; `None` means every event
    #[serde(default)]
    pub event_id: Option<EventId>,
    /// Start of the validity window
    pub valid_from: DateTime<Utc>,
    /// End of the validity window; `None` means no expiry
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    /// Redemption cap; `None` means unlimited
    #[serde(default)]
    pub max_uses: Option<u32>,
    /// Redemptions so far
    #[serde(default)]
    pub used_count: u32,
    /// Whether the coupon is enabled
    #[serde(default = "enabled")]
    pub active: bool,
}

const fn enabled() -> bool {
    true
}

impl Coupon {
    /// Creates an active, unlimited coupon for every event, valid from `valid_from`
    #[must_use]
    pub fn new(
        code: impl Into<String>,
        discount_percentage: DiscountPercentage,
        valid_from: DateTime<Utc>,
    ) -> Self {
        Self {
            code: code.into(),
            discount_percentage,
            event_id: None,
            valid_from,
            valid_until: None,
            max_uses: None,
            used_count: 0,
            active: true,
        }
    }

    /// Limits the coupon to one event
    #[must_use]
    pub fn for_event(mut self, event_id: EventId) -> Self {
        self.event_id = Some(event_id);
        self
    }

    /// Sets an expiry
    #[must_use]
    pub const fn valid_until(mut self, until: DateTime<Utc>) -> Self {
        self.valid_until = Some(until);
        self
    }

    /// Caps the number of redemptions
    #[must_use]
    pub const fn with_max_uses(mut self, max_uses: u32) -> Self {
        self.max_uses = Some(max_uses);
        self
    }

    /// Disables the coupon
    #[must_use]
    pub const fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }

    /// Checks whether the coupon may be applied to `event_id` at `now`
    ///
    /// Rules are checked in a fixed order and the first failure wins.
    ///
    /// # Errors
    ///
    /// Returns the [`CouponRejection`] for the first rule that fails.
    pub fn check(
        &self,
        event_id: &EventId,
        now: DateTime<Utc>,
    ) -> Result<DiscountPercentage, CouponRejection> {
        if !self.active {
            return Err(RejectionKind::Inactive.into());
        }
        if self.event_id.as_ref().is_some_and(|id| id != event_id) {
            return Err(RejectionKind::EventMismatch.into());
        }
        if now < self.valid_from {
            return Err(RejectionKind::NotYetValid.into());
        }
        if self.valid_until.is_some_and(|until| now > until) {
            return Err(RejectionKind::Expired.into());
        }
        if self.max_uses.is_some_and(|cap| self.used_count >= cap) {
            return Err(RejectionKind::UseCapExceeded.into());
        }
        Ok(self.discount_percentage)
    }
}

/// Why a coupon was refused
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// No coupon with that code
    NotFound,
    /// Coupon exists but is disabled
    Inactive,
    /// Coupon is limited to another event
    EventMismatch,
    /// Validity window has not started
    NotYetValid,
    /// Validity window has ended
    Expired,
    /// Redemption cap reached
    UseCapExceeded,
}

impl RejectionKind {
    /// Message the backend reports for this rejection
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotFound | Self::Inactive => "Invalid coupon code",
            Self::EventMismatch => "Coupon not valid for this event",
            Self::NotYetValid => "Coupon not yet valid",
            Self::Expired => "Coupon has expired",
            Self::UseCapExceeded => "Coupon usage limit reached",
        }
    }

    /// Recovers the kind from a backend message
    ///
    /// Disabled and unknown codes share a message, so both map to
    /// [`RejectionKind::NotFound`].
    #[must_use]
    pub fn from_message(message: &str) -> Option<Self> {
        [
            Self::NotFound,
            Self::EventMismatch,
            Self::NotYetValid,
            Self::Expired,
            Self::UseCapExceeded,
        ]
        .into_iter()
        .find(|kind| kind.message() == message)
    }
}

/// A refused coupon, with the reason shown to the purchaser
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct CouponRejection {
    /// Fine-grained reason, when known
    pub kind: Option<RejectionKind>,
    /// Human-readable reason
    pub message: String,
}

impl CouponRejection {
    /// Builds a rejection from a remote message, recovering the kind if possible
    #[must_use]
    pub fn from_remote(message: Option<String>) -> Self {
        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| RejectionKind::NotFound.message().to_string());
        Self {
            kind: RejectionKind::from_message(&message),
            message,
        }
    }
}

impl From<RejectionKind> for CouponRejection {
    fn from(kind: RejectionKind) -> Self {
        Self {
            kind: Some(kind),
            message: kind.message().to_string(),
        }
    }
}

/// Outcome of a coupon validation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CouponVerdict {
    /// The coupon may be applied
    Valid {
        /// Discount to apply
        discount: DiscountPercentage,
        /// Confirmation message
        message: String,
    },
    /// The coupon was refused
    Rejected(CouponRejection),
}

impl CouponVerdict {
    /// Verdict for an accepted coupon, with the backend's confirmation message
    #[must_use]
    pub fn valid(discount: DiscountPercentage) -> Self {
        Self::Valid {
            message: format!("Coupon applied with {discount} discount"),
            discount,
        }
    }

    /// Whether the coupon was accepted
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// Message to show the purchaser
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Valid { message, .. } => message,
            Self::Rejected(rejection) => &rejection.message,
        }
    }
}

impl fmt::Display for CouponVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// In-memory coupon store applying the backend's validity rules
///
/// Clones share the same coupons.
#[derive(Clone)]
pub struct InMemoryCouponBook {
    coupons: Arc<Mutex<HashMap<String, Coupon>>>,
    clock: Arc<dyn Clock>,
    latency: Duration,
}

impl InMemoryCouponBook {
    /// Creates an empty book reading time from `clock`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            coupons: Arc::new(Mutex::new(HashMap::new())),
            clock,
            latency: Duration::ZERO,
        }
    }

    /// Delays every validation by `latency`, to mimic a remote call
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Adds or replaces a coupon
    pub fn insert(&self, coupon: Coupon) {
        if let Ok(mut coupons) = self.coupons.lock() {
            coupons.insert(coupon.code.clone(), coupon);
        }
    }

    /// Returns a copy of the coupon with `code`
    #[must_use]
    pub fn get(&self, code: &str) -> Option<Coupon> {
        self.coupons.lock().ok()?.get(code).cloned()
    }

    /// Validates `code` for `event_id` without changing anything
    #[must_use]
    pub fn verdict(&self, code: &str, event_id: &EventId) -> CouponVerdict {
        let now = self.clock.now();
        let Ok(coupons) = self.coupons.lock() else {
            return CouponVerdict::Rejected(RejectionKind::NotFound.into());
        };

        match coupons.get(code) {
            None => CouponVerdict::Rejected(RejectionKind::NotFound.into()),
            Some(coupon) => match coupon.check(event_id, now) {
                Ok(discount) => CouponVerdict::valid(discount),
                Err(rejection) => CouponVerdict::Rejected(rejection),
            },
        }
    }

    /// Counts one use of `code` against `event_id`
    ///
    /// The coupon is re-checked and incremented under one lock, so concurrent
    /// purchases cannot push `used_count` past `max_uses`.
    ///
    /// # Errors
    ///
    /// Returns the [`CouponRejection`] if the coupon is no longer valid.
    pub fn redeem(
        &self,
        code: &str,
        event_id: &EventId,
    ) -> Result<DiscountPercentage, CouponRejection> {
        let now = self.clock.now();
        let mut coupons = self
            .coupons
            .lock()
            .map_err(|_| CouponRejection::from(RejectionKind::NotFound))?;

        let coupon = coupons
            .get_mut(code)
            .ok_or_else(|| CouponRejection::from(RejectionKind::NotFound))?;
        let discount = coupon.check(event_id, now)?;
        coupon.used_count = coupon.used_count.saturating_add(1);

        tracing::debug!(
            code,
            used_count = coupon.used_count,
            max_uses = ?coupon.max_uses,
            "Coupon redeemed"
        );
        Ok(discount)
    }
}

impl fmt::Debug for InMemoryCouponBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.coupons.lock().map(|c| c.len()).unwrap_or_default();
        f.debug_struct("InMemoryCouponBook")
            .field("coupons", &count)
            .field("latency", &self.latency)
            .finish_non_exhaustive()
    }
}

impl CouponValidator for InMemoryCouponBook {
    fn validate(
        &self,
        _session: &Session,
        coupon_code: &str,
        event_id: &EventId,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<CouponVerdict>> + Send>> {
        let book = self.clone();
        let code = coupon_code.to_string();
        let event_id = event_id.clone();

        Box::pin(async move {
            if !book.latency.is_zero() {
                tokio::time::sleep(book.latency).await;
            }
            let verdict = book.verdict(&code, &event_id);
            tracing::debug!(code = %code, event_id = %event_id, valid = verdict.is_valid(), "Coupon checked");
            Ok(verdict)
        })
    }
}
