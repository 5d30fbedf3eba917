//! Domain types for ticket checkout.
//!
//! Value objects shared by pricing, coupon validation and the checkout flow.
//! Wire names follow the ticketing backend (`price_regular`,
//! `price_ieee_member`, `ticket_type: "ieee"`), so these types serialize
//! directly into request and response bodies.

use crate::pricing::PricingError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, Sub};

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of an event, as issued by the backend
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Wraps a backend event id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a purchased ticket
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    /// Wraps a backend ticket id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mints a fresh random id
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The raw id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Money Value Object (decimal, rounded only for display)
// ============================================================================

/// A monetary amount in the event's currency
///
/// Arithmetic is exact decimal. Rounding to cents happens only in
/// [`Money::rounded`] and `Display`, never in intermediate results.
/// On the wire money is a JSON number, matching the backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(#[serde(with = "rust_decimal::serde::float")] Decimal);

impl Money {
    /// Zero
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Creates a `Money` value from a decimal amount
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Creates a `Money` value from cents
    #[must_use]
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    /// Creates a `Money` value from whole dollars
    #[must_use]
    pub fn from_dollars(dollars: i64) -> Self {
        Self(Decimal::from(dollars))
    }

    /// The exact amount
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// The amount rounded half away from zero to two decimal places
    #[must_use]
    pub fn rounded(&self) -> Self {
        let mut amount = self
            .0
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        amount.rescale(2);
        Self(amount)
    }

    /// The rounded amount in cents, saturating at `i64` bounds
    #[must_use]
    pub fn cents(&self) -> i64 {
        let saturated = if self.0.is_sign_negative() {
            i64::MIN
        } else {
            i64::MAX
        };
        self.rounded()
            .0
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|cents| cents.to_i64())
            .unwrap_or(saturated)
    }

    /// Checks if the amount is zero
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Multiplies by a ticket quantity
    ///
    /// Saturates at the largest representable amount instead of overflowing.
    #[must_use]
    pub fn times(self, quantity: Quantity) -> Self {
        Self(self.0.saturating_mul(Decimal::from(quantity.get())))
    }

    /// The given percentage of this amount
    #[must_use]
    pub fn percent(self, percentage: DiscountPercentage) -> Self {
        Self(self.0.saturating_mul(percentage.ratio()))
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rounded().0)
    }
}

// ============================================================================
// Discount Percentage
// ============================================================================

/// A coupon discount, always within `[0, 100]`
///
/// Out-of-range values are clamped when the value is built, including when
/// it is deserialized from a backend response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DiscountPercentage(Decimal);

impl DiscountPercentage {
    /// No discount
    pub const NONE: Self = Self(Decimal::ZERO);

    /// Full discount
    pub const FULL: Self = Self(Decimal::ONE_HUNDRED);

    /// Builds a percentage, clamping to `[0, 100]`
    #[must_use]
    pub fn new(value: Decimal) -> Self {
        Self(value.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED))
    }

    /// Builds a percentage from a float, clamping to `[0, 100]`
    ///
    /// `NaN` becomes zero; infinities clamp to the nearest bound.
    #[must_use]
    pub fn from_f64(value: f64) -> Self {
        if value.is_nan() {
            Self::NONE
        } else if value >= 100.0 {
            Self::FULL
        } else if value <= 0.0 {
            Self::NONE
        } else {
            Decimal::try_from(value).map_or(Self::NONE, Self::new)
        }
    }

    /// The percentage value, e.g. `10` for ten percent
    #[must_use]
    pub const fn value(&self) -> Decimal {
        self.0
    }

    /// The percentage as a fraction of one
    #[must_use]
    pub fn ratio(&self) -> Decimal {
        self.0 / Decimal::ONE_HUNDRED
    }
}

impl fmt::Display for DiscountPercentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0.normalize())
    }
}

impl Serialize for DiscountPercentage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        rust_decimal::serde::float::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for DiscountPercentage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        rust_decimal::serde::float::deserialize(deserializer).map(Self::new)
    }
}

// ============================================================================
// Order Inputs
// ============================================================================

/// Ticket tier
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Regular admission
    #[default]
    Regular,
    /// Discounted tier for verified IEEE members
    #[serde(rename = "ieee", alias = "member")]
    Member,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regular => f.write_str("regular"),
            Self::Member => f.write_str("ieee"),
        }
    }
}

/// How the purchaser pays
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Credit or debit card
    #[default]
    Card,
    /// `PayPal`
    PayPal,
    /// Apple Pay
    ApplePay,
    /// Google Pay
    GooglePay,
    /// Cryptocurrency
    Crypto,
}

/// Number of tickets in an order, never below one
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// A single ticket
    pub const ONE: Self = Self(1);

    /// Creates a quantity, rejecting zero
    #[must_use]
    pub const fn new(value: u32) -> Option<Self> {
        if value == 0 { None } else { Some(Self(value)) }
    }

    /// Coerces free-text input into a quantity
    ///
    /// Reads an optional sign and the leading run of digits, ignoring
    /// anything after them. Empty, non-numeric, zero and negative input all
    /// become one; values beyond `u32::MAX` saturate.
    ///
    /// ```
    /// use ticketing::types::Quantity;
    ///
    /// assert_eq!(Quantity::from_input("3 tickets").get(), 3);
    /// assert_eq!(Quantity::from_input("-3").get(), 1);
    /// assert_eq!(Quantity::from_input("abc").get(), 1);
    /// ```
    #[must_use]
    pub fn from_input(input: &str) -> Self {
        let trimmed = input.trim_start();
        let (negative, digits) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };

        let value = digits
            .bytes()
            .take_while(u8::is_ascii_digit)
            .fold(0u32, |acc, d| {
                acc.saturating_mul(10).saturating_add(u32::from(d - b'0'))
            });

        if negative {
            Self::ONE
        } else {
            Self::new(value).unwrap_or(Self::ONE)
        }
    }

    /// The number of tickets
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// One more ticket
    #[must_use]
    pub const fn increment(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// One fewer ticket, never below one
    #[must_use]
    pub const fn decrement(self) -> Self {
        if self.0 > 1 { Self(self.0 - 1) } else { Self::ONE }
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Self::ONE
    }
}

impl TryFrom<u32> for Quantity {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| "quantity must be at least 1".to_string())
    }
}

impl From<Quantity> for u32 {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Event
// ============================================================================

/// An event tickets are sold for
///
/// Only the fields pricing needs are kept. Construction enforces a positive
/// regular price and, when present, a positive member price that does not
/// exceed it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "EventRecord", into = "EventRecord")]
pub struct Event {
    id: EventId,
    title: String,
    regular_price: Money,
    member_price: Option<Money>,
}

impl Event {
    /// Creates an event
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::InvalidEventPrice`] if the regular price is not
    /// positive, or the member price is not positive or exceeds the regular
    /// price.
    pub fn new(
        id: EventId,
        title: impl Into<String>,
        regular_price: Money,
        member_price: Option<Money>,
    ) -> Result<Self, PricingError> {
        if regular_price <= Money::ZERO {
            return Err(PricingError::InvalidEventPrice {
                reason: format!("regular price {regular_price} must be positive"),
            });
        }

        if let Some(member) = member_price {
            if member <= Money::ZERO {
                return Err(PricingError::InvalidEventPrice {
                    reason: format!("member price {member} must be positive"),
                });
            }
            if member > regular_price {
                return Err(PricingError::InvalidEventPrice {
                    reason: format!(
                        "member price {member} exceeds regular price {regular_price}"
                    ),
                });
            }
        }

        Ok(Self {
            id,
            title: title.into(),
            regular_price,
            member_price,
        })
    }

    /// Event id
    #[must_use]
    pub const fn id(&self) -> &EventId {
        &self.id
    }

    /// Event title
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Price of a regular ticket
    #[must_use]
    pub const fn regular_price(&self) -> Money {
        self.regular_price
    }

    /// Price of a member ticket, if the event offers one
    #[must_use]
    pub const fn member_price(&self) -> Option<Money> {
        self.member_price
    }
}

/// Backend representation of an event
#[derive(Serialize, Deserialize)]
struct EventRecord {
    id: EventId,
    title: String,
    price_regular: Money,
    #[serde(default)]
    price_ieee_member: Option<Money>,
}

impl TryFrom<EventRecord> for Event {
    type Error = PricingError;

    fn try_from(record: EventRecord) -> Result<Self, Self::Error> {
        Self::new(
            record.id,
            record.title,
            record.price_regular,
            record.price_ieee_member,
        )
    }
}

impl From<Event> for EventRecord {
    fn from(event: Event) -> Self {
        Self {
            id: event.id,
            title: event.title,
            price_regular: event.regular_price,
            price_ieee_member: event.member_price,
        }
    }
}

// ============================================================================
// Purchaser
// ============================================================================

/// The signed-in purchaser, as returned by the backend on login
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Backend user id
    pub id: String,
    /// Email address
    pub email: String,
    /// First name
    #[serde(default)]
    pub first_name: String,
    /// Last name
    #[serde(default)]
    pub last_name: String,
    /// Whether the user claims IEEE membership
    #[serde(default)]
    pub ieee_member: bool,
    /// Whether that membership has been verified
    #[serde(default)]
    pub ieee_verified: bool,
}

impl UserProfile {
    /// Whether the member tier may be selected
    #[must_use]
    pub const fn membership_verified(&self) -> bool {
        self.ieee_member && self.ieee_verified
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_money_display_rounds_half_away_from_zero() {
        assert_eq!(Money::from_dollars(90).to_string(), "90.00");
        assert_eq!(Money::new(Decimal::new(10_005, 3)).to_string(), "10.01");
        assert_eq!(Money::new(Decimal::new(-10_005, 3)).to_string(), "-10.01");
        assert_eq!(Money::new(Decimal::new(13_333_333, 6)).cents(), 1333);
    }

    #[test]
    fn test_money_keeps_full_precision_until_display() {
        let third = Money::new(Decimal::ONE / Decimal::from(3));
        let sum = third + third + third;
        assert_eq!(sum.rounded(), Money::from_dollars(1).rounded());
        assert_ne!(third.amount(), third.rounded().amount());
    }

    #[test]
    fn test_money_saturates_instead_of_overflowing() {
        let huge = Money::new(Decimal::from_i128_with_scale(10_i128.pow(20), 0));
        let quantity = Quantity::from_input("99999999999");

        let subtotal = huge.times(quantity);
        assert_eq!(subtotal.amount(), Decimal::MAX);
        assert_eq!(subtotal - subtotal.percent(DiscountPercentage::FULL), Money::ZERO);
        assert_eq!(subtotal + subtotal, subtotal);
        assert_eq!(subtotal.cents(), i64::MAX);
    }

    #[test]
    fn test_discount_percentage_clamps() {
        assert_eq!(DiscountPercentage::new(Decimal::from(150)), DiscountPercentage::FULL);
        assert_eq!(DiscountPercentage::new(Decimal::from(-5)), DiscountPercentage::NONE);
        assert_eq!(DiscountPercentage::from_f64(f64::NAN), DiscountPercentage::NONE);
        assert_eq!(DiscountPercentage::from_f64(12.5).to_string(), "12.5%");

        let parsed: DiscountPercentage = serde_json::from_str("250").unwrap();
        assert_eq!(parsed, DiscountPercentage::FULL);
    }

    #[test]
    fn test_quantity_from_input() {
        assert_eq!(Quantity::from_input("4").get(), 4);
        assert_eq!(Quantity::from_input("  12abc").get(), 12);
        assert_eq!(Quantity::from_input("3.9").get(), 3);
        assert_eq!(Quantity::from_input("-3").get(), 1);
        assert_eq!(Quantity::from_input("abc").get(), 1);
        assert_eq!(Quantity::from_input("0").get(), 1);
        assert_eq!(Quantity::from_input("").get(), 1);
        assert_eq!(Quantity::from_input("99999999999").get(), u32::MAX);
    }

    #[test]
    fn test_quantity_stepper_floors_at_one() {
        assert_eq!(Quantity::ONE.decrement(), Quantity::ONE);
        assert_eq!(Quantity::ONE.increment().get(), 2);
        assert!(serde_json::from_str::<Quantity>("0").is_err());
    }

    #[test]
    fn test_event_wire_names() {
        let json = r#"{"id":"evt-1","title":"Gala","price_regular":50.0,"price_ieee_member":35.5,"location":"Hall A"}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.regular_price(), Money::from_dollars(50));
        assert_eq!(event.member_price(), Some(Money::from_cents(3550)));

        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back["price_ieee_member"], serde_json::json!(35.5));
    }

    #[test]
    fn test_event_rejects_invalid_prices() {
        let id = EventId::new("evt-1");
        assert!(Event::new(id.clone(), "Free", Money::ZERO, None).is_err());
        assert!(
            Event::new(id.clone(), "Odd", Money::from_dollars(50), Some(Money::from_dollars(60)))
                .is_err()
        );
        assert!(serde_json::from_str::<Event>(r#"{"id":"x","title":"t","price_regular":-1}"#).is_err());
        assert!(Event::new(id, "Ok", Money::from_dollars(50), Some(Money::from_dollars(50))).is_ok());
    }

    #[test]
    fn test_tier_wire_values() {
        assert_eq!(serde_json::to_string(&Tier::Member).unwrap(), r#""ieee""#);
        assert_eq!(serde_json::from_str::<Tier>(r#""member""#).unwrap(), Tier::Member);
        assert_eq!(serde_json::to_string(&PaymentMethod::ApplePay).unwrap(), r#""applepay""#);
    }
}
