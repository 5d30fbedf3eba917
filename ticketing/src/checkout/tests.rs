//! Unit tests for `CheckoutReducer`.
//!
//! These cover the purchase flow transitions, the coupon field's
//! reset-on-edit rule, and the handling of stale responses after an edit or
//! a cancel.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code

use super::*;
use crate::coupon::{CouponRejection, CouponVerdict, InMemoryCouponBook, RejectionKind};
use crate::gateway::{GatewayError, MockPurchaseGateway};
use crate::session::{tests::verified_member, Session};
use crate::types::{DiscountPercentage, Event, EventId, Money, Quantity, TicketId, Tier};
use checkout_core::{effect::Effect, environment::Clock, reducer::Reducer};
use checkout_testing::{assertions, test_clock, ReducerTest};
use rust_decimal::Decimal;
use std::sync::Arc;

fn test_env() -> CheckoutEnvironment {
    let clock = Arc::new(test_clock());
    let book = InMemoryCouponBook::new(clock.clone());
    CheckoutEnvironment::new(
        clock,
        Arc::new(book.clone()),
        Arc::new(MockPurchaseGateway::new().with_coupons(book)),
    )
}

fn gala() -> Event {
    Event::new(
        EventId::new("gala"),
        "Winter Gala",
        Money::from_dollars(50),
        Some(Money::from_dollars(40)),
    )
    .unwrap()
}

fn member() -> Session {
    Session::new("token", verified_member())
}

fn unverified() -> Session {
    let mut user = verified_member();
    user.ieee_verified = false;
    Session::new("token", user)
}

fn signed_in() -> CheckoutState {
    CheckoutState::new(gala(), Some(member()))
}

fn ten_percent() -> CouponVerdict {
    CouponVerdict::valid(DiscountPercentage::new(Decimal::from(10)))
}

/// State after the purchaser applied a coupon and the validator accepted it
fn with_applied_coupon() -> CheckoutState {
    let reducer = CheckoutReducer::new();
    let env = test_env();
    let mut state = signed_in();
    for action in [
        CheckoutAction::QuantityInput("2".to_string()),
        CheckoutAction::EditCouponCode("SAVE10".to_string()),
        CheckoutAction::ApplyCoupon,
        CheckoutAction::CouponValidated {
            generation: 1,
            verdict: ten_percent(),
        },
    ] {
        let _ = reducer.reduce(&mut state, action, &env);
    }
    state
}

/// State with a purchase in flight
fn processing() -> CheckoutState {
    let reducer = CheckoutReducer::new();
    let env = test_env();
    let mut state = with_applied_coupon();
    for action in [CheckoutAction::ProceedToCheckout, CheckoutAction::SubmitPurchase] {
        let _ = reducer.reduce(&mut state, action, &env);
    }
    state
}

fn notice_text(state: &CheckoutState) -> &str {
    state.notice.as_ref().map_or("", |n| n.message.as_str())
}

// ============================================================================
// Tier and quantity
// ============================================================================

#[test]
fn test_member_tier_requires_verified_membership() {
    ReducerTest::new(CheckoutReducer::new())
        .with_env(test_env())
        .given_state(CheckoutState::new(gala(), Some(unverified())))
        .when_action(CheckoutAction::SelectTier(Tier::Member))
        .then_state(|state| {
            assert_eq!(state.order.tier, Tier::Regular);
            assert_eq!(state.phase, CheckoutPhase::Browsing);
            assert_eq!(
                notice_text(state),
                "You need to verify your IEEE membership to purchase IEEE member tickets"
            );
            assert_eq!(state.notice.as_ref().unwrap().level, NoticeLevel::Error);
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_member_tier_uses_member_price() {
    ReducerTest::new(CheckoutReducer::new())
        .with_env(test_env())
        .given_state(signed_in())
        .when_action(CheckoutAction::SelectTier(Tier::Member))
        .then_state(|state| {
            assert_eq!(state.order.tier, Tier::Member);
            assert_eq!(state.phase, CheckoutPhase::TierSelected);
            assert_eq!(state.quote().unwrap().total, Money::from_dollars(40));
        })
        .run();
}

#[test]
fn test_quantity_input_is_coerced() {
    let reducer = CheckoutReducer::new();
    let env = test_env();
    let mut state = signed_in();

    let _ = reducer.reduce(&mut state, CheckoutAction::QuantityInput("3".into()), &env);
    assert_eq!(state.order.quantity.get(), 3);

    let _ = reducer.reduce(&mut state, CheckoutAction::QuantityInput("abc".into()), &env);
    assert_eq!(state.order.quantity, Quantity::ONE);

    let _ = reducer.reduce(&mut state, CheckoutAction::QuantityInput("-4".into()), &env);
    assert_eq!(state.order.quantity, Quantity::ONE);

    let _ = reducer.reduce(&mut state, CheckoutAction::DecrementQuantity, &env);
    assert_eq!(state.order.quantity, Quantity::ONE);

    let _ = reducer.reduce(&mut state, CheckoutAction::IncrementQuantity, &env);
    assert_eq!(state.order.quantity.get(), 2);
}

// ============================================================================
// Coupon
// ============================================================================

#[test]
fn test_apply_coupon_requires_session() {
    ReducerTest::new(CheckoutReducer::new())
        .with_env(test_env())
        .given_state(CheckoutState::new(gala(), None))
        .given_actions([CheckoutAction::EditCouponCode("SAVE10".into())])
        .when_action(CheckoutAction::ApplyCoupon)
        .then_state(|state| {
            assert_eq!(state.coupon, CouponStatus::Pending);
            assert_eq!(notice_text(state), reducer::LOGIN_REQUIRED);
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_apply_blank_coupon_is_refused() {
    ReducerTest::new(CheckoutReducer::new())
        .with_env(test_env())
        .given_state(signed_in())
        .given_actions([CheckoutAction::EditCouponCode("   ".into())])
        .when_action(CheckoutAction::ApplyCoupon)
        .then_state(|state| {
            assert_eq!(state.coupon, CouponStatus::NoCoupon);
            assert_eq!(state.coupon_generation, 0);
            assert_eq!(notice_text(state), reducer::COUPON_REQUIRED);
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_apply_coupon_starts_cancellable_validation() {
    ReducerTest::new(CheckoutReducer::new())
        .with_env(test_env())
        .given_state(signed_in())
        .given_actions([CheckoutAction::EditCouponCode(" SAVE10 ".into())])
        .when_action(CheckoutAction::ApplyCoupon)
        .then_state(|state| {
            assert!(state.coupon.is_validating());
            assert_eq!(state.coupon_generation, 1);
            assert!(state.is_busy());
        })
        .then_effects(|effects| {
            assertions::assert_effects_count(effects, 1);
            assertions::assert_cancellable(effects, COUPON_VALIDATION);
            assertions::assert_has_future_effect(effects);
        })
        .run();
}

#[test]
fn test_apply_coupon_while_validating_is_ignored() {
    ReducerTest::new(CheckoutReducer::new())
        .with_env(test_env())
        .given_state(signed_in())
        .given_actions([
            CheckoutAction::EditCouponCode("SAVE10".into()),
            CheckoutAction::ApplyCoupon,
        ])
        .when_action(CheckoutAction::ApplyCoupon)
        .then_state(|state| assert_eq!(state.coupon_generation, 1))
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_valid_coupon_discounts_total() {
    let state = with_applied_coupon();

    assert!(state.coupon.is_applied());
    assert_eq!(notice_text(&state), "Coupon applied! 10% discount");
    assert_eq!(state.notice.as_ref().unwrap().level, NoticeLevel::Success);
    assert_eq!(state.notice.as_ref().unwrap().at, test_clock().now());

    let quote = state.quote().unwrap();
    assert_eq!(quote.subtotal, Money::from_dollars(100));
    assert_eq!(quote.total.to_string(), "90.00");
}

#[test]
fn test_rejected_coupon_shows_reason() {
    let rejection = CouponRejection::from(RejectionKind::Expired);

    ReducerTest::new(CheckoutReducer::new())
        .with_env(test_env())
        .given_state(signed_in())
        .given_actions([
            CheckoutAction::EditCouponCode("OLD".into()),
            CheckoutAction::ApplyCoupon,
        ])
        .when_action(CheckoutAction::CouponValidated {
            generation: 1,
            verdict: CouponVerdict::Rejected(rejection.clone()),
        })
        .then_state(move |state| {
            assert_eq!(state.coupon, CouponStatus::Rejected(rejection.clone()));
            assert_eq!(notice_text(state), rejection.message);
            assert_eq!(state.quote().unwrap().total, Money::from_dollars(50));
        })
        .run();
}

#[test]
fn test_editing_applied_coupon_resets_discount() {
    let reducer = CheckoutReducer::new();
    let env = test_env();
    let mut state = with_applied_coupon();

    let effects = reducer.reduce(&mut state, CheckoutAction::EditCouponCode("SAVE1".into()), &env);
    assertions::assert_no_effects(&effects);
    assert_eq!(state.coupon, CouponStatus::Pending);
    assert_eq!(state.quote().unwrap().total, Money::from_dollars(100));

    let _ = reducer.reduce(&mut state, CheckoutAction::EditCouponCode(String::new()), &env);
    assert_eq!(state.coupon, CouponStatus::NoCoupon);
}

#[test]
fn test_edit_during_validation_abandons_request() {
    let reducer = CheckoutReducer::new();
    let env = test_env();
    let mut state = signed_in();

    let _ = reducer.reduce(&mut state, CheckoutAction::EditCouponCode("SAVE10".into()), &env);
    let _ = reducer.reduce(&mut state, CheckoutAction::ApplyCoupon, &env);

    let effects = reducer.reduce(&mut state, CheckoutAction::EditCouponCode("SAVE20".into()), &env);
    assertions::assert_cancels(&effects, COUPON_VALIDATION);
    assert_eq!(state.coupon, CouponStatus::Pending);
    assert_eq!(state.coupon_generation, 2);

    // The answer for the old text arrives anyway and must not apply.
    let effects = reducer.reduce(
        &mut state,
        CheckoutAction::CouponValidated {
            generation: 1,
            verdict: ten_percent(),
        },
        &env,
    );
    assertions::assert_no_effects(&effects);
    assert_eq!(state.coupon, CouponStatus::Pending);
    assert_eq!(state.quote().unwrap().total, Money::from_dollars(50));
}

#[test]
fn test_validation_failure_is_retryable() {
    ReducerTest::new(CheckoutReducer::new())
        .with_env(test_env())
        .given_state(signed_in())
        .given_actions([
            CheckoutAction::EditCouponCode("SAVE10".into()),
            CheckoutAction::ApplyCoupon,
        ])
        .when_action(CheckoutAction::CouponValidationFailed {
            generation: 1,
            error: GatewayError::Timeout,
        })
        .then_state(|state| {
            assert_eq!(state.coupon, CouponStatus::Pending);
            let notice = state.notice.as_ref().unwrap();
            assert_eq!(notice.message, reducer::COUPON_CHECK_FAILED);
            assert!(notice.retryable);
            assert!(state.last_error.is_some());
        })
        .run();
}

#[test]
fn test_sign_out_during_validation_abandons_request() {
    ReducerTest::new(CheckoutReducer::new())
        .with_env(test_env())
        .given_state(signed_in())
        .given_actions([
            CheckoutAction::EditCouponCode("SAVE10".into()),
            CheckoutAction::ApplyCoupon,
        ])
        .when_action(CheckoutAction::SessionChanged(None))
        .then_state(|state| {
            assert!(state.session.is_none());
            assert_eq!(state.coupon, CouponStatus::Pending);
            assert_eq!(state.coupon_generation, 2);
        })
        .then_effects(|effects| assertions::assert_cancels(effects, COUPON_VALIDATION))
        .run();
}

// ============================================================================
// Purchase
// ============================================================================

#[test]
fn test_proceed_requires_session() {
    ReducerTest::new(CheckoutReducer::new())
        .with_env(test_env())
        .given_state(CheckoutState::new(gala(), None))
        .when_action(CheckoutAction::ProceedToCheckout)
        .then_state(|state| {
            assert_eq!(state.phase, CheckoutPhase::Browsing);
            assert_eq!(notice_text(state), reducer::LOGIN_REQUIRED);
        })
        .run();
}

#[test]
fn test_submit_outside_checkout_is_ignored() {
    ReducerTest::new(CheckoutReducer::new())
        .with_env(test_env())
        .given_state(signed_in())
        .when_action(CheckoutAction::SubmitPurchase)
        .then_state(|state| {
            assert_eq!(state.phase, CheckoutPhase::Browsing);
            assert_eq!(state.purchase_generation, 0);
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_submit_starts_purchase() {
    ReducerTest::new(CheckoutReducer::new())
        .with_env(test_env())
        .given_state(with_applied_coupon())
        .given_actions([CheckoutAction::ProceedToCheckout])
        .when_action(CheckoutAction::SubmitPurchase)
        .then_state(|state| {
            assert_eq!(state.phase, CheckoutPhase::Processing);
            assert_eq!(state.purchase_generation, 1);
            assert!(state.is_busy());
        })
        .then_effects(|effects| {
            assertions::assert_effects_count(effects, 1);
            assertions::assert_cancellable(effects, PURCHASE);
        })
        .run();
}

#[test]
fn test_inputs_frozen_while_processing() {
    let reducer = CheckoutReducer::new();
    let env = test_env();
    let mut state = processing();

    for action in [
        CheckoutAction::IncrementQuantity,
        CheckoutAction::EditCouponCode("OTHER".into()),
        CheckoutAction::SelectTier(Tier::Member),
        CheckoutAction::SubmitPurchase,
    ] {
        let effects = reducer.reduce(&mut state, action, &env);
        assertions::assert_no_effects(&effects);
    }

    assert_eq!(state.order.quantity.get(), 2);
    assert_eq!(state.order.coupon_code, "SAVE10");
    assert_eq!(state.order.tier, Tier::Regular);
    assert_eq!(state.purchase_generation, 1);
}

#[test]
fn test_submit_while_coupon_is_validating_is_ignored() {
    ReducerTest::new(CheckoutReducer::new())
        .with_env(test_env())
        .given_state(signed_in())
        .given_actions([
            CheckoutAction::ProceedToCheckout,
            CheckoutAction::EditCouponCode("SAVE10".into()),
            CheckoutAction::ApplyCoupon,
        ])
        .when_action(CheckoutAction::SubmitPurchase)
        .then_state(|state| {
            assert_eq!(state.phase, CheckoutPhase::Checkout);
            assert_eq!(state.purchase_generation, 0);
            assert!(state.coupon.is_validating());
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_coupon_answer_after_submit_does_not_change_order() {
    let reducer = CheckoutReducer::new();
    let env = test_env();
    let mut state = signed_in();
    for action in [
        CheckoutAction::ProceedToCheckout,
        CheckoutAction::EditCouponCode("SAVE10".into()),
        CheckoutAction::ApplyCoupon,
        CheckoutAction::SubmitPurchase,
        CheckoutAction::CouponValidated {
            generation: 1,
            verdict: ten_percent(),
        },
        CheckoutAction::SubmitPurchase,
    ] {
        let _ = reducer.reduce(&mut state, action, &env);
    }
    assert_eq!(state.phase, CheckoutPhase::Processing);
    assert_eq!(state.quote().unwrap().total.to_string(), "45.00");

    // A validation left over from before the order froze must not apply.
    state.coupon = CouponStatus::Validating;
    state.coupon_generation = 2;
    let effects = reducer.reduce(
        &mut state,
        CheckoutAction::CouponValidated {
            generation: 2,
            verdict: CouponVerdict::valid(DiscountPercentage::new(Decimal::from(50))),
        },
        &env,
    );

    assertions::assert_no_effects(&effects);
    assert_eq!(state.coupon, CouponStatus::Validating);
    assert!(state.notice.is_none());
    assert_eq!(state.phase, CheckoutPhase::Processing);
}

#[test]
fn test_purchase_success_completes_checkout() {
    let ticket_id = TicketId::new("ticket-1");
    let expected = ticket_id.clone();

    ReducerTest::new(CheckoutReducer::new())
        .with_env(test_env())
        .given_state(processing())
        .when_action(CheckoutAction::PurchaseSucceeded {
            generation: 1,
            ticket_id,
        })
        .then_state(move |state| {
            assert_eq!(
                state.phase,
                CheckoutPhase::Completed {
                    ticket_id: expected.clone()
                }
            );
            assert_eq!(notice_text(state), reducer::PURCHASE_SUCCEEDED);
            assert!(!state.is_busy());
        })
        .run();
}

#[test]
fn test_purchase_failure_allows_retry() {
    let reducer = CheckoutReducer::new();
    let env = test_env();
    let mut state = processing();

    let _ = reducer.reduce(
        &mut state,
        CheckoutAction::PurchaseFailed {
            generation: 1,
            error: GatewayError::Api {
                status: 503,
                message: "busy".into(),
            },
        },
        &env,
    );
    assert!(matches!(state.phase, CheckoutPhase::Failed { .. }));
    let notice = state.notice.as_ref().unwrap();
    assert_eq!(notice.message, reducer::PURCHASE_FAILED);
    assert!(notice.retryable);

    let effects = reducer.reduce(&mut state, CheckoutAction::SubmitPurchase, &env);
    assertions::assert_cancellable(&effects, PURCHASE);
    assert_eq!(state.phase, CheckoutPhase::Processing);
    assert_eq!(state.purchase_generation, 2);
}

// ============================================================================
// Cancel and stale responses
// ============================================================================

/// State in checkout with a coupon validation in flight
fn validating_in_checkout() -> CheckoutState {
    let reducer = CheckoutReducer::new();
    let env = test_env();
    let mut state = signed_in();
    for action in [
        CheckoutAction::QuantityInput("3".into()),
        CheckoutAction::ProceedToCheckout,
        CheckoutAction::EditCouponCode("SAVE10".into()),
        CheckoutAction::ApplyCoupon,
    ] {
        let _ = reducer.reduce(&mut state, action, &env);
    }
    state
}

#[test]
fn test_cancel_resets_and_abandons_validation() {
    ReducerTest::new(CheckoutReducer::new())
        .with_env(test_env())
        .given_state(validating_in_checkout())
        .when_action(CheckoutAction::Cancel)
        .then_state(|state| {
            assert_eq!(state.phase, CheckoutPhase::Browsing);
            assert_eq!(state.order, OrderIntent::default());
            assert_eq!(state.coupon, CouponStatus::NoCoupon);
            assert_eq!(state.coupon_generation, 2);
            assert!(state.notice.is_none());
            assert!(!state.is_busy());
        })
        .then_effects(|effects| assertions::assert_cancels(effects, COUPON_VALIDATION))
        .run();
}

#[test]
fn test_cancel_while_processing_is_ignored() {
    let reducer = CheckoutReducer::new();
    let env = test_env();
    let mut state = processing();

    let effects = reducer.reduce(&mut state, CheckoutAction::Cancel, &env);
    assertions::assert_no_effects(&effects);
    assert_eq!(state.phase, CheckoutPhase::Processing);
    assert_eq!(state.order.coupon_code, "SAVE10");

    // The receipt still lands.
    let _ = reducer.reduce(
        &mut state,
        CheckoutAction::PurchaseSucceeded {
            generation: 1,
            ticket_id: TicketId::new("ticket-1"),
        },
        &env,
    );
    assert_eq!(
        state.phase,
        CheckoutPhase::Completed {
            ticket_id: TicketId::new("ticket-1")
        }
    );
}

#[test]
fn test_late_coupon_answer_after_cancel_is_dropped() {
    ReducerTest::new(CheckoutReducer::new())
        .with_env(test_env())
        .given_state(validating_in_checkout())
        .given_actions([CheckoutAction::Cancel])
        .when_action(CheckoutAction::CouponValidated {
            generation: 1,
            verdict: ten_percent(),
        })
        .then_state(|state| {
            assert_eq!(state.coupon, CouponStatus::NoCoupon);
            assert!(state.notice.is_none());
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_response_from_earlier_purchase_attempt_is_dropped() {
    let reducer = CheckoutReducer::new();
    let env = test_env();
    let mut state = processing();
    for action in [
        CheckoutAction::PurchaseFailed {
            generation: 1,
            error: GatewayError::Timeout,
        },
        CheckoutAction::SubmitPurchase,
    ] {
        let _ = reducer.reduce(&mut state, action, &env);
    }

    let _ = reducer.reduce(
        &mut state,
        CheckoutAction::PurchaseSucceeded {
            generation: 1,
            ticket_id: TicketId::new("late"),
        },
        &env,
    );
    assert_eq!(state.phase, CheckoutPhase::Processing);
    assert_eq!(state.purchase_generation, 2);
}

#[test]
fn test_dismiss_notice() {
    ReducerTest::new(CheckoutReducer::new())
        .with_env(test_env())
        .given_state(with_applied_coupon())
        .when_action(CheckoutAction::DismissNotice)
        .then_state(|state| {
            assert!(state.notice.is_none());
            assert!(state.coupon.is_applied());
        })
        .then_effects(|effects| assert!(matches!(effects, [Effect::None])))
        .run();
}
