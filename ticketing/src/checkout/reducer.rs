//! Reducer for the checkout flow.

use crate::checkout::{
    CheckoutAction, CheckoutEnvironment, CheckoutPhase, CheckoutState, CouponStatus, Notice,
    NoticeLevel, OrderIntent,
};
use crate::coupon::CouponVerdict;
use crate::gateway::{GatewayError, PurchaseRequest};
use crate::metrics::{self, ValidationOutcome};
use crate::pricing::PricingError;
use crate::types::{Quantity, TicketId, Tier};
use checkout_core::{
    effect::{Effect, EffectId},
    reducer::Reducer,
};
use smallvec::{smallvec, SmallVec};

/// Handle of the in-flight coupon validation
pub const COUPON_VALIDATION: EffectId = EffectId::new("coupon-validation");

/// Handle of the in-flight purchase request
pub const PURCHASE: EffectId = EffectId::new("purchase");

/// Shown when an action needs a signed-in purchaser
pub const LOGIN_REQUIRED: &str = "Please login to purchase tickets";

/// Shown when the coupon field is blank
pub const COUPON_REQUIRED: &str = "Please enter a coupon code";

/// Shown when the coupon validator cannot be reached
pub const COUPON_CHECK_FAILED: &str = "Error validating coupon";

/// Shown when a purchase is confirmed
pub const PURCHASE_SUCCEEDED: &str = "Tickets purchased successfully!";

/// Shown when a purchase fails
pub const PURCHASE_FAILED: &str = "Failed to process payment";

type Effects = SmallVec<[Effect<CheckoutAction>; 4]>;

/// Reducer for a single checkout.
///
/// Owns the purchase flow state machine, the coupon field's reset-on-edit
/// rule and the one-request-at-a-time guards. Remote calls run as
/// cancellable effects tagged with a generation; a response whose
/// generation is no longer current is dropped.
pub struct CheckoutReducer;

impl CheckoutReducer {
    /// Create a new checkout reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn notify(
        state: &mut CheckoutState,
        env: &CheckoutEnvironment,
        level: NoticeLevel,
        message: impl Into<String>,
        retryable: bool,
    ) {
        state.notice = Some(Notice {
            level,
            message: message.into(),
            retryable,
            at: env.clock().now(),
        });
    }

    fn refuse(state: &mut CheckoutState, env: &CheckoutEnvironment, message: impl Into<String>) {
        let message = message.into();
        state.last_error = Some(message.clone());
        Self::notify(state, env, NoticeLevel::Error, message, false);
    }

    fn ignored(state: &CheckoutState, action: &'static str) -> Effects {
        tracing::debug!(action, phase = state.phase.name(), "Action ignored in current phase");
        smallvec![Effect::None]
    }

    fn select_tier(state: &mut CheckoutState, tier: Tier, env: &CheckoutEnvironment) -> Effects {
        if !state.phase.accepts_edits() {
            return Self::ignored(state, "select_tier");
        }
        if tier == Tier::Member && !state.membership_verified() {
            Self::refuse(state, env, PricingError::InvalidTierSelection.to_string());
            return smallvec![Effect::None];
        }

        state.order.tier = tier;
        if state.phase == CheckoutPhase::Browsing {
            state.phase = CheckoutPhase::TierSelected;
        }
        smallvec![Effect::None]
    }

    fn set_quantity(state: &mut CheckoutState, quantity: Quantity) -> Effects {
        if !state.phase.accepts_edits() {
            return Self::ignored(state, "set_quantity");
        }
        state.order.quantity = quantity;
        smallvec![Effect::None]
    }

    fn edit_coupon_code(state: &mut CheckoutState, text: String) -> Effects {
        if !state.phase.accepts_edits() {
            return Self::ignored(state, "edit_coupon_code");
        }

        let abandoned = state.coupon.is_validating();
        state.coupon = CouponStatus::for_text(&text);
        state.order.coupon_code = text;

        if abandoned {
            // The answer would describe text that is no longer in the field.
            state.coupon_generation += 1;
            smallvec![Effect::Cancel(COUPON_VALIDATION)]
        } else {
            smallvec![Effect::None]
        }
    }

    fn apply_coupon(state: &mut CheckoutState, env: &CheckoutEnvironment) -> Effects {
        if !state.phase.accepts_edits() {
            return Self::ignored(state, "apply_coupon");
        }
        if state.coupon.is_validating() {
            return Self::ignored(state, "apply_coupon");
        }
        let Some(session) = state.session.clone() else {
            Self::refuse(state, env, LOGIN_REQUIRED);
            return smallvec![Effect::None];
        };
        let Some(code) = state.order.coupon_code().map(str::to_string) else {
            Self::refuse(state, env, COUPON_REQUIRED);
            return smallvec![Effect::None];
        };

        state.coupon_generation += 1;
        state.coupon = CouponStatus::Validating;
        let generation = state.coupon_generation;
        tracing::debug!(%code, generation, "Validating coupon");

        let request = env.coupons().validate(&session, &code, state.event.id());
        smallvec![Effect::future(async move {
            Some(match request.await {
                Ok(verdict) => CheckoutAction::CouponValidated {
                    generation,
                    verdict,
                },
                Err(error) => CheckoutAction::CouponValidationFailed { generation, error },
            })
        })
        .cancellable(COUPON_VALIDATION)]
    }

    fn is_current_validation(state: &CheckoutState, generation: u64) -> bool {
        let current = generation == state.coupon_generation
            && state.coupon.is_validating()
            && state.phase.accepts_edits();
        if !current {
            tracing::debug!(
                generation,
                current = state.coupon_generation,
                "Dropping stale coupon validation"
            );
            metrics::record_stale_response("coupon_validation");
        }
        current
    }

    fn coupon_validated(
        state: &mut CheckoutState,
        generation: u64,
        verdict: CouponVerdict,
        env: &CheckoutEnvironment,
    ) -> Effects {
        if !Self::is_current_validation(state, generation) {
            return smallvec![Effect::None];
        }

        match verdict {
            CouponVerdict::Valid { discount, message } => {
                tracing::info!(%discount, "Coupon applied");
                metrics::record_coupon_validation(ValidationOutcome::Valid);
                state.coupon = CouponStatus::Applied { discount, message };
                Self::notify(
                    state,
                    env,
                    NoticeLevel::Success,
                    format!("Coupon applied! {discount} discount"),
                    false,
                );
            },
            CouponVerdict::Rejected(rejection) => {
                tracing::info!(reason = %rejection, "Coupon rejected");
                metrics::record_coupon_validation(ValidationOutcome::Rejected);
                Self::notify(state, env, NoticeLevel::Error, rejection.message.clone(), false);
                state.coupon = CouponStatus::Rejected(rejection);
            },
        }
        smallvec![Effect::None]
    }

    fn coupon_validation_failed(
        state: &mut CheckoutState,
        generation: u64,
        error: &GatewayError,
        env: &CheckoutEnvironment,
    ) -> Effects {
        if !Self::is_current_validation(state, generation) {
            return smallvec![Effect::None];
        }

        tracing::warn!(%error, "Coupon validation failed");
        metrics::record_coupon_validation(ValidationOutcome::Error);
        state.coupon = CouponStatus::for_text(&state.order.coupon_code);
        state.last_error = Some(error.to_string());
        Self::notify(
            state,
            env,
            NoticeLevel::Error,
            COUPON_CHECK_FAILED,
            error.is_retryable(),
        );
        smallvec![Effect::None]
    }

    fn proceed_to_checkout(state: &mut CheckoutState, env: &CheckoutEnvironment) -> Effects {
        if !matches!(state.phase, CheckoutPhase::Browsing | CheckoutPhase::TierSelected) {
            return Self::ignored(state, "proceed_to_checkout");
        }
        if state.session.is_none() {
            Self::refuse(state, env, LOGIN_REQUIRED);
            return smallvec![Effect::None];
        }
        if let Err(error) = state.unit_price() {
            Self::refuse(state, env, error.to_string());
            return smallvec![Effect::None];
        }

        state.phase = CheckoutPhase::Checkout;
        smallvec![Effect::None]
    }

    fn submit_purchase(state: &mut CheckoutState, env: &CheckoutEnvironment) -> Effects {
        if !state.phase.can_submit() {
            return Self::ignored(state, "submit_purchase");
        }
        if state.coupon.is_validating() {
            // The order is frozen once submitted; wait for the coupon answer.
            return Self::ignored(state, "submit_purchase");
        }
        let Some(session) = state.session.clone() else {
            Self::refuse(state, env, LOGIN_REQUIRED);
            return smallvec![Effect::None];
        };
        let quote = match state.quote() {
            Ok(quote) => quote,
            Err(error) => {
                Self::refuse(state, env, error.to_string());
                return smallvec![Effect::None];
            },
        };

        let request = PurchaseRequest {
            event_id: state.event.id().clone(),
            quantity: state.order.quantity,
            ticket_type: state.order.tier,
            payment_method: state.order.payment_method,
            total_amount: quote.total.rounded(),
            coupon_code: state
                .coupon
                .is_applied()
                .then(|| state.order.coupon_code().map(str::to_string))
                .flatten(),
        };

        state.purchase_generation += 1;
        state.phase = CheckoutPhase::Processing;
        state.notice = None;
        state.last_error = None;
        let generation = state.purchase_generation;
        tracing::info!(
            event_id = %request.event_id,
            quantity = request.quantity.get(),
            total = %request.total_amount,
            generation,
            "Submitting purchase"
        );

        let purchase = env.purchases().purchase(&session, request);
        smallvec![Effect::future(async move {
            Some(match purchase.await {
                Ok(receipt) => CheckoutAction::PurchaseSucceeded {
                    generation,
                    ticket_id: receipt.ticket_id,
                },
                Err(error) => CheckoutAction::PurchaseFailed { generation, error },
            })
        })
        .cancellable(PURCHASE)]
    }

    fn is_current_purchase(state: &CheckoutState, generation: u64) -> bool {
        let current = generation == state.purchase_generation
            && state.phase == CheckoutPhase::Processing;
        if !current {
            tracing::debug!(
                generation,
                current = state.purchase_generation,
                "Dropping stale purchase response"
            );
            metrics::record_stale_response("purchase");
        }
        current
    }

    fn purchase_succeeded(
        state: &mut CheckoutState,
        generation: u64,
        ticket_id: TicketId,
        env: &CheckoutEnvironment,
    ) -> Effects {
        if !Self::is_current_purchase(state, generation) {
            return smallvec![Effect::None];
        }

        // Inputs are frozen while processing, so the quote matches what was charged.
        if let Ok(quote) = state.quote() {
            metrics::record_purchase_succeeded(quote.total.rounded(), quote.quantity);
        }
        tracing::info!(ticket_id = %ticket_id, "Purchase confirmed");
        state.phase = CheckoutPhase::Completed { ticket_id };
        Self::notify(state, env, NoticeLevel::Success, PURCHASE_SUCCEEDED, false);
        smallvec![Effect::None]
    }

    fn purchase_failed(
        state: &mut CheckoutState,
        generation: u64,
        error: &GatewayError,
        env: &CheckoutEnvironment,
    ) -> Effects {
        if !Self::is_current_purchase(state, generation) {
            return smallvec![Effect::None];
        }

        tracing::warn!(%error, "Purchase failed");
        metrics::record_purchase_failed();
        state.phase = CheckoutPhase::Failed {
            reason: error.to_string(),
        };
        state.last_error = Some(error.to_string());
        Self::notify(
            state,
            env,
            NoticeLevel::Error,
            PURCHASE_FAILED,
            error.is_retryable(),
        );
        smallvec![Effect::None]
    }

    fn session_changed(
        state: &mut CheckoutState,
        session: Option<crate::session::Session>,
    ) -> Effects {
        if !state.phase.accepts_edits() {
            return Self::ignored(state, "session_changed");
        }

        state.session = session;
        if state.coupon.is_validating() {
            // The request carried the previous purchaser's token.
            state.coupon_generation += 1;
            state.coupon = CouponStatus::for_text(&state.order.coupon_code);
            return smallvec![Effect::Cancel(COUPON_VALIDATION)];
        }
        smallvec![Effect::None]
    }

    fn cancel(state: &mut CheckoutState) -> Effects {
        // A submitted payment may already be committed by the backend, so the
        // purchase must be allowed to report back.
        if state.phase == CheckoutPhase::Processing {
            return Self::ignored(state, "cancel");
        }

        tracing::info!(phase = state.phase.name(), "Checkout cancelled");
        metrics::record_checkout_cancelled();

        state.coupon_generation += 1;
        state.order = OrderIntent::default();
        state.coupon = CouponStatus::NoCoupon;
        state.phase = CheckoutPhase::Browsing;
        state.notice = None;
        state.last_error = None;

        smallvec![Effect::Cancel(COUPON_VALIDATION)]
    }
}

impl Default for CheckoutReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer for CheckoutReducer {
    type State = CheckoutState;
    type Action = CheckoutAction;
    type Environment = CheckoutEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ═══════════════════════════════════════════════════════════
            // Order inputs
            // ═══════════════════════════════════════════════════════════
            CheckoutAction::SelectTier(tier) => Self::select_tier(state, tier, env),

            CheckoutAction::QuantityInput(text) => {
                Self::set_quantity(state, Quantity::from_input(&text))
            },

            CheckoutAction::IncrementQuantity => {
                let quantity = state.order.quantity.increment();
                Self::set_quantity(state, quantity)
            },

            CheckoutAction::DecrementQuantity => {
                let quantity = state.order.quantity.decrement();
                Self::set_quantity(state, quantity)
            },

            CheckoutAction::SelectPaymentMethod(method) => {
                if !state.phase.accepts_edits() {
                    return Self::ignored(state, "select_payment_method");
                }
                state.order.payment_method = method;
                smallvec![Effect::None]
            },

            // ═══════════════════════════════════════════════════════════
            // Coupon
            // ═══════════════════════════════════════════════════════════
            CheckoutAction::EditCouponCode(text) => Self::edit_coupon_code(state, text),

            CheckoutAction::ApplyCoupon => Self::apply_coupon(state, env),

            CheckoutAction::CouponValidated {
                generation,
                verdict,
            } => Self::coupon_validated(state, generation, verdict, env),

            CheckoutAction::CouponValidationFailed { generation, error } => {
                Self::coupon_validation_failed(state, generation, &error, env)
            },

            // ═══════════════════════════════════════════════════════════
            // Purchase
            // ═══════════════════════════════════════════════════════════
            CheckoutAction::ProceedToCheckout => Self::proceed_to_checkout(state, env),

            CheckoutAction::SubmitPurchase => Self::submit_purchase(state, env),

            CheckoutAction::PurchaseSucceeded {
                generation,
                ticket_id,
            } => Self::purchase_succeeded(state, generation, ticket_id, env),

            CheckoutAction::PurchaseFailed { generation, error } => {
                Self::purchase_failed(state, generation, &error, env)
            },

            // ═══════════════════════════════════════════════════════════
            // Lifecycle
            // ═══════════════════════════════════════════════════════════
            CheckoutAction::SessionChanged(session) => Self::session_changed(state, session),

            CheckoutAction::Cancel => Self::cancel(state),

            CheckoutAction::DismissNotice => {
                state.notice = None;
                smallvec![Effect::None]
            },
        }
    }
}
