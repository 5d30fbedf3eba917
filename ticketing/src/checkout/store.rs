//! Store wiring for the checkout flow.

use crate::checkout::{CheckoutAction, CheckoutEnvironment, CheckoutReducer, CheckoutState};
use crate::session::Session;
use crate::types::Event;
use checkout_runtime::Store;

/// Store running one checkout
pub type CheckoutStore = Store<CheckoutState, CheckoutAction, CheckoutEnvironment, CheckoutReducer>;

/// Opens a checkout for `event`
///
/// `session` is the purchaser signed in when the page opened; later sign-ins
/// arrive as [`CheckoutAction::SessionChanged`].
#[must_use]
pub fn checkout_store(
    event: Event,
    session: Option<Session>,
    environment: CheckoutEnvironment,
) -> CheckoutStore {
    Store::new(
        CheckoutState::new(event, session),
        CheckoutReducer::new(),
        environment,
    )
}
