//! Integration tests for the Store runtime
//!
//! Covers the action → reducer → effect → action feedback loop, cancellation
//! of in-flight effects and shutdown behaviour.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code

use checkout_core::effect::{Effect, EffectId};
use checkout_core::reducer::Reducer;
use checkout_core::{SmallVec, smallvec};
use checkout_runtime::{Store, StoreError};
use std::time::Duration;

const LOOKUP: EffectId = EffectId::new("lookup");

#[derive(Clone, Debug, Default)]
struct LookupState {
    requested: u32,
    answers: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq)]
enum LookupAction {
    /// Start a lookup that answers after `delay_ms`
    Lookup { value: u32, delay_ms: u64 },
    /// Answer fed back by the effect
    Answered { value: u32 },
    /// Abort the in-flight lookup
    Abort,
}

#[derive(Clone)]
struct LookupReducer;

impl Reducer for LookupReducer {
    type State = LookupState;
    type Action = LookupAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            LookupAction::Lookup { value, delay_ms } => {
                state.requested += 1;
                smallvec![
                    Effect::future(async move {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        Some(LookupAction::Answered { value })
                    })
                    .cancellable(LOOKUP)
                ]
            },
            LookupAction::Answered { value } => {
                state.answers.push(value);
                SmallVec::new()
            },
            LookupAction::Abort => smallvec![Effect::Cancel(LOOKUP)],
        }
    }
}

fn store() -> Store<LookupState, LookupAction, (), LookupReducer> {
    Store::new(LookupState::default(), LookupReducer, ())
}

#[tokio::test]
async fn test_future_effect_feeds_action_back() {
    let store = store();

    let answer = store
        .send_and_wait_for(
            LookupAction::Lookup { value: 7, delay_ms: 1 },
            |a| matches!(a, LookupAction::Answered { .. }),
            Duration::from_secs(2),
        )
        .await
        .unwrap();

    assert_eq!(answer, LookupAction::Answered { value: 7 });

    // The broadcast happens just before the feedback send; wait for the reducer.
    let mut handle = store.send(LookupAction::Abort).await.unwrap();
    handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(store.state(|s| s.answers.clone()).await, vec![7]);
}

#[tokio::test]
async fn test_cancel_aborts_in_flight_effect() {
    let store = store();

    let mut handle = store
        .send(LookupAction::Lookup { value: 1, delay_ms: 200 })
        .await
        .unwrap();
    assert_eq!(handle.pending(), 1);

    store.send(LookupAction::Abort).await.unwrap();
    handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let state = store.state(Clone::clone).await;
    assert_eq!(state.requested, 1);
    assert!(state.answers.is_empty());
    assert_eq!(store.pending_effects(), 0);
}

#[tokio::test]
async fn test_restarting_cancellable_replaces_previous_effect() {
    let store = store();

    store
        .send(LookupAction::Lookup { value: 1, delay_ms: 150 })
        .await
        .unwrap();
    let mut second = store
        .send(LookupAction::Lookup { value: 2, delay_ms: 10 })
        .await
        .unwrap();
    second.wait_with_timeout(Duration::from_secs(1)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(store.state(|s| s.answers.clone()).await, vec![2]);
}

#[tokio::test]
async fn test_teardown_rejects_actions_and_drops_late_responses() {
    let store = store();

    store
        .send(LookupAction::Lookup { value: 9, delay_ms: 100 })
        .await
        .unwrap();
    store.teardown().await;

    let result = store.send(LookupAction::Abort).await;
    assert!(matches!(result, Err(StoreError::ShutdownInProgress)));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(store.state(|s| s.answers.is_empty()).await);
    assert_eq!(store.pending_effects(), 0);
}

#[tokio::test]
async fn test_shutdown_waits_for_effects() {
    let store = store();

    store
        .send(LookupAction::Lookup { value: 3, delay_ms: 20 })
        .await
        .unwrap();

    store.shutdown(Duration::from_secs(2)).await.unwrap();
    assert_eq!(store.pending_effects(), 0);
}

#[tokio::test]
async fn test_shutdown_times_out_with_slow_effect() {
    let store = store();

    store
        .send(LookupAction::Lookup { value: 3, delay_ms: 500 })
        .await
        .unwrap();

    let result = store.shutdown(Duration::from_millis(30)).await;
    assert!(matches!(result, Err(StoreError::ShutdownTimeout(1))));
    store.teardown().await;
}
