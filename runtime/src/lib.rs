//! # Checkout Runtime
//!
//! Runtime implementation for the checkout reducer architecture.
//!
//! This crate provides the Store runtime that coordinates reducer execution
//! and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: The runtime that manages state and executes effects
//! - **Effect Executor**: Executes effect descriptions and feeds actions back to reducers
//! - **Cancellation registry**: Aborts in-flight effects by [`EffectId`]
//!
//! ## Example
//!
//! ```ignore
//! use checkout_runtime::Store;
//!
//! let store = Store::new(initial_state, CheckoutReducer::new(), environment);
//!
//! // Send an action
//! store.send(CheckoutAction::ApplyCoupon).await?;
//!
//! // Read state
//! let phase = store.state(|s| s.phase.clone()).await;
//!
//! // Abort anything still in flight when the checkout goes away
//! store.teardown().await;
//! ```

use checkout_core::effect::{Effect, EffectId};
use checkout_core::reducer::Reducer;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, broadcast, watch};
use tokio::task::AbortHandle;

/// Metric descriptions for the store runtime
pub mod metrics;

pub use error::StoreError;
pub use store::Store;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown or
        /// teardown started.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for terminal action
        ///
        /// Returned by `send_and_wait_for` when the timeout expires before
        /// a matching action is received.
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] to allow waiting for the effects started by
/// that action. Effects started by feedback actions are tracked by their own
/// handles.
///
/// # Example
///
/// ```ignore
/// let mut handle = store.send(CheckoutAction::ApplyCoupon).await?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        let (handle, _tracking) = Self::new();
        handle
    }

    /// Number of effects still running for this handle
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait for all effects to complete
    ///
    /// Aborted effects count as complete.
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires before all
    /// effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: Effect tracking context passed through effect execution
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    /// Increment the effect counter (effect started)
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement the effect counter (effect completed)
    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Counter reached zero, notify waiters
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: RAII guard that decrements effect counters on drop
///
/// Built before the task is spawned and moved into it, so the counters are
/// released even when the task is aborted before its first poll.
struct DecrementGuard {
    tracking: EffectTracking,
    pending: Arc<AtomicUsize>,
}

impl DecrementGuard {
    fn start(tracking: &EffectTracking, pending: &Arc<AtomicUsize>) -> Self {
        tracking.increment();
        pending.fetch_add(1, Ordering::SeqCst);
        Self {
            tracking: tracking.clone(),
            pending: Arc::clone(pending),
        }
    }
}

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.tracking.decrement();
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Abort handles for in-flight cancellable effects, keyed by id.
#[derive(Clone, Default)]
struct CancellationRegistry {
    handles: Arc<Mutex<HashMap<EffectId, Vec<AbortHandle>>>>,
}

impl CancellationRegistry {
    fn register(&self, id: EffectId, handle: AbortHandle) {
        if let Ok(mut handles) = self.handles.lock() {
            let entry = handles.entry(id).or_default();
            entry.retain(|h| !h.is_finished());
            entry.push(handle);
        }
    }

    /// Abort every task registered under `id`, returning how many were live.
    fn cancel(&self, id: EffectId) -> usize {
        let Ok(mut handles) = self.handles.lock() else {
            return 0;
        };
        handles.remove(&id).map_or(0, |tasks| {
            tasks
                .into_iter()
                .filter(|h| !h.is_finished())
                .inspect(AbortHandle::abort)
                .count()
        })
    }

    fn cancel_all(&self) -> usize {
        let Ok(mut handles) = self.handles.lock() else {
            return 0;
        };
        handles
            .drain()
            .flat_map(|(_, tasks)| tasks)
            .filter(|h| !h.is_finished())
            .inspect(AbortHandle::abort)
            .count()
    }
}

/// Store module - The runtime for reducers
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicUsize, CancellationRegistry, DecrementGuard, Duration, Effect,
        EffectHandle, EffectId, EffectTracking, Ordering, Reducer, RwLock, StoreError, broadcast,
        watch,
    };

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop and cancellation)
    ///
    /// One store owns one checkout; stores never share state.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: Arc<R>,
        environment: Arc<E>,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        cancellations: CancellationRegistry,
        /// Every action produced by an effect is broadcast here before it is
        /// fed back, so callers can wait for a terminal action.
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_broadcast_capacity(initial_state, reducer, environment, 16)
        }

        /// Create a new store with a custom action broadcast capacity
        #[must_use]
        pub fn with_broadcast_capacity(
            initial_state: S,
            reducer: R,
            environment: E,
            capacity: usize,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(capacity.max(1));

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer: Arc::new(reducer),
                environment: Arc::new(environment),
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                cancellations: CancellationRegistry::default(),
                action_broadcast,
            }
        }

        /// Number of effects currently running across all handles
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.load(Ordering::Acquire)
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Starts the returned effects asynchronously
        ///
        /// `send()` returns after starting effect execution, not completion.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            metrics::counter!("store.actions.total").increment(1);

            let (handle, tracking) = EffectHandle::new();

            let effects = {
                let mut state = self.state.write().await;
                let start = std::time::Instant::now();
                let effects = self.reducer.reduce(&mut state, action, &self.environment);
                metrics::histogram!("store.reducer.duration_seconds")
                    .record(start.elapsed().as_secs_f64());
                effects
            };

            tracing::trace!("Reducer returned {} effects", effects.len());
            for effect in effects {
                self.execute_effect(effect, &tracking, None);
            }

            Ok(handle)
        }

        /// Send an action and wait for a matching result action
        ///
        /// Subscribes to the action broadcast BEFORE sending, then waits for
        /// the first effect-produced action matching `predicate`.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: no matching action before `timeout`
        /// - [`StoreError::ChannelClosed`]: broadcast channel closed
        /// - [`StoreError::ShutdownInProgress`]: store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            let mut rx = self.action_broadcast.subscribe();

            self.send(action).await?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to every action produced by effects
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let total = store.state(|s| s.quote()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&state)
        }

        /// Abort every cancellable effect registered under `id`
        ///
        /// Returns the number of tasks that were still running.
        pub fn cancel(&self, id: EffectId) -> usize {
            let aborted = self.cancellations.cancel(id);
            if aborted > 0 {
                tracing::debug!(effect_id = %id, aborted, "Cancelled in-flight effects");
                metrics::counter!("store.effects.cancelled").increment(aborted as u64);
            }
            aborted
        }

        /// Stop accepting actions and abort every cancellable effect
        ///
        /// This is what a checkout does when its owner goes away: responses
        /// that would arrive later are never fed back.
        pub async fn teardown(&self) {
            self.shutdown.store(true, Ordering::Release);
            let aborted = self.cancellations.cancel_all();
            tracing::info!(aborted, "Store torn down");
            metrics::counter!("store.effects.cancelled").increment(aborted as u64);
            // Let aborted tasks unwind so their guards release the counters.
            tokio::task::yield_now().await;
        }

        /// Gracefully shut down: reject new actions and wait for effects
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if effects are still running
        /// when `timeout` elapses.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            self.shutdown.store(true, Ordering::Release);

            let start = std::time::Instant::now();
            let poll_interval = Duration::from_millis(10);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);
                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    return Ok(());
                }
                if start.elapsed() >= timeout {
                    tracing::error!(pending_effects = pending, "Shutdown timeout");
                    return Err(StoreError::ShutdownTimeout(pending));
                }
                tokio::time::sleep(poll_interval).await;
            }
        }

        fn feed_back(&self, action: A) -> impl std::future::Future<Output = ()> + Send + 'static {
            let store = self.clone();
            async move {
                let _ = store.action_broadcast.send(action.clone());
                if let Err(error) = store.send(action).await {
                    tracing::debug!(%error, "Dropped feedback action");
                }
            }
        }

        fn spawn<F>(&self, task: F, cancel_id: Option<EffectId>)
        where
            F: std::future::Future<Output = ()> + Send + 'static,
        {
            let handle = tokio::spawn(task);
            if let Some(id) = cancel_id {
                self.cancellations.register(id, handle.abort_handle());
            }
        }

        /// Execute an effect with tracking
        ///
        /// - `None`: No-op
        /// - `Future`: Executes async computation, sends resulting action if `Some`
        /// - `Delay`: Waits for duration, then sends action
        /// - `Parallel`: Executes effects concurrently
        /// - `Sequential`: Executes effects in order, waiting for each to complete
        /// - `Cancellable`: Cancels the previous holder of the id, then runs the
        ///   inner effect with its tasks registered under the id
        /// - `Cancel`: Aborts tasks registered under the id
        fn execute_effect(
            &self,
            effect: Effect<A>,
            tracking: &EffectTracking,
            cancel_id: Option<EffectId>,
        ) {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Future(fut) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    let guard = DecrementGuard::start(tracking, &self.pending_effects);
                    let store = self.clone();

                    self.spawn(
                        async move {
                            let _guard = guard;
                            if let Some(action) = fut.await {
                                store.feed_back(action).await;
                            }
                        },
                        cancel_id,
                    );
                },
                Effect::Delay { duration, action } => {
                    metrics::counter!("store.effects.executed", "type" => "delay").increment(1);
                    let guard = DecrementGuard::start(tracking, &self.pending_effects);
                    let store = self.clone();

                    self.spawn(
                        async move {
                            let _guard = guard;
                            tokio::time::sleep(duration).await;
                            store.feed_back(*action).await;
                        },
                        cancel_id,
                    );
                },
                Effect::Parallel(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);
                    for effect in effects {
                        self.execute_effect(effect, tracking, cancel_id);
                    }
                },
                Effect::Sequential(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "sequential")
                        .increment(1);
                    let guard = DecrementGuard::start(tracking, &self.pending_effects);
                    let store = self.clone();

                    self.spawn(
                        async move {
                            let _guard = guard;
                            for effect in effects {
                                let (step_tx, mut step_rx) = watch::channel(());
                                let step = EffectTracking {
                                    counter: Arc::new(AtomicUsize::new(0)),
                                    notifier: Arc::new(step_tx),
                                };
                                store.execute_effect(effect, &step, cancel_id);
                                while step.counter.load(Ordering::SeqCst) > 0 {
                                    if step_rx.changed().await.is_err() {
                                        break;
                                    }
                                }
                            }
                        },
                        cancel_id,
                    );
                },
                Effect::Cancellable { id, effect } => {
                    self.cancel(id);
                    self.execute_effect(*effect, tracking, Some(id));
                },
                Effect::Cancel(id) => {
                    self.cancel(id);
                },
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: Arc::clone(&self.reducer),
                environment: Arc::clone(&self.environment),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                cancellations: self.cancellations.clone(),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }
}
