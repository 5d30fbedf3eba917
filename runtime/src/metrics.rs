//! Metric descriptions for the store runtime.
//!
//! The store records through the `metrics` facade; whichever recorder the
//! binary installs (Prometheus in the demo) picks them up. Call
//! [`register_metrics`] once at startup so the exporter carries help text.
//!
//! ## Counters
//! - `store.actions.total` - Actions reduced
//! - `store.effects.executed{type}` - Effects started, by variant
//! - `store.effects.cancelled` - In-flight effects aborted
//! - `store.shutdown.rejected_actions` - Actions refused after shutdown
//!
//! ## Histograms
//! - `store.reducer.duration_seconds` - Time spent inside the reducer

use metrics::{describe_counter, describe_histogram};

/// Register all store metric descriptions.
pub fn register_metrics() {
    describe_counter!("store.actions.total", "Total number of actions reduced by stores");
    describe_counter!(
        "store.effects.executed",
        "Total number of effects started, labelled by effect type"
    );
    describe_counter!(
        "store.effects.cancelled",
        "Total number of in-flight effects aborted by cancellation or teardown"
    );
    describe_counter!(
        "store.shutdown.rejected_actions",
        "Actions rejected because the store was shutting down"
    );
    describe_histogram!(
        "store.reducer.duration_seconds",
        "Time taken to run the reducer for one action"
    );
}
