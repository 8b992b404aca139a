//! Test utilities for the penalty engine crate.
//!
//! This module provides shared helpers for both unit tests (in `src/`) and
//! integration tests (in `tests/`). It is only compiled for tests or with the
//! `test-support` feature.

pub mod clock;
pub mod memory_store;
pub mod payments;

use std::sync::Arc;

use mockable::Clock;

use crate::domain::{PenaltyEngine, PenaltyEngineConfig, PenaltyEnginePorts};

pub use clock::MutableClock;
pub use memory_store::InMemoryStore;
pub use payments::{RecordingNotifier, ScriptedPaymentProcessor};

/// Build an engine whose every port is backed by the given doubles.
pub fn engine_over(
    store: &Arc<InMemoryStore>,
    processor: &Arc<ScriptedPaymentProcessor>,
    notifier: &Arc<RecordingNotifier>,
    clock: Arc<dyn Clock>,
    config: PenaltyEngineConfig,
) -> PenaltyEngine {
    PenaltyEngine::new(
        PenaltyEnginePorts {
            habits: store.clone(),
            verifications: store.clone(),
            profiles: store.clone(),
            penalties: store.clone(),
            processor: processor.clone(),
            notifier: notifier.clone(),
        },
        clock,
        config,
    )
}
