//! Domain primitives, services and ports.
//!
//! Purpose: Define the strongly typed penalty domain and the services that
//! detect misses, record penalties and drive payments. Services depend only on
//! the port traits in [`ports`]; adapters live in `crate::outbound`.
//!
//! Public surface:
//! - Error (alias to `error::Error`) and ErrorCode for service failures.
//! - Habit, Penalty and their identifiers and value types.
//! - TimezoneResolver, OccurrenceDetector, PenaltyLedger,
//!   PaymentOrchestrator, RetryCoordinator, PaymentReconciler.
//! - PenaltyEngine, composing the above into batch entry points.

pub mod error;
pub mod habit;
pub mod ledger;
pub(crate) mod mapping;
pub mod occurrence;
pub mod payment_orchestrator;
pub mod penalty;
pub mod penalty_engine;
pub mod ports;
pub mod reconciler;
pub mod retry_coordinator;
pub mod timezone;

pub use self::error::{Error, ErrorCode};
pub use self::habit::{
    Habit, HabitId, HabitValidationError, PenaltyAmount, RequiredWeekdays, UserId,
    UserPaymentProfile,
};
pub use self::ledger::{PenaltyLedger, RecordOutcome};
pub use self::occurrence::{MissDecision, NoActionReason, OccurrenceDetector};
pub use self::payment_orchestrator::{
    ChargeOutcome, ChargeTally, PaymentOrchestrator, PaymentOrchestratorConfig,
    PaymentOrchestratorPorts, SkipReason,
};
pub use self::penalty::{
    NewPenalty, ParsePaymentStatusError, PaymentStatus, Penalty, PenaltyId,
};
pub use self::penalty_engine::{
    PenaltyCheckReport, PenaltyEngine, PenaltyEngineConfig, PenaltyEnginePorts,
};
pub use self::reconciler::{PaymentReconciler, ReconcileConfig, ReconcileReport};
pub use self::retry_coordinator::{RetryCoordinator, RetryPolicy, SweepReport};
pub use self::timezone::{TimezoneResolutionFailure, TimezoneResolver, parse_timezone};
