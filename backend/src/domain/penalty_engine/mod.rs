//! Batch entry points composing detection, recording and charging.
//!
//! Each batch processes its items concurrently up to `max_concurrency`. A
//! failure on one item is logged and counted in the report; only a failure to
//! list the batch itself is returned as an error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use mockable::Clock;
use tracing::{debug, info, warn};

use crate::domain::Error;
use crate::domain::habit::Habit;
use crate::domain::ledger::{PenaltyLedger, RecordOutcome};
use crate::domain::mapping::{map_habit_error, map_penalty_error, map_verification_error};
use crate::domain::occurrence::{MissDecision, OccurrenceDetector};
use crate::domain::payment_orchestrator::{
    ChargeOutcome, PaymentOrchestrator, PaymentOrchestratorConfig, PaymentOrchestratorPorts,
};
use crate::domain::penalty::Penalty;
use crate::domain::ports::{
    HabitRepository, MissNotifier, PaymentProcessor, PenaltyRepository, UserProfileRepository,
    VerificationRepository,
};
use crate::domain::reconciler::{PaymentReconciler, ReconcileConfig, ReconcileReport};
use crate::domain::retry_coordinator::{RetryCoordinator, RetryPolicy, SweepReport};
use crate::domain::timezone::TimezoneResolver;

mod report;

use report::HabitOutcome;
pub use report::PenaltyCheckReport;

/// Port bundle required by the engine.
pub struct PenaltyEnginePorts {
    pub habits: Arc<dyn HabitRepository>,
    pub verifications: Arc<dyn VerificationRepository>,
    pub profiles: Arc<dyn UserProfileRepository>,
    pub penalties: Arc<dyn PenaltyRepository>,
    pub processor: Arc<dyn PaymentProcessor>,
    pub notifier: Arc<dyn MissNotifier>,
}

/// Engine tuning shared by every batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PenaltyEngineConfig {
    pub orchestrator: PaymentOrchestratorConfig,
    pub retry: RetryPolicy,
    pub reconcile: ReconcileConfig,
    /// Items processed concurrently within one batch.
    pub max_concurrency: usize,
    /// Maximum rows fetched per retry or reconcile batch.
    pub batch_limit: usize,
}

impl Default for PenaltyEngineConfig {
    fn default() -> Self {
        Self {
            orchestrator: PaymentOrchestratorConfig::default(),
            retry: RetryPolicy::default(),
            reconcile: ReconcileConfig::default(),
            max_concurrency: 8,
            batch_limit: 500,
        }
    }
}

/// The penalty and auto-payment engine.
pub struct PenaltyEngine {
    habits: Arc<dyn HabitRepository>,
    detector: OccurrenceDetector,
    ledger: PenaltyLedger,
    notifier: Arc<dyn MissNotifier>,
    orchestrator: Arc<PaymentOrchestrator>,
    coordinator: RetryCoordinator,
    reconciler: PaymentReconciler,
    max_concurrency: usize,
}

impl PenaltyEngine {
    /// Wire the engine's services over `ports`.
    pub fn new(
        ports: PenaltyEnginePorts,
        clock: Arc<dyn Clock>,
        config: PenaltyEngineConfig,
    ) -> Self {
        let PenaltyEnginePorts {
            habits,
            verifications,
            profiles,
            penalties,
            processor,
            notifier,
        } = ports;
        let max_concurrency = config.max_concurrency.max(1);

        let detector =
            OccurrenceDetector::new(TimezoneResolver::new(profiles.clone()), verifications);
        let ledger = PenaltyLedger::new(penalties.clone(), clock);
        let orchestrator = Arc::new(PaymentOrchestrator::new(
            PaymentOrchestratorPorts::new(
                habits.clone(),
                profiles,
                penalties.clone(),
                processor.clone(),
            ),
            config.orchestrator,
        ));
        let coordinator = RetryCoordinator::new(
            penalties.clone(),
            orchestrator.clone(),
            config.retry,
            max_concurrency,
            config.batch_limit,
        );
        let reconciler = PaymentReconciler::new(
            penalties,
            processor,
            config.reconcile,
            max_concurrency,
            config.batch_limit,
        );

        Self {
            habits,
            detector,
            ledger,
            notifier,
            orchestrator,
            coordinator,
            reconciler,
            max_concurrency,
        }
    }

    /// Detect, record and charge yesterday's misses for every active habit.
    ///
    /// Safe to run repeatedly for the same `as_of`: a second pass finds the
    /// penalties of the first and creates nothing. A penalty an earlier pass
    /// recorded but never attempted to charge is charged on the next pass.
    ///
    /// # Errors
    ///
    /// Returns an error only when the active habits cannot be listed.
    pub async fn run_penalty_check(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<PenaltyCheckReport, Error> {
        let habits = self.habits.list_active().await.map_err(map_habit_error)?;

        let results: Vec<_> = stream::iter(habits.iter())
            .map(|habit| async move { (habit, self.check_habit(habit, as_of).await) })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let mut report = PenaltyCheckReport {
            habits_scanned: habits.len(),
            ..PenaltyCheckReport::default()
        };
        for (habit, result) in results {
            match result {
                Ok(outcome) => report.record(&outcome),
                Err(error) => {
                    warn!(habit_id = %habit.id, error = %error, "penalty check failed for habit");
                    report.record_error();
                }
            }
        }

        info!(
            as_of = %as_of,
            habits_scanned = report.habits_scanned,
            misses = report.misses,
            penalties_created = report.penalties_created,
            duplicates = report.duplicates,
            charges_attempted = report.charges.attempted(),
            errors = report.errors,
            "penalty check finished"
        );
        Ok(report)
    }

    /// Re-attempt failed charges that are due.
    pub async fn run_retry_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, Error> {
        self.coordinator.sweep(now).await
    }

    /// Mirror processor settlement onto `processing` penalties.
    pub async fn run_reconcile(&self, now: DateTime<Utc>) -> Result<ReconcileReport, Error> {
        self.reconciler.reconcile(now).await
    }

    async fn check_habit(
        &self,
        habit: &Habit,
        as_of: DateTime<Utc>,
    ) -> Result<HabitOutcome, Error> {
        let penalty_date = match self
            .detector
            .detect_miss(habit, as_of)
            .await
            .map_err(map_verification_error)?
        {
            MissDecision::NoAction(reason) => {
                debug!(habit_id = %habit.id, reason = ?reason, "no penalty due");
                return Ok(HabitOutcome::NoAction(reason));
            }
            MissDecision::Missed(date) => date,
        };

        let penalty = match self
            .ledger
            .record_miss(habit, penalty_date)
            .await
            .map_err(map_penalty_error)?
        {
            RecordOutcome::Created(penalty) => penalty,
            RecordOutcome::AlreadyExists(existing) => {
                debug!(
                    habit_id = %habit.id,
                    penalty_id = %existing.id,
                    penalty_date = %penalty_date,
                    "penalty already recorded"
                );
                if !existing.awaits_first_attempt() {
                    return Ok(HabitOutcome::AlreadyRecorded);
                }
                info!(penalty_id = %existing.id, "resuming charge for unattempted penalty");
                let charge = self.charge_logged(&existing, as_of).await;
                return Ok(HabitOutcome::Resumed { charge });
            }
        };
        info!(
            habit_id = %habit.id,
            penalty_id = %penalty.id,
            penalty_date = %penalty_date,
            amount = %penalty.amount,
            "penalty created"
        );

        let notified = match self.notifier.penalty_created(habit, &penalty).await {
            Ok(()) => true,
            Err(error) => {
                warn!(penalty_id = %penalty.id, error = %error, "miss notification failed");
                false
            }
        };

        let charge = self.charge_logged(&penalty, as_of).await;
        Ok(HabitOutcome::Created { notified, charge })
    }

    async fn charge_logged(
        &self,
        penalty: &Penalty,
        attempted_at: DateTime<Utc>,
    ) -> Option<ChargeOutcome> {
        match self.orchestrator.charge(penalty, attempted_at).await {
            Ok(outcome) => Some(outcome),
            Err(error) => {
                warn!(penalty_id = %penalty.id, error = %error, "charge could not be completed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests;
