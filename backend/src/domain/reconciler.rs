//! Settlement reconciliation for `processing` penalties.
//!
//! A created payment intent settles asynchronously. Reconciliation polls the
//! processor for penalties that have been `processing` longer than a grace
//! window and mirrors terminal states onto the ledger. A penalty is never
//! re-charged from here; intents stuck past the stale window are only logged.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures_util::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::domain::Error;
use crate::domain::mapping::{map_penalty_error, map_processor_error};
use crate::domain::penalty::{PaymentStatus, Penalty};
use crate::domain::ports::{
    FailedAttemptUpdate, PaymentIntentStatus, PaymentProcessor, PaymentProcessorError,
    PenaltyRepository, SettlementUpdate,
};

/// Reconciliation windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Minimum age of the last attempt before a penalty is polled.
    pub grace: TimeDelta,
    /// Age after which an unresolved intent is reported for manual review.
    pub stale_after: TimeDelta,
    /// Upper bound on one processor lookup.
    pub lookup_timeout: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            grace: TimeDelta::hours(1),
            stale_after: TimeDelta::hours(48),
            lookup_timeout: Duration::from_secs(30),
        }
    }
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub examined: usize,
    /// Marked `succeeded` and paid.
    pub settled: usize,
    pub requires_action: usize,
    /// Marked `failed` so the retry sweep can pick them up.
    pub failed: usize,
    /// Still in flight at the processor.
    pub pending: usize,
    /// Still in flight past the stale window.
    pub stale: usize,
    pub errors: usize,
}

/// What reconciliation did with one penalty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Settled,
    RequiresAction,
    Failed,
    Pending,
    Stale,
}

/// Mirrors processor-side settlement onto `processing` penalties.
pub struct PaymentReconciler {
    penalties: Arc<dyn PenaltyRepository>,
    processor: Arc<dyn PaymentProcessor>,
    config: ReconcileConfig,
    max_concurrency: usize,
    batch_limit: usize,
}

impl PaymentReconciler {
    /// Build a reconciler polling `processor` for penalties in `penalties`.
    pub fn new(
        penalties: Arc<dyn PenaltyRepository>,
        processor: Arc<dyn PaymentProcessor>,
        config: ReconcileConfig,
        max_concurrency: usize,
        batch_limit: usize,
    ) -> Self {
        Self {
            penalties,
            processor,
            config,
            max_concurrency: max_concurrency.max(1),
            batch_limit,
        }
    }

    /// Reconcile every `processing` penalty older than the grace window.
    ///
    /// # Errors
    ///
    /// Returns an error only when the batch cannot be listed.
    pub async fn reconcile(&self, now: DateTime<Utc>) -> Result<ReconcileReport, Error> {
        let batch = self
            .penalties
            .list_processing_before(self.grace_cutoff(now), self.batch_limit)
            .await
            .map_err(map_penalty_error)?;

        let results: Vec<_> = stream::iter(batch.iter())
            .map(|penalty| async move { (penalty, self.reconcile_one(penalty, now).await) })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let mut report = ReconcileReport {
            examined: batch.len(),
            ..ReconcileReport::default()
        };
        for (penalty, result) in results {
            match result {
                Ok(Resolution::Settled) => report.settled += 1,
                Ok(Resolution::RequiresAction) => report.requires_action += 1,
                Ok(Resolution::Failed) => report.failed += 1,
                Ok(Resolution::Pending) => report.pending += 1,
                Ok(Resolution::Stale) => report.stale += 1,
                Err(error) => {
                    warn!(penalty_id = %penalty.id, error = %error, "reconciliation failed");
                    report.errors += 1;
                }
            }
        }

        info!(
            examined = report.examined,
            settled = report.settled,
            failed = report.failed,
            stale = report.stale,
            errors = report.errors,
            "reconciliation finished"
        );
        Ok(report)
    }

    fn grace_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.config.grace)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    async fn reconcile_one(
        &self,
        penalty: &Penalty,
        now: DateTime<Utc>,
    ) -> Result<Resolution, Error> {
        let Some(intent_id) = penalty.payment_intent_id.as_deref() else {
            return Err(Error::internal(format!(
                "processing penalty {} has no payment intent",
                penalty.id
            )));
        };

        let intent = match tokio::time::timeout(
            self.config.lookup_timeout,
            self.processor.retrieve_payment_intent(intent_id),
        )
        .await
        {
            Ok(result) => result.map_err(map_processor_error)?,
            Err(_) => {
                return Err(map_processor_error(PaymentProcessorError::timeout(format!(
                    "payment intent {intent_id} lookup timed out"
                ))));
            }
        };

        let resolution = match intent.status {
            PaymentIntentStatus::Succeeded => {
                self.settle(penalty, PaymentStatus::Succeeded, true).await?;
                Resolution::Settled
            }
            PaymentIntentStatus::RequiresAction | PaymentIntentStatus::RequiresConfirmation => {
                self.settle(penalty, PaymentStatus::RequiresAction, false)
                    .await?;
                Resolution::RequiresAction
            }
            PaymentIntentStatus::RequiresPaymentMethod | PaymentIntentStatus::Canceled => {
                self.penalties
                    .mark_attempt_failed(&FailedAttemptUpdate {
                        penalty_id: penalty.id,
                        status: PaymentStatus::Failed,
                        attempted_at: now,
                    })
                    .await
                    .map_err(map_penalty_error)?;
                Resolution::Failed
            }
            PaymentIntentStatus::Processing
            | PaymentIntentStatus::RequiresCapture
            | PaymentIntentStatus::Other(_) => self.classify_in_flight(penalty, intent_id, now),
        };
        Ok(resolution)
    }

    async fn settle(
        &self,
        penalty: &Penalty,
        status: PaymentStatus,
        is_paid: bool,
    ) -> Result<(), Error> {
        self.penalties
            .apply_settlement(&SettlementUpdate {
                penalty_id: penalty.id,
                status,
                is_paid,
            })
            .await
            .map_err(map_penalty_error)?;
        info!(penalty_id = %penalty.id, status = %status, "payment status reconciled");
        Ok(())
    }

    fn classify_in_flight(
        &self,
        penalty: &Penalty,
        intent_id: &str,
        now: DateTime<Utc>,
    ) -> Resolution {
        let attempted_at = penalty.last_attempt_at.unwrap_or(penalty.created_at);
        if now - attempted_at >= self.config.stale_after {
            warn!(
                penalty_id = %penalty.id,
                payment_intent_id = intent_id,
                attempted_at = %attempted_at,
                "payment intent still unresolved past stale window; needs manual review"
            );
            Resolution::Stale
        } else {
            Resolution::Pending
        }
    }
}
