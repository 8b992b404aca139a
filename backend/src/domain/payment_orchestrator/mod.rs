//! Payment orchestration for a single penalty.
//!
//! The orchestrator re-checks auto-pay preconditions, creates an off-session
//! payment intent through the processor port, and persists the attempt
//! outcome. Processor failures never escape as errors: every attempt ends in
//! `processing`, `requires_action` or `failed` on the stored penalty.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::domain::Error;
use crate::domain::mapping::{map_habit_error, map_penalty_error, map_profile_error};
use crate::domain::penalty::{PaymentStatus, Penalty};
use crate::domain::ports::{
    FailedAttemptUpdate, HabitRepository, PaymentProcessor, PaymentProcessorError,
    PenaltyRepository, ProcessingUpdate, UserProfileRepository,
};

mod classification;

use classification::{ChargeTarget, build_request, classify_failure};

/// Orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOrchestratorConfig {
    /// ISO currency code sent with every intent.
    pub currency: String,
    /// Upper bound on one processor call, independent of the HTTP client's own
    /// timeout.
    pub charge_timeout: Duration,
}

impl Default for PaymentOrchestratorConfig {
    fn default() -> Self {
        Self {
            currency: "usd".to_owned(),
            charge_timeout: Duration::from_secs(30),
        }
    }
}

/// Port bundle required by the orchestrator.
pub struct PaymentOrchestratorPorts {
    pub habits: Arc<dyn HabitRepository>,
    pub profiles: Arc<dyn UserProfileRepository>,
    pub penalties: Arc<dyn PenaltyRepository>,
    pub processor: Arc<dyn PaymentProcessor>,
}

impl PaymentOrchestratorPorts {
    /// Build a strongly-typed orchestrator port bundle.
    pub fn new(
        habits: Arc<dyn HabitRepository>,
        profiles: Arc<dyn UserProfileRepository>,
        penalties: Arc<dyn PenaltyRepository>,
        processor: Arc<dyn PaymentProcessor>,
    ) -> Self {
        Self {
            habits,
            profiles,
            penalties,
            processor,
        }
    }
}

/// Why a charge was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A payment intent is already awaiting a terminal status.
    AlreadyProcessing,
    /// The penalty is already paid.
    AlreadySettled,
    /// The penalised habit no longer exists.
    HabitNotFound,
    /// The habit was deactivated.
    HabitInactive,
    /// The owner disabled auto-pay for the habit.
    AutoPayDisabled,
    /// The owner has no default payment method on file.
    NoPaymentMethod,
}

impl SkipReason {
    /// Stable label for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyProcessing => "already_processing",
            Self::AlreadySettled => "already_settled",
            Self::HabitNotFound => "habit_not_found",
            Self::HabitInactive => "habit_inactive",
            Self::AutoPayDisabled => "auto_pay_disabled",
            Self::NoPaymentMethod => "no_payment_method",
        }
    }
}

/// Result of one charge request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    /// No processor call was made.
    Skipped(SkipReason),
    /// A payment intent was created; settlement arrives later.
    Processing { payment_intent_id: String },
    /// The issuer requires customer authentication.
    RequiresAction,
    /// The attempt failed and may be retried.
    Failed,
}

/// Per-outcome counts over a batch of charge requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChargeTally {
    pub processing: usize,
    pub requires_action: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ChargeTally {
    /// Count one outcome.
    pub fn record(&mut self, outcome: &ChargeOutcome) {
        match outcome {
            ChargeOutcome::Skipped(_) => self.skipped += 1,
            ChargeOutcome::Processing { .. } => self.processing += 1,
            ChargeOutcome::RequiresAction => self.requires_action += 1,
            ChargeOutcome::Failed => self.failed += 1,
        }
    }

    /// Charge attempts that reached the processor.
    pub const fn attempted(&self) -> usize {
        self.processing + self.requires_action + self.failed
    }
}

/// Drives payment-intent creation for penalties.
pub struct PaymentOrchestrator {
    habits: Arc<dyn HabitRepository>,
    profiles: Arc<dyn UserProfileRepository>,
    penalties: Arc<dyn PenaltyRepository>,
    processor: Arc<dyn PaymentProcessor>,
    config: PaymentOrchestratorConfig,
}

impl PaymentOrchestrator {
    /// Build an orchestrator over `ports`.
    pub fn new(ports: PaymentOrchestratorPorts, config: PaymentOrchestratorConfig) -> Self {
        Self {
            habits: ports.habits,
            profiles: ports.profiles,
            penalties: ports.penalties,
            processor: ports.processor,
            config,
        }
    }

    /// Attempt to charge `penalty` against its owner's default payment method.
    ///
    /// The outcome is stamped with `attempted_at`, the instant the calling
    /// batch judged the penalty due.
    ///
    /// # Errors
    ///
    /// Returns an error only when a store read or the outcome write fails.
    /// Processor failures are persisted and reported through
    /// [`ChargeOutcome`].
    pub async fn charge(
        &self,
        penalty: &Penalty,
        attempted_at: DateTime<Utc>,
    ) -> Result<ChargeOutcome, Error> {
        if let Some(reason) = reentrancy_guard(penalty) {
            return Ok(skip(penalty, reason));
        }

        let target = match self.resolve_target(penalty).await? {
            Ok(target) => target,
            Err(reason) => return Ok(skip(penalty, reason)),
        };

        let request = build_request(penalty, &target, &self.config.currency);
        let result = match tokio::time::timeout(
            self.config.charge_timeout,
            self.processor.create_payment_intent(&request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PaymentProcessorError::timeout(format!(
                "no response within {}ms",
                self.config.charge_timeout.as_millis()
            ))),
        };

        match result {
            Ok(intent) => {
                self.penalties
                    .mark_processing(&ProcessingUpdate {
                        penalty_id: penalty.id,
                        payment_intent_id: intent.id.clone(),
                        payment_method_id: target.payment_method_id,
                        attempted_at,
                    })
                    .await
                    .map_err(map_penalty_error)?;
                info!(
                    penalty_id = %penalty.id,
                    payment_intent_id = %intent.id,
                    "payment intent created"
                );
                Ok(ChargeOutcome::Processing {
                    payment_intent_id: intent.id,
                })
            }
            Err(error) => {
                let status = classify_failure(&error);
                warn!(
                    penalty_id = %penalty.id,
                    retry_count = penalty.retry_count,
                    status = %status,
                    error = %error,
                    "payment attempt failed"
                );
                self.penalties
                    .mark_attempt_failed(&FailedAttemptUpdate {
                        penalty_id: penalty.id,
                        status,
                        attempted_at,
                    })
                    .await
                    .map_err(map_penalty_error)?;
                Ok(match status {
                    PaymentStatus::RequiresAction => ChargeOutcome::RequiresAction,
                    _ => ChargeOutcome::Failed,
                })
            }
        }
    }

    async fn resolve_target(
        &self,
        penalty: &Penalty,
    ) -> Result<Result<ChargeTarget, SkipReason>, Error> {
        let Some(habit) = self
            .habits
            .find(&penalty.habit_id)
            .await
            .map_err(map_habit_error)?
        else {
            return Ok(Err(SkipReason::HabitNotFound));
        };
        if !habit.is_active {
            return Ok(Err(SkipReason::HabitInactive));
        }
        if !habit.auto_pay_enabled {
            return Ok(Err(SkipReason::AutoPayDisabled));
        }

        let profile = self
            .profiles
            .find_profile(&penalty.user_id)
            .await
            .map_err(map_profile_error)?;
        let target = profile.and_then(|profile| {
            let payment_method_id = profile.payment_method()?.to_owned();
            Some(ChargeTarget {
                payment_method_id,
                customer_id: profile.customer_id.filter(|id| !id.trim().is_empty()),
            })
        });
        Ok(target.ok_or(SkipReason::NoPaymentMethod))
    }
}

fn skip(penalty: &Penalty, reason: SkipReason) -> ChargeOutcome {
    info!(
        penalty_id = %penalty.id,
        reason = reason.as_str(),
        "charge skipped"
    );
    ChargeOutcome::Skipped(reason)
}

fn reentrancy_guard(penalty: &Penalty) -> Option<SkipReason> {
    if penalty.is_paid || penalty.payment_status == PaymentStatus::Succeeded {
        Some(SkipReason::AlreadySettled)
    } else if penalty.payment_status == PaymentStatus::Processing {
        Some(SkipReason::AlreadyProcessing)
    } else {
        None
    }
}

#[cfg(test)]
mod tests;
