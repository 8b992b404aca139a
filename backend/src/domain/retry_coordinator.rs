//! Fixed-interval retries for failed charges.
//!
//! A failed penalty is re-charged at most once per interval until it has
//! failed `max_retries` times. Exhausted penalties stay `failed` and are not
//! selected again; there is no backoff growth.
//!
//! The sweep also picks up penalties that were recorded but never charged,
//! once they are one interval old, so a run interrupted between recording and
//! charging is eventually collected.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::domain::Error;
use crate::domain::mapping::map_penalty_error;
use crate::domain::payment_orchestrator::{ChargeTally, PaymentOrchestrator};
use crate::domain::penalty::{PaymentStatus, Penalty};
use crate::domain::ports::{PenaltyRepository, RetryCandidateQuery};

/// Retry cadence and cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failed attempts after which a penalty is no longer retried.
    pub max_retries: u32,
    /// Minimum time between two attempts on one penalty.
    pub interval: TimeDelta,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            interval: TimeDelta::days(1),
        }
    }
}

impl RetryPolicy {
    /// Whether `penalty` may be re-charged at `now`.
    ///
    /// # Examples
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use penalty_engine::domain::RetryPolicy;
    ///
    /// let policy = RetryPolicy::default();
    /// let last = Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap();
    /// let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
    /// assert!(!policy.interval_elapsed(Some(last), now));
    /// assert!(policy.interval_elapsed(None, now));
    /// ```
    pub fn interval_elapsed(&self, last_retry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        last_retry.is_none_or(|last| now - last >= self.interval)
    }

    /// Whether `penalty` may be charged by the sweep at `now`.
    ///
    /// Failed charges qualify within their retry budget once the interval has
    /// passed since the last failure. Never-attempted penalties qualify once
    /// the interval has passed since they were recorded.
    pub fn is_eligible(&self, penalty: &Penalty, now: DateTime<Utc>) -> bool {
        if penalty.is_paid || penalty.retry_count >= self.max_retries {
            return false;
        }
        match penalty.payment_status {
            PaymentStatus::Failed => self.interval_elapsed(penalty.last_retry_date, now),
            PaymentStatus::None => {
                penalty.awaits_first_attempt()
                    && self.interval_elapsed(Some(penalty.created_at), now)
            }
            _ => false,
        }
    }

    /// Latest instant a penalty may have been touched and still be due at
    /// `now`. Clamps to the earliest representable instant on overflow.
    pub fn due_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.interval)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Summary of one retry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Candidates returned by the store.
    pub selected: usize,
    /// Charge attempts made.
    pub retried: usize,
    /// Candidates dropped by the in-process eligibility re-check.
    pub ineligible: usize,
    pub charges: ChargeTally,
    /// Candidates whose charge could not be run or recorded.
    pub errors: usize,
}

/// Re-attempts failed charges.
pub struct RetryCoordinator {
    penalties: Arc<dyn PenaltyRepository>,
    orchestrator: Arc<PaymentOrchestrator>,
    policy: RetryPolicy,
    max_concurrency: usize,
    batch_limit: usize,
}

impl RetryCoordinator {
    /// Build a coordinator that charges through `orchestrator`.
    ///
    /// `max_concurrency` is raised to at least one.
    pub fn new(
        penalties: Arc<dyn PenaltyRepository>,
        orchestrator: Arc<PaymentOrchestrator>,
        policy: RetryPolicy,
        max_concurrency: usize,
        batch_limit: usize,
    ) -> Self {
        Self {
            penalties,
            orchestrator,
            policy,
            max_concurrency: max_concurrency.max(1),
            batch_limit,
        }
    }

    /// Retry every eligible penalty as of `now`.
    ///
    /// Attempts are stamped with `now`, the instant eligibility was judged.
    ///
    /// # Errors
    ///
    /// Returns an error only when the candidate list cannot be read; failures
    /// on individual penalties are logged and counted.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, Error> {
        let query = RetryCandidateQuery {
            max_retries: self.policy.max_retries,
            due_at_or_before: self.policy.due_cutoff(now),
            limit: self.batch_limit,
        };
        let candidates = self
            .penalties
            .list_retry_candidates(&query)
            .await
            .map_err(map_penalty_error)?;

        let mut report = SweepReport {
            selected: candidates.len(),
            ..SweepReport::default()
        };
        let eligible: Vec<&Penalty> = candidates
            .iter()
            .filter(|penalty| {
                let eligible = self.policy.is_eligible(penalty, now);
                if !eligible {
                    debug!(penalty_id = %penalty.id, "retry candidate no longer eligible");
                }
                eligible
            })
            .collect();
        report.ineligible = candidates.len() - eligible.len();

        let results: Vec<_> = stream::iter(eligible)
            .map(|penalty| async move { (penalty, self.orchestrator.charge(penalty, now).await) })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        for (penalty, result) in results {
            match result {
                Ok(outcome) => report.charges.record(&outcome),
                Err(error) => {
                    warn!(penalty_id = %penalty.id, error = %error, "retry failed");
                    report.errors += 1;
                }
            }
        }
        report.retried = report.charges.attempted();

        info!(
            selected = report.selected,
            retried = report.retried,
            ineligible = report.ineligible,
            errors = report.errors,
            "retry sweep finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    //! Interval and cap behaviour for the retry sweep.

    use super::*;
    use crate::domain::payment_orchestrator::{
        PaymentOrchestratorConfig, PaymentOrchestratorPorts,
    };
    use crate::domain::ports::{
        FixtureUserProfileRepository, MockHabitRepository, MockPaymentProcessor,
        MockPenaltyRepository, MockUserProfileRepository, PaymentIntent, PaymentIntentStatus,
    };
    use crate::domain::{
        Habit, HabitId, NewPenalty, PenaltyAmount, PenaltyId, RequiredWeekdays, UserId,
        UserPaymentProfile,
    };
    use chrono::{NaiveDate, TimeZone};
    use rstest::rstest;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0)
            .single()
            .expect("valid time")
    }

    fn failed_penalty(
        habit: &Habit,
        retry_count: u32,
        last_retry: Option<DateTime<Utc>>,
    ) -> Penalty {
        let mut penalty = NewPenalty {
            id: PenaltyId::random(),
            habit_id: habit.id,
            user_id: habit.user_id,
            amount: habit.penalty_amount,
            penalty_date: NaiveDate::from_ymd_opt(2024, 6, 3).expect("valid date"),
            created_at: at(4, 0),
        }
        .into_penalty();
        penalty.payment_status = PaymentStatus::Failed;
        penalty.retry_count = retry_count;
        penalty.last_retry_date = last_retry;
        penalty
    }

    fn habit() -> Habit {
        Habit {
            id: HabitId::random(),
            user_id: UserId::random(),
            weekdays: RequiredWeekdays::try_from_indices([0_i64]).expect("valid weekdays"),
            penalty_amount: PenaltyAmount::from_minor_units(500).expect("positive"),
            created_at: at(1, 0),
            is_active: true,
            auto_pay_enabled: true,
        }
    }

    #[rstest]
    #[case::same_day(Some(at(10, 0)), at(10, 12), false)]
    #[case::exactly_one_day(Some(at(10, 0)), at(11, 0), true)]
    #[case::next_day(Some(at(10, 0)), at(11, 1), true)]
    #[case::never_retried(None, at(10, 12), true)]
    fn interval_is_fixed_at_one_day(
        #[case] last_retry: Option<DateTime<Utc>>,
        #[case] now: DateTime<Utc>,
        #[case] expected: bool,
    ) {
        assert_eq!(RetryPolicy::default().interval_elapsed(last_retry, now), expected);
    }

    #[rstest]
    #[case::below_cap(2, PaymentStatus::Failed, true)]
    #[case::at_cap(3, PaymentStatus::Failed, false)]
    #[case::requires_action(1, PaymentStatus::RequiresAction, false)]
    #[case::processing(0, PaymentStatus::Processing, false)]
    #[case::never_attempted(0, PaymentStatus::None, true)]
    fn only_failed_penalties_within_budget_are_eligible(
        #[case] retry_count: u32,
        #[case] status: PaymentStatus,
        #[case] expected: bool,
    ) {
        let mut penalty = failed_penalty(&habit(), retry_count, None);
        penalty.payment_status = status;
        assert_eq!(RetryPolicy::default().is_eligible(&penalty, at(10, 0)), expected);
    }

    fn orchestrator(
        processor: MockPaymentProcessor,
        penalties: Arc<MockPenaltyRepository>,
        habit: &Habit,
    ) -> Arc<PaymentOrchestrator> {
        let stored = habit.clone();
        let mut habits = MockHabitRepository::new();
        habits
            .expect_find()
            .returning(move |_| Ok(Some(stored.clone())));
        let mut profiles = MockUserProfileRepository::new();
        profiles.expect_find_profile().returning(|_| {
            Ok(Some(UserPaymentProfile {
                default_payment_method_id: Some("pm_card".to_owned()),
                ..UserPaymentProfile::default()
            }))
        });
        Arc::new(PaymentOrchestrator::new(
            PaymentOrchestratorPorts::new(
                Arc::new(habits),
                Arc::new(profiles),
                penalties,
                Arc::new(processor),
            ),
            PaymentOrchestratorConfig::default(),
        ))
    }

    #[tokio::test]
    async fn sweep_retries_due_penalties_and_rechecks_ineligible_rows() {
        let habit = habit();
        let due = failed_penalty(&habit, 1, Some(at(10, 0)));
        let not_due = failed_penalty(&habit, 1, Some(at(11, 0)));
        let exhausted = failed_penalty(&habit, 3, Some(at(1, 0)));
        let due_id = due.id;
        let rows = vec![due, not_due, exhausted];

        let mut penalties = MockPenaltyRepository::new();
        penalties
            .expect_list_retry_candidates()
            .times(1)
            .withf(|query| query.max_retries == 3 && query.due_at_or_before == at(10, 1))
            .return_once(move |_| Ok(rows));
        penalties
            .expect_mark_processing()
            .times(1)
            .withf(move |update| update.penalty_id == due_id && update.attempted_at == at(11, 1))
            .returning(|_| Ok(()));
        let penalties = Arc::new(penalties);

        let mut processor = MockPaymentProcessor::new();
        processor
            .expect_create_payment_intent()
            .times(1)
            .withf(move |request| {
                request.idempotency_key == format!("penalty-{due_id}-attempt-1")
            })
            .returning(|_| {
                Ok(PaymentIntent {
                    id: "pi_retry".to_owned(),
                    status: PaymentIntentStatus::Processing,
                })
            });

        let coordinator = RetryCoordinator::new(
            penalties.clone(),
            orchestrator(processor, penalties, &habit),
            RetryPolicy::default(),
            4,
            100,
        );

        let report = coordinator.sweep(at(11, 1)).await.expect("sweep runs");

        assert_eq!(report.selected, 3);
        assert_eq!(report.ineligible, 2);
        assert_eq!(report.retried, 1);
        assert_eq!(report.charges.processing, 1);
        assert_eq!(report.errors, 0);
    }

    #[tokio::test]
    async fn listing_failure_aborts_the_sweep() {
        let mut penalties = MockPenaltyRepository::new();
        penalties
            .expect_list_retry_candidates()
            .returning(|_| Err(crate::domain::ports::PenaltyRepositoryError::connection("down")));
        let penalties = Arc::new(penalties);
        let orchestrator = Arc::new(PaymentOrchestrator::new(
            PaymentOrchestratorPorts::new(
                Arc::new(MockHabitRepository::new()),
                Arc::new(FixtureUserProfileRepository),
                penalties.clone(),
                Arc::new(MockPaymentProcessor::new()),
            ),
            PaymentOrchestratorConfig::default(),
        ));
        let coordinator =
            RetryCoordinator::new(penalties, orchestrator, RetryPolicy::default(), 1, 10);

        let error = coordinator.sweep(at(11, 1)).await.expect_err("sweep fails");

        assert_eq!(error.code(), crate::domain::ErrorCode::ServiceUnavailable);
    }

    #[rstest]
    #[case::recent_recording(at(10, 12), false)]
    #[case::one_interval_old(at(11, 0), true)]
    fn never_attempted_penalties_wait_one_interval(
        #[case] now: DateTime<Utc>,
        #[case] expected: bool,
    ) {
        let mut penalty = failed_penalty(&habit(), 0, None);
        penalty.payment_status = PaymentStatus::None;
        penalty.created_at = at(10, 0);

        assert_eq!(RetryPolicy::default().is_eligible(&penalty, now), expected);

        penalty.last_attempt_at = Some(at(10, 1));
        assert!(!RetryPolicy::default().is_eligible(&penalty, at(12, 0)));
    }

    #[rstest]
    fn absurd_interval_clamps_the_cutoff() {
        let policy = RetryPolicy {
            interval: TimeDelta::MAX,
            ..RetryPolicy::default()
        };

        assert_eq!(policy.due_cutoff(at(11, 1)), DateTime::<Utc>::MIN_UTC);
        assert!(!policy.is_eligible(&failed_penalty(&habit(), 0, Some(at(10, 0))), at(11, 1)));
    }
}
