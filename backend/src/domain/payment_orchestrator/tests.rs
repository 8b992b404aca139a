//! Tests for precondition checks, attempt persistence and failure handling.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rstest::{fixture, rstest};

use super::*;
use crate::domain::ports::{
    MockHabitRepository, MockPaymentProcessor, MockPenaltyRepository, MockUserProfileRepository,
    PaymentIntent, PaymentIntentRequest, PaymentIntentStatus,
};
use crate::domain::{
    ErrorCode, Habit, HabitId, NewPenalty, PenaltyAmount, PenaltyId, RequiredWeekdays, UserId,
    UserPaymentProfile,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 11, 0, 5, 0)
        .single()
        .expect("valid time")
}

#[fixture]
fn habit() -> Habit {
    Habit {
        id: HabitId::random(),
        user_id: UserId::random(),
        weekdays: RequiredWeekdays::try_from_indices([0_i64]).expect("valid weekdays"),
        penalty_amount: PenaltyAmount::from_minor_units(500).expect("positive"),
        created_at: Utc
            .with_ymd_and_hms(2024, 6, 1, 0, 0, 0)
            .single()
            .expect("valid time"),
        is_active: true,
        auto_pay_enabled: true,
    }
}

fn penalty_for(habit: &Habit) -> Penalty {
    NewPenalty {
        id: PenaltyId::random(),
        habit_id: habit.id,
        user_id: habit.user_id,
        amount: habit.penalty_amount,
        penalty_date: NaiveDate::from_ymd_opt(2024, 6, 10).expect("valid date"),
        created_at: now(),
    }
    .into_penalty()
}

fn profile(payment_method: Option<&str>) -> UserPaymentProfile {
    UserPaymentProfile {
        timezone: Some("UTC".to_owned()),
        default_payment_method_id: payment_method.map(str::to_owned),
        customer_id: Some("cus_42".to_owned()),
    }
}

struct Harness {
    habits: MockHabitRepository,
    profiles: MockUserProfileRepository,
    penalties: MockPenaltyRepository,
    processor: MockPaymentProcessor,
}

impl Harness {
    fn with_habit_and_profile(habit: &Habit, profile: Option<UserPaymentProfile>) -> Self {
        let stored_habit = habit.clone();
        let mut habits = MockHabitRepository::new();
        habits
            .expect_find()
            .returning(move |_| Ok(Some(stored_habit.clone())));
        let mut profiles = MockUserProfileRepository::new();
        profiles
            .expect_find_profile()
            .returning(move |_| Ok(profile.clone()));
        Self {
            habits,
            profiles,
            penalties: MockPenaltyRepository::new(),
            processor: MockPaymentProcessor::new(),
        }
    }

    fn build(self) -> PaymentOrchestrator {
        self.build_with(PaymentOrchestratorConfig::default())
    }

    fn build_with(self, config: PaymentOrchestratorConfig) -> PaymentOrchestrator {
        PaymentOrchestrator::new(
            PaymentOrchestratorPorts::new(
                Arc::new(self.habits),
                Arc::new(self.profiles),
                Arc::new(self.penalties),
                Arc::new(self.processor),
            ),
            config,
        )
    }
}

#[rstest]
#[tokio::test]
async fn successful_intent_moves_penalty_to_processing(habit: Habit) {
    let penalty = penalty_for(&habit);
    let penalty_id = penalty.id;
    let mut harness = Harness::with_habit_and_profile(&habit, Some(profile(Some("pm_card"))));
    harness
        .processor
        .expect_create_payment_intent()
        .times(1)
        .withf(move |request: &PaymentIntentRequest| {
            request.amount_minor_units == 500
                && request.currency == "usd"
                && request.off_session
                && request.confirm
                && request.payment_method_id.as_deref() == Some("pm_card")
                && request.customer_id.as_deref() == Some("cus_42")
                && request.idempotency_key == format!("penalty-{penalty_id}-attempt-0")
        })
        .returning(|_| {
            Ok(PaymentIntent {
                id: "pi_1".to_owned(),
                status: PaymentIntentStatus::Processing,
            })
        });
    harness
        .penalties
        .expect_mark_processing()
        .times(1)
        .withf(move |update| {
            update.penalty_id == penalty_id
                && update.payment_intent_id == "pi_1"
                && update.payment_method_id == "pm_card"
                && update.attempted_at == now()
        })
        .returning(|_| Ok(()));
    harness.penalties.expect_mark_attempt_failed().never();

    let outcome = harness.build().charge(&penalty, now()).await.expect("charge runs");

    assert_eq!(
        outcome,
        ChargeOutcome::Processing {
            payment_intent_id: "pi_1".to_owned()
        }
    );
}

#[rstest]
#[case::authentication(
    PaymentProcessorError::authentication_required("3DS required"),
    PaymentStatus::RequiresAction,
    ChargeOutcome::RequiresAction
)]
#[case::declined(
    PaymentProcessorError::card("card_declined", "insufficient funds"),
    PaymentStatus::Failed,
    ChargeOutcome::Failed
)]
#[case::transport(
    PaymentProcessorError::transport("connection reset"),
    PaymentStatus::Failed,
    ChargeOutcome::Failed
)]
#[tokio::test]
async fn processor_failures_are_persisted_not_raised(
    habit: Habit,
    #[case] error: PaymentProcessorError,
    #[case] status: PaymentStatus,
    #[case] expected: ChargeOutcome,
) {
    let penalty = penalty_for(&habit);
    let penalty_id = penalty.id;
    let mut harness = Harness::with_habit_and_profile(&habit, Some(profile(Some("pm_card"))));
    harness
        .processor
        .expect_create_payment_intent()
        .times(1)
        .return_once(move |_| Err(error));
    harness
        .penalties
        .expect_mark_attempt_failed()
        .times(1)
        .withf(move |update| {
            update.penalty_id == penalty_id
                && update.status == status
                && update.attempted_at == now()
        })
        .returning(|_| Ok(()));
    harness.penalties.expect_mark_processing().never();

    let outcome = harness.build().charge(&penalty, now()).await.expect("charge runs");

    assert_eq!(outcome, expected);
}

#[rstest]
#[case::processing(PaymentStatus::Processing, false, SkipReason::AlreadyProcessing)]
#[case::succeeded(PaymentStatus::Succeeded, true, SkipReason::AlreadySettled)]
#[case::paid_flag(PaymentStatus::None, true, SkipReason::AlreadySettled)]
#[tokio::test]
async fn outstanding_or_settled_penalties_are_never_recharged(
    habit: Habit,
    #[case] status: PaymentStatus,
    #[case] is_paid: bool,
    #[case] reason: SkipReason,
) {
    let mut penalty = penalty_for(&habit);
    penalty.payment_status = status;
    penalty.is_paid = is_paid;
    let mut harness = Harness::with_habit_and_profile(&habit, Some(profile(Some("pm_card"))));
    harness.processor.expect_create_payment_intent().never();

    let outcome = harness.build().charge(&penalty, now()).await.expect("charge runs");

    assert_eq!(outcome, ChargeOutcome::Skipped(reason));
}

#[rstest]
#[case::no_profile(None, SkipReason::NoPaymentMethod)]
#[case::no_method(Some(profile(None)), SkipReason::NoPaymentMethod)]
#[case::blank_method(Some(profile(Some("  "))), SkipReason::NoPaymentMethod)]
#[tokio::test]
async fn missing_payment_method_skips_charge(
    habit: Habit,
    #[case] stored_profile: Option<UserPaymentProfile>,
    #[case] reason: SkipReason,
) {
    let penalty = penalty_for(&habit);
    let mut harness = Harness::with_habit_and_profile(&habit, stored_profile);
    harness.processor.expect_create_payment_intent().never();
    harness.penalties.expect_mark_attempt_failed().never();

    let outcome = harness.build().charge(&penalty, now()).await.expect("charge runs");

    assert_eq!(outcome, ChargeOutcome::Skipped(reason));
}

#[rstest]
#[case::inactive(false, true, SkipReason::HabitInactive)]
#[case::auto_pay_off(true, false, SkipReason::AutoPayDisabled)]
#[tokio::test]
async fn habit_flags_gate_auto_pay(
    mut habit: Habit,
    #[case] is_active: bool,
    #[case] auto_pay_enabled: bool,
    #[case] reason: SkipReason,
) {
    let penalty = penalty_for(&habit);
    habit.is_active = is_active;
    habit.auto_pay_enabled = auto_pay_enabled;
    let mut harness = Harness::with_habit_and_profile(&habit, Some(profile(Some("pm_card"))));
    harness.processor.expect_create_payment_intent().never();

    let outcome = harness.build().charge(&penalty, now()).await.expect("charge runs");

    assert_eq!(outcome, ChargeOutcome::Skipped(reason));
}

#[rstest]
#[tokio::test]
async fn deleted_habit_skips_charge(habit: Habit) {
    let penalty = penalty_for(&habit);
    let mut harness = Harness::with_habit_and_profile(&habit, Some(profile(Some("pm_card"))));
    harness.habits = MockHabitRepository::new();
    harness.habits.expect_find().returning(|_| Ok(None));
    harness.processor.expect_create_payment_intent().never();

    let outcome = harness.build().charge(&penalty, now()).await.expect("charge runs");

    assert_eq!(outcome, ChargeOutcome::Skipped(SkipReason::HabitNotFound));
}

#[rstest]
#[tokio::test]
async fn outcome_write_failures_surface_as_errors(habit: Habit) {
    let penalty = penalty_for(&habit);
    let mut harness = Harness::with_habit_and_profile(&habit, Some(profile(Some("pm_card"))));
    harness
        .processor
        .expect_create_payment_intent()
        .returning(|_| Err(PaymentProcessorError::card("expired_card", "expired")));
    harness
        .penalties
        .expect_mark_attempt_failed()
        .returning(|_| Err(crate::domain::ports::PenaltyRepositoryError::connection("down")));

    let error = harness
        .build()
        .charge(&penalty, now())
        .await
        .expect_err("write failure surfaces");

    assert_eq!(error.code(), ErrorCode::ServiceUnavailable);
}

struct StalledProcessor;

#[async_trait]
impl PaymentProcessor for StalledProcessor {
    async fn create_payment_intent(
        &self,
        _request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, PaymentProcessorError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(PaymentProcessorError::transport("unreachable"))
    }

    async fn retrieve_payment_intent(
        &self,
        _payment_intent_id: &str,
    ) -> Result<PaymentIntent, PaymentProcessorError> {
        Err(PaymentProcessorError::transport("unreachable"))
    }
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn stalled_processor_call_times_out_as_failure(habit: Habit) {
    let penalty = penalty_for(&habit);
    let mut harness = Harness::with_habit_and_profile(&habit, Some(profile(Some("pm_card"))));
    harness
        .penalties
        .expect_mark_attempt_failed()
        .times(1)
        .withf(|update| update.status == PaymentStatus::Failed)
        .returning(|_| Ok(()));
    let orchestrator = PaymentOrchestrator::new(
        PaymentOrchestratorPorts::new(
            Arc::new(harness.habits),
            Arc::new(harness.profiles),
            Arc::new(harness.penalties),
            Arc::new(StalledProcessor),
        ),
        PaymentOrchestratorConfig {
            charge_timeout: Duration::from_secs(5),
            ..PaymentOrchestratorConfig::default()
        },
    );

    let outcome = orchestrator.charge(&penalty, now()).await.expect("charge runs");

    assert_eq!(outcome, ChargeOutcome::Failed);
}
