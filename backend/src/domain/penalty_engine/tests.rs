//! Batch-level behaviour of the daily penalty check.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rstest::{fixture, rstest};

use super::*;
use crate::domain::ports::{
    FixturePaymentProcessor, FixturePenaltyRepository, FixtureUserProfileRepository,
    FixtureVerificationRepository, MockHabitRepository, NoOpMissNotifier,
};
use crate::domain::{
    ErrorCode, HabitId, NewPenalty, PaymentStatus, PenaltyAmount, RequiredWeekdays, UserId,
    UserPaymentProfile,
};
use crate::test_support::{
    InMemoryStore, MutableClock, RecordingNotifier, ScriptedPaymentProcessor, engine_over,
};

fn run_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 11, 0, 5, 0)
        .single()
        .expect("valid time")
}

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 10).expect("valid date")
}

fn monday_habit(user_id: UserId) -> Habit {
    Habit {
        id: HabitId::random(),
        user_id,
        weekdays: RequiredWeekdays::try_from_indices([0_i64]).expect("valid weekdays"),
        penalty_amount: PenaltyAmount::from_minor_units(500).expect("positive"),
        created_at: Utc
            .with_ymd_and_hms(2024, 6, 9, 23, 0, 0)
            .single()
            .expect("valid time"),
        is_active: true,
        auto_pay_enabled: true,
    }
}

struct World {
    store: Arc<InMemoryStore>,
    processor: Arc<ScriptedPaymentProcessor>,
    notifier: Arc<RecordingNotifier>,
    engine: PenaltyEngine,
}

fn world_with(notifier: RecordingNotifier) -> World {
    let store = Arc::new(InMemoryStore::new());
    let processor = Arc::new(ScriptedPaymentProcessor::new());
    let notifier = Arc::new(notifier);
    let engine = engine_over(
        &store,
        &processor,
        &notifier,
        Arc::new(MutableClock::new(run_at())),
        PenaltyEngineConfig::default(),
    );
    World {
        store,
        processor,
        notifier,
        engine,
    }
}

#[fixture]
fn world() -> World {
    world_with(RecordingNotifier::new())
}

fn seed_user(store: &InMemoryStore, timezone: &str) -> UserId {
    let user_id = UserId::random();
    store.set_profile(
        user_id,
        UserPaymentProfile {
            timezone: Some(timezone.to_owned()),
            default_payment_method_id: Some("pm_card".to_owned()),
            customer_id: Some("cus_1".to_owned()),
        },
    );
    user_id
}

#[rstest]
#[tokio::test]
async fn missed_day_creates_notifies_and_charges(world: World) {
    let habit = monday_habit(seed_user(&world.store, "UTC"));
    world.store.insert_habit(habit.clone());

    let report = world
        .engine
        .run_penalty_check(run_at())
        .await
        .expect("check runs");

    assert_eq!(report.habits_scanned, 1);
    assert_eq!(report.penalties_created, 1);
    assert_eq!(report.charges.processing, 1);
    let penalties = world.store.penalties();
    let [penalty] = penalties.as_slice() else {
        panic!("expected exactly one penalty, got {penalties:?}");
    };
    assert_eq!(penalty.habit_id, habit.id);
    assert_eq!(penalty.penalty_date, monday());
    assert_eq!(penalty.payment_status, PaymentStatus::Processing);
    assert_eq!(penalty.payment_method_id.as_deref(), Some("pm_card"));
    assert_eq!(world.notifier.announced(), vec![penalty.id]);
}

#[rstest]
#[tokio::test]
async fn repeated_runs_for_same_instant_are_idempotent(world: World) {
    let habit = monday_habit(seed_user(&world.store, "UTC"));
    world.store.insert_habit(habit);

    let first = world
        .engine
        .run_penalty_check(run_at())
        .await
        .expect("first run");
    let second = world
        .engine
        .run_penalty_check(run_at())
        .await
        .expect("second run");

    assert_eq!(first.penalties_created, 1);
    assert_eq!(second.penalties_created, 0);
    assert_eq!(second.duplicates, 1);
    assert_eq!(world.store.penalties().len(), 1);
    assert_eq!(world.processor.requests().len(), 1);
    assert_eq!(world.notifier.announced().len(), 1);
}

#[rstest]
#[tokio::test]
async fn recorded_but_uncharged_penalty_is_resumed(world: World) {
    let habit = monday_habit(seed_user(&world.store, "UTC"));
    world.store.insert_habit(habit.clone());
    let stranded = NewPenalty::for_miss(&habit, monday(), run_at()).into_penalty();
    let stranded_id = stranded.id;
    world.store.insert_penalty(stranded);

    let report = world
        .engine
        .run_penalty_check(run_at())
        .await
        .expect("check runs");

    assert_eq!(report.duplicates, 1);
    assert_eq!(report.resumed, 1);
    assert_eq!(report.charges.processing, 1);
    assert_eq!(world.processor.requests().len(), 1);
    assert!(world.notifier.announced().is_empty());
    let penalty = world.store.penalty(stranded_id).expect("penalty stored");
    assert_eq!(penalty.payment_status, PaymentStatus::Processing);
    assert_eq!(penalty.last_attempt_at, Some(run_at()));
}

#[rstest]
#[tokio::test]
async fn one_failing_habit_does_not_stop_the_batch(world: World) {
    let user_id = seed_user(&world.store, "UTC");
    let broken = monday_habit(user_id);
    let healthy = monday_habit(user_id);
    world.store.insert_habit(broken.clone());
    world.store.insert_habit(healthy.clone());
    world.store.fail_verifications_for(broken.id);

    let report = world
        .engine
        .run_penalty_check(run_at())
        .await
        .expect("check runs");

    assert_eq!(report.habits_scanned, 2);
    assert_eq!(report.errors, 1);
    assert_eq!(report.penalties_created, 1);
    let penalties = world.store.penalties();
    assert_eq!(penalties.len(), 1);
    assert_eq!(penalties[0].habit_id, healthy.id);
}

#[rstest]
#[tokio::test]
async fn notifier_failures_do_not_block_charging() {
    let world = world_with(RecordingNotifier::failing());
    world
        .store
        .insert_habit(monday_habit(seed_user(&world.store, "UTC")));

    let report = world
        .engine
        .run_penalty_check(run_at())
        .await
        .expect("check runs");

    assert_eq!(report.notifier_failures, 1);
    assert_eq!(report.charges.processing, 1);
    assert_eq!(report.errors, 0);
}

#[rstest]
#[tokio::test]
async fn inactive_habits_are_not_scanned(world: World) {
    let mut habit = monday_habit(seed_user(&world.store, "UTC"));
    habit.is_active = false;
    world.store.insert_habit(habit);

    let report = world
        .engine
        .run_penalty_check(run_at())
        .await
        .expect("check runs");

    assert_eq!(report.habits_scanned, 0);
    assert!(world.store.penalties().is_empty());
}

#[rstest]
#[tokio::test]
async fn owner_local_day_drives_the_evaluated_date(world: World) {
    // 03:00Z on Tuesday is still Monday evening in Los Angeles, so the
    // evaluated day is Sunday and the Monday-only habit owes nothing yet.
    let habit = monday_habit(seed_user(&world.store, "America/Los_Angeles"));
    world.store.insert_habit(habit);
    let early = Utc
        .with_ymd_and_hms(2024, 6, 11, 3, 0, 0)
        .single()
        .expect("valid time");

    let report = world
        .engine
        .run_penalty_check(early)
        .await
        .expect("check runs");

    assert_eq!(report.no_action, 1);
    assert!(world.store.penalties().is_empty());
}

#[rstest]
#[tokio::test]
async fn habit_listing_failure_fails_the_batch() {
    let mut habits = MockHabitRepository::new();
    habits
        .expect_list_active()
        .returning(|| Err(crate::domain::ports::HabitRepositoryError::connection("down")));
    let engine = PenaltyEngine::new(
        PenaltyEnginePorts {
            habits: Arc::new(habits),
            verifications: Arc::new(FixtureVerificationRepository),
            profiles: Arc::new(FixtureUserProfileRepository),
            penalties: Arc::new(FixturePenaltyRepository),
            processor: Arc::new(FixturePaymentProcessor),
            notifier: Arc::new(NoOpMissNotifier),
        },
        Arc::new(MutableClock::new(run_at())),
        PenaltyEngineConfig::default(),
    );

    let error = engine
        .run_penalty_check(run_at())
        .await
        .expect_err("listing failure surfaces");

    assert_eq!(error.code(), ErrorCode::ServiceUnavailable);
}
