//! In-memory store implementing every repository port.
//!
//! Enforces the `(habit_id, penalty_date)` uniqueness of the real schema so
//! concurrency and idempotency tests exercise the same conflict paths.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::ports::{
    FailedAttemptUpdate, HabitRepository, HabitRepositoryError, PenaltyRepository,
    PenaltyRepositoryError, ProcessingUpdate, RetryCandidateQuery, SettlementUpdate,
    UserProfileRepository, UserProfileRepositoryError, VerificationRepository,
    VerificationRepositoryError,
};
use crate::domain::{
    Habit, HabitId, NewPenalty, PaymentStatus, Penalty, PenaltyId, UserId, UserPaymentProfile,
};

#[derive(Default)]
struct StoreState {
    habits: BTreeMap<HabitId, Habit>,
    profiles: HashMap<UserId, UserPaymentProfile>,
    verified_dates: HashMap<HabitId, Vec<NaiveDate>>,
    penalties: Vec<Penalty>,
    failing_verifications: HashSet<HabitId>,
}

/// Shared in-memory backing store.
#[derive(Default)]
pub struct InMemoryStore(Mutex<StoreState>);

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_habit(&self, habit: Habit) {
        self.lock().habits.insert(habit.id, habit);
    }

    pub fn set_profile(&self, user_id: UserId, profile: UserPaymentProfile) {
        self.lock().profiles.insert(user_id, profile);
    }

    /// Record a verified submission for `habit_id` on the owner-local `date`.
    pub fn record_verification(&self, habit_id: HabitId, date: NaiveDate) {
        self.lock()
            .verified_dates
            .entry(habit_id)
            .or_default()
            .push(date);
    }

    /// Make verification lookups for `habit_id` fail.
    pub fn fail_verifications_for(&self, habit_id: HabitId) {
        self.lock().failing_verifications.insert(habit_id);
    }

    pub fn insert_penalty(&self, penalty: Penalty) {
        self.lock().penalties.push(penalty);
    }

    pub fn penalties(&self) -> Vec<Penalty> {
        self.lock().penalties.clone()
    }

    pub fn penalty(&self, penalty_id: PenaltyId) -> Option<Penalty> {
        self.lock()
            .penalties
            .iter()
            .find(|penalty| penalty.id == penalty_id)
            .cloned()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("in-memory store mutex"),
        }
    }

    fn update_penalty(
        &self,
        penalty_id: PenaltyId,
        apply: impl FnOnce(&mut Penalty),
    ) -> Result<(), PenaltyRepositoryError> {
        let mut state = self.lock();
        let penalty = state
            .penalties
            .iter_mut()
            .find(|penalty| penalty.id == penalty_id)
            .ok_or_else(|| PenaltyRepositoryError::not_found(penalty_id.to_string()))?;
        apply(penalty);
        Ok(())
    }
}

fn auto_pay_ready(state: &StoreState, penalty: &Penalty) -> bool {
    let habit_ready = state
        .habits
        .get(&penalty.habit_id)
        .is_some_and(|habit| habit.is_active && habit.auto_pay_enabled);
    let has_method = state
        .profiles
        .get(&penalty.user_id)
        .is_some_and(|profile| profile.payment_method().is_some());
    habit_ready && has_method
}

#[async_trait]
impl HabitRepository for InMemoryStore {
    async fn list_active(&self) -> Result<Vec<Habit>, HabitRepositoryError> {
        Ok(self
            .lock()
            .habits
            .values()
            .filter(|habit| habit.is_active)
            .cloned()
            .collect())
    }

    async fn find(&self, habit_id: &HabitId) -> Result<Option<Habit>, HabitRepositoryError> {
        Ok(self.lock().habits.get(habit_id).cloned())
    }
}

#[async_trait]
impl VerificationRepository for InMemoryStore {
    async fn latest_verified_date(
        &self,
        habit_id: &HabitId,
    ) -> Result<Option<NaiveDate>, VerificationRepositoryError> {
        let state = self.lock();
        if state.failing_verifications.contains(habit_id) {
            return Err(VerificationRepositoryError::connection("injected failure"));
        }
        Ok(state
            .verified_dates
            .get(habit_id)
            .and_then(|dates| dates.iter().max().copied()))
    }
}

#[async_trait]
impl UserProfileRepository for InMemoryStore {
    async fn find_profile(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UserPaymentProfile>, UserProfileRepositoryError> {
        Ok(self.lock().profiles.get(user_id).cloned())
    }
}

#[async_trait]
impl PenaltyRepository for InMemoryStore {
    async fn find_by_habit_and_date(
        &self,
        habit_id: &HabitId,
        penalty_date: NaiveDate,
    ) -> Result<Option<Penalty>, PenaltyRepositoryError> {
        Ok(self
            .lock()
            .penalties
            .iter()
            .find(|penalty| penalty.habit_id == *habit_id && penalty.penalty_date == penalty_date)
            .cloned())
    }

    async fn insert_if_absent(
        &self,
        penalty: &NewPenalty,
    ) -> Result<Option<Penalty>, PenaltyRepositoryError> {
        let mut state = self.lock();
        let exists = state.penalties.iter().any(|stored| {
            stored.habit_id == penalty.habit_id && stored.penalty_date == penalty.penalty_date
        });
        if exists {
            return Ok(None);
        }
        let stored = penalty.clone().into_penalty();
        state.penalties.push(stored.clone());
        Ok(Some(stored))
    }

    async fn mark_processing(
        &self,
        update: &ProcessingUpdate,
    ) -> Result<(), PenaltyRepositoryError> {
        self.update_penalty(update.penalty_id, |penalty| {
            penalty.payment_status = PaymentStatus::Processing;
            penalty.payment_intent_id = Some(update.payment_intent_id.clone());
            penalty.payment_method_id = Some(update.payment_method_id.clone());
            penalty.last_attempt_at = Some(update.attempted_at);
        })
    }

    async fn mark_attempt_failed(
        &self,
        update: &FailedAttemptUpdate,
    ) -> Result<(), PenaltyRepositoryError> {
        self.update_penalty(update.penalty_id, |penalty| {
            penalty.payment_status = update.status;
            penalty.retry_count += 1;
            penalty.last_retry_date = Some(update.attempted_at);
            penalty.last_attempt_at = Some(update.attempted_at);
        })
    }

    async fn apply_settlement(
        &self,
        update: &SettlementUpdate,
    ) -> Result<(), PenaltyRepositoryError> {
        self.update_penalty(update.penalty_id, |penalty| {
            penalty.payment_status = update.status;
            penalty.is_paid = penalty.is_paid || update.is_paid;
        })
    }

    async fn list_retry_candidates(
        &self,
        query: &RetryCandidateQuery,
    ) -> Result<Vec<Penalty>, PenaltyRepositoryError> {
        let state = self.lock();
        Ok(state
            .penalties
            .iter()
            .filter(|penalty| {
                let due = match penalty.payment_status {
                    PaymentStatus::Failed => penalty
                        .last_retry_date
                        .is_none_or(|last| last <= query.due_at_or_before),
                    PaymentStatus::None => {
                        penalty.last_attempt_at.is_none()
                            && penalty.created_at <= query.due_at_or_before
                    }
                    _ => false,
                };
                due
                    && !penalty.is_paid
                    && penalty.retry_count < query.max_retries
                    && auto_pay_ready(&state, penalty)
            })
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn list_processing_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Penalty>, PenaltyRepositoryError> {
        Ok(self
            .lock()
            .penalties
            .iter()
            .filter(|penalty| {
                penalty.payment_status == PaymentStatus::Processing
                    && penalty.last_attempt_at.unwrap_or(penalty.created_at) <= cutoff
            })
            .take(limit)
            .cloned()
            .collect())
    }
}
