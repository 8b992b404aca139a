//! Driven port for penalty persistence.
//!
//! The repository is the engine's only mutual-exclusion point: adapters must
//! back [`PenaltyRepository::insert_if_absent`] with a storage-level unique
//! constraint on `(habit_id, penalty_date)` so overlapping batch runs, possibly
//! on different replicas, can never create two penalties for one miss.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{HabitId, NewPenalty, PaymentStatus, Penalty, PenaltyId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by penalty repository adapters.
    pub enum PenaltyRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "penalty repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "penalty repository query failed: {message}",
        /// A penalty already exists for the same habit and date.
        DuplicateKey { message: String } => "penalty already exists: {message}",
        /// An update targeted a penalty that does not exist.
        NotFound { message: String } => "penalty not found: {message}",
        /// A stored row could not be mapped into a domain penalty.
        Corrupt { message: String } => "penalty row is invalid: {message}",
    }
}

/// Outcome persisted after a payment intent was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingUpdate {
    pub penalty_id: PenaltyId,
    pub payment_intent_id: String,
    pub payment_method_id: String,
    pub attempted_at: DateTime<Utc>,
}

/// Outcome persisted after a charge attempt failed.
///
/// Adapters increment `retry_count` atomically and stamp both
/// `last_retry_date` and `last_attempt_at` with `attempted_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttemptUpdate {
    pub penalty_id: PenaltyId,
    /// Either [`PaymentStatus::Failed`] or [`PaymentStatus::RequiresAction`].
    pub status: PaymentStatus,
    pub attempted_at: DateTime<Utc>,
}

/// Processor status mirrored onto a penalty without a new charge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementUpdate {
    pub penalty_id: PenaltyId,
    pub status: PaymentStatus,
    pub is_paid: bool,
}

/// Selection criteria for the retry sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryCandidateQuery {
    /// Only penalties with `retry_count < max_retries` qualify.
    pub max_retries: u32,
    /// Failed penalties qualify when last retried at or before this instant;
    /// never-attempted penalties when created at or before it.
    pub due_at_or_before: DateTime<Utc>,
    /// Maximum rows to return.
    pub limit: usize,
}

/// Port for penalty storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PenaltyRepository: Send + Sync {
    /// Look up the penalty for one missed occurrence.
    async fn find_by_habit_and_date(
        &self,
        habit_id: &HabitId,
        penalty_date: NaiveDate,
    ) -> Result<Option<Penalty>, PenaltyRepositoryError>;

    /// Insert `penalty` unless one already exists for its habit and date.
    ///
    /// Returns the stored penalty when this call inserted it and `None` when a
    /// row for the same `(habit_id, penalty_date)` already existed.
    async fn insert_if_absent(
        &self,
        penalty: &NewPenalty,
    ) -> Result<Option<Penalty>, PenaltyRepositoryError>;

    /// Record a created payment intent and move the penalty to `processing`.
    async fn mark_processing(&self, update: &ProcessingUpdate)
    -> Result<(), PenaltyRepositoryError>;

    /// Record a failed attempt, incrementing the retry count.
    async fn mark_attempt_failed(
        &self,
        update: &FailedAttemptUpdate,
    ) -> Result<(), PenaltyRepositoryError>;

    /// Mirror a terminal processor status onto the penalty.
    async fn apply_settlement(&self, update: &SettlementUpdate)
    -> Result<(), PenaltyRepositoryError>;

    /// List penalties eligible for a sweep charge: failed penalties due for
    /// another attempt, and `none` penalties no attempt has touched.
    ///
    /// Adapters also require the habit to be active with auto-pay enabled and
    /// the owner to have a default payment method.
    async fn list_retry_candidates(
        &self,
        query: &RetryCandidateQuery,
    ) -> Result<Vec<Penalty>, PenaltyRepositoryError>;

    /// List `processing` penalties whose last attempt is at or before `cutoff`.
    async fn list_processing_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Penalty>, PenaltyRepositoryError>;
}

/// Fixture implementation that stores nothing and reports every insert as new.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixturePenaltyRepository;

#[async_trait]
impl PenaltyRepository for FixturePenaltyRepository {
    async fn find_by_habit_and_date(
        &self,
        _habit_id: &HabitId,
        _penalty_date: NaiveDate,
    ) -> Result<Option<Penalty>, PenaltyRepositoryError> {
        Ok(None)
    }

    async fn insert_if_absent(
        &self,
        penalty: &NewPenalty,
    ) -> Result<Option<Penalty>, PenaltyRepositoryError> {
        Ok(Some(penalty.clone().into_penalty()))
    }

    async fn mark_processing(
        &self,
        _update: &ProcessingUpdate,
    ) -> Result<(), PenaltyRepositoryError> {
        Ok(())
    }

    async fn mark_attempt_failed(
        &self,
        _update: &FailedAttemptUpdate,
    ) -> Result<(), PenaltyRepositoryError> {
        Ok(())
    }

    async fn apply_settlement(
        &self,
        _update: &SettlementUpdate,
    ) -> Result<(), PenaltyRepositoryError> {
        Ok(())
    }

    async fn list_retry_candidates(
        &self,
        _query: &RetryCandidateQuery,
    ) -> Result<Vec<Penalty>, PenaltyRepositoryError> {
        Ok(Vec::new())
    }

    async fn list_processing_before(
        &self,
        _cutoff: DateTime<Utc>,
        _limit: usize,
    ) -> Result<Vec<Penalty>, PenaltyRepositoryError> {
        Ok(Vec::new())
    }
}
