//! Penalty ledger: exactly one penalty per missed occurrence.

use std::sync::Arc;

use chrono::NaiveDate;
use mockable::Clock;
use tracing::debug;

use super::habit::{Habit, HabitId};
use super::penalty::{NewPenalty, Penalty};
use super::ports::{PenaltyRepository, PenaltyRepositoryError};

/// Result of recording a miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// This call created the penalty.
    Created(Penalty),
    /// A penalty for the same habit and date already existed.
    AlreadyExists(Penalty),
}

impl RecordOutcome {
    /// The stored penalty regardless of who created it.
    pub fn penalty(&self) -> &Penalty {
        match self {
            Self::Created(penalty) | Self::AlreadyExists(penalty) => penalty,
        }
    }
}

/// Creates and queries penalty records.
#[derive(Clone)]
pub struct PenaltyLedger {
    penalties: Arc<dyn PenaltyRepository>,
    clock: Arc<dyn Clock>,
}

impl PenaltyLedger {
    /// Build a ledger over `penalties`; `clock` stamps creation times.
    pub fn new(penalties: Arc<dyn PenaltyRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { penalties, clock }
    }

    /// Look up the penalty for `habit_id` on `penalty_date`.
    pub async fn find(
        &self,
        habit_id: &HabitId,
        penalty_date: NaiveDate,
    ) -> Result<Option<Penalty>, PenaltyRepositoryError> {
        self.penalties
            .find_by_habit_and_date(habit_id, penalty_date)
            .await
    }

    /// Record that `habit` missed `penalty_date`.
    ///
    /// Losing a race against a concurrent writer is not an error: the
    /// winner's row is re-read and reported as [`RecordOutcome::AlreadyExists`].
    ///
    /// # Errors
    ///
    /// Propagates repository failures other than uniqueness conflicts.
    pub async fn record_miss(
        &self,
        habit: &Habit,
        penalty_date: NaiveDate,
    ) -> Result<RecordOutcome, PenaltyRepositoryError> {
        if let Some(existing) = self.find(&habit.id, penalty_date).await? {
            return Ok(RecordOutcome::AlreadyExists(existing));
        }

        let new_penalty = NewPenalty::for_miss(habit, penalty_date, self.clock.utc());
        match self.penalties.insert_if_absent(&new_penalty).await {
            Ok(Some(created)) => Ok(RecordOutcome::Created(created)),
            Ok(None) | Err(PenaltyRepositoryError::DuplicateKey { .. }) => {
                debug!(
                    habit_id = %habit.id,
                    penalty_date = %penalty_date,
                    "concurrent writer recorded this miss first"
                );
                self.reread_winner(&habit.id, penalty_date).await
            }
            Err(error) => Err(error),
        }
    }

    async fn reread_winner(
        &self,
        habit_id: &HabitId,
        penalty_date: NaiveDate,
    ) -> Result<RecordOutcome, PenaltyRepositoryError> {
        self.find(habit_id, penalty_date)
            .await?
            .map(RecordOutcome::AlreadyExists)
            .ok_or_else(|| {
                PenaltyRepositoryError::not_found(format!(
                    "conflicting penalty for habit {habit_id} on {penalty_date} vanished"
                ))
            })
    }
}
