//! Occurrence detection: did a habit miss yesterday's required submission?
//!
//! All calendar arithmetic happens in the habit owner's local timezone. A run
//! at `2024-06-11T03:00Z` for a Los Angeles user evaluates `2024-06-09`, not
//! `2024-06-10`.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use super::habit::Habit;
use super::ports::{VerificationRepository, VerificationRepositoryError};
use super::timezone::TimezoneResolver;

/// Why a habit produced no penalty for the evaluated day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoActionReason {
    /// The habit is not active.
    Inactive,
    /// The evaluated day is not after the habit's local creation day.
    GracePeriod,
    /// The evaluated day is not a required weekday.
    NotRequired,
    /// A verified submission covers the evaluated day.
    Satisfied,
}

/// Outcome of evaluating one habit for one run instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissDecision {
    /// Nothing to record.
    NoAction(NoActionReason),
    /// The habit missed the required local day.
    Missed(NaiveDate),
}

/// Decides per habit whether yesterday's required submission was missed.
#[derive(Clone)]
pub struct OccurrenceDetector {
    timezones: TimezoneResolver,
    verifications: Arc<dyn VerificationRepository>,
}

impl OccurrenceDetector {
    /// Build a detector over the given timezone resolver and verification store.
    pub fn new(
        timezones: TimezoneResolver,
        verifications: Arc<dyn VerificationRepository>,
    ) -> Self {
        Self {
            timezones,
            verifications,
        }
    }

    /// Evaluate `habit` for the local day before `as_of`.
    ///
    /// # Errors
    ///
    /// Returns the verification store error when the latest submission cannot
    /// be read; an unreadable store is never treated as "no submission".
    pub async fn detect_miss(
        &self,
        habit: &Habit,
        as_of: DateTime<Utc>,
    ) -> Result<MissDecision, VerificationRepositoryError> {
        if !habit.is_active {
            return Ok(MissDecision::NoAction(NoActionReason::Inactive));
        }

        let zone = self.timezones.resolve(&habit.user_id).await;
        let today = as_of.with_timezone(&zone).date_naive();
        let Some(yesterday) = today.pred_opt() else {
            return Ok(MissDecision::NoAction(NoActionReason::GracePeriod));
        };

        let creation_date = habit.created_at.with_timezone(&zone).date_naive();
        if creation_date >= yesterday {
            return Ok(MissDecision::NoAction(NoActionReason::GracePeriod));
        }

        if !habit.weekdays.requires(yesterday) {
            return Ok(MissDecision::NoAction(NoActionReason::NotRequired));
        }

        let last_submission = self.verifications.latest_verified_date(&habit.id).await?;
        Ok(decide(last_submission, yesterday))
    }
}

fn decide(last_submission: Option<NaiveDate>, required_day: NaiveDate) -> MissDecision {
    match last_submission {
        Some(date) if date >= required_day => MissDecision::NoAction(NoActionReason::Satisfied),
        _ => MissDecision::Missed(required_day),
    }
}
