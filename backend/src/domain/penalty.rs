//! Penalty records and their payment status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::habit::{Habit, HabitId, PenaltyAmount, UserId};

/// Stable penalty identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PenaltyId(Uuid);

impl PenaltyId {
    /// Wrap an existing UUID.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a new random identifier.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the underlying UUID.
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for PenaltyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Mirror of the processor-side state of a penalty charge.
///
/// # Example
///
/// ```
/// # use penalty_engine::domain::PaymentStatus;
/// assert_eq!(PaymentStatus::RequiresAction.as_str(), "requires_action");
/// assert_eq!("failed".parse::<PaymentStatus>(), Ok(PaymentStatus::Failed));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// No charge attempted yet, or preconditions prevented one.
    #[default]
    None,
    /// A payment intent was created and is awaiting a terminal update.
    Processing,
    /// The processor requires customer authentication.
    RequiresAction,
    /// The last attempt failed.
    Failed,
    /// The charge settled.
    Succeeded,
}

impl PaymentStatus {
    /// All payment status variants.
    pub const ALL: [Self; 5] = [
        Self::None,
        Self::Processing,
        Self::RequiresAction,
        Self::Failed,
        Self::Succeeded,
    ];

    /// Database string representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Processing => "processing",
            Self::RequiresAction => "requires_action",
            Self::Failed => "failed",
            Self::Succeeded => "succeeded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown payment status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid payment status '{input}'")]
pub struct ParsePaymentStatusError {
    /// The rejected input.
    pub input: String,
}

impl FromStr for PaymentStatus {
    type Err = ParsePaymentStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| ParsePaymentStatusError {
                input: s.to_owned(),
            })
    }
}

/// A monetary obligation for one missed occurrence of one habit.
///
/// ## Invariants
/// - At most one penalty exists per `(habit_id, penalty_date)`.
/// - `retry_count` only grows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Penalty {
    pub id: PenaltyId,
    pub habit_id: HabitId,
    pub user_id: UserId,
    pub amount: PenaltyAmount,
    /// The missed day in the owner's local calendar.
    pub penalty_date: NaiveDate,
    pub is_paid: bool,
    pub payment_intent_id: Option<String>,
    pub payment_method_id: Option<String>,
    pub payment_status: PaymentStatus,
    pub retry_count: u32,
    /// Stamped on every failed attempt; drives the retry interval.
    pub last_retry_date: Option<DateTime<Utc>>,
    /// Stamped on every charge attempt regardless of outcome.
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Penalty {
    /// True for an unpaid penalty that no charge attempt has touched yet.
    ///
    /// A run interrupted between recording and charging leaves penalties in
    /// this state; they are charged when next seen.
    pub fn awaits_first_attempt(&self) -> bool {
        !self.is_paid
            && self.payment_status == PaymentStatus::None
            && self.last_attempt_at.is_none()
    }
}

/// Insert payload for a freshly detected miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPenalty {
    pub id: PenaltyId,
    pub habit_id: HabitId,
    pub user_id: UserId,
    pub amount: PenaltyAmount,
    pub penalty_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl NewPenalty {
    /// Build the insert payload for `habit` missing `penalty_date`.
    pub fn for_miss(habit: &Habit, penalty_date: NaiveDate, created_at: DateTime<Utc>) -> Self {
        Self {
            id: PenaltyId::random(),
            habit_id: habit.id,
            user_id: habit.user_id,
            amount: habit.penalty_amount,
            penalty_date,
            created_at,
        }
    }

    /// The unsettled penalty this payload creates.
    pub fn into_penalty(self) -> Penalty {
        Penalty {
            id: self.id,
            habit_id: self.habit_id,
            user_id: self.user_id,
            amount: self.amount,
            penalty_date: self.penalty_date,
            is_paid: false,
            payment_intent_id: None,
            payment_method_id: None,
            payment_status: PaymentStatus::None,
            retry_count: 0,
            last_retry_date: None,
            last_attempt_at: None,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn status_strings_round_trip() {
        for status in PaymentStatus::ALL {
            assert_eq!(status.as_str().parse::<PaymentStatus>(), Ok(status));
        }
    }

    #[rstest]
    fn unknown_status_is_rejected() {
        let error = "refunded".parse::<PaymentStatus>().expect_err("must fail");
        assert_eq!(error.input, "refunded");
    }

    #[rstest]
    #[case::untouched(PaymentStatus::None, false, None, true)]
    #[case::paid(PaymentStatus::None, true, None, false)]
    #[case::attempted_before(PaymentStatus::None, false, Some(Utc::now()), false)]
    #[case::failed(PaymentStatus::Failed, false, Some(Utc::now()), false)]
    #[case::processing(PaymentStatus::Processing, false, Some(Utc::now()), false)]
    fn first_attempt_detection(
        #[case] status: PaymentStatus,
        #[case] is_paid: bool,
        #[case] last_attempt_at: Option<DateTime<Utc>>,
        #[case] expected: bool,
    ) {
        let mut penalty = NewPenalty {
            id: PenaltyId::random(),
            habit_id: HabitId::random(),
            user_id: UserId::random(),
            amount: PenaltyAmount::from_minor_units(500).expect("positive"),
            penalty_date: NaiveDate::from_ymd_opt(2024, 6, 10).expect("valid date"),
            created_at: Utc::now(),
        }
        .into_penalty();
        penalty.payment_status = status;
        penalty.is_paid = is_paid;
        penalty.last_attempt_at = last_attempt_at;

        assert_eq!(penalty.awaits_first_attempt(), expected);
    }
}
