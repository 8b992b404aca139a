//! Habit data model read by the penalty engine.
//!
//! Habits are owned by external habit-management flows. The engine only reads
//! them, so the types here validate on construction and stay immutable.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
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

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_identifier! {
    /// Stable habit identifier.
    HabitId
}

uuid_identifier! {
    /// Stable user identifier.
    UserId
}

/// Validation errors raised while building habit values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HabitValidationError {
    /// Weekday index outside `0..=6`.
    #[error("weekday {value} is out of range; expected 0 (Monday) to 6 (Sunday)")]
    WeekdayOutOfRange { value: i64 },
    /// Amount is zero or negative.
    #[error("penalty amount must be greater than zero")]
    NonPositiveAmount,
}

/// Set of weekdays on which a submission is required.
///
/// Values use ISO-style numbering: `0` is Monday and `6` is Sunday.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredWeekdays(BTreeSet<u8>);

impl RequiredWeekdays {
    /// Build a weekday set, rejecting indices outside `0..=6`.
    ///
    /// # Examples
    /// ```
    /// use penalty_engine::domain::RequiredWeekdays;
    ///
    /// let weekdays = RequiredWeekdays::try_from_indices([0_i64, 2, 4])?;
    /// assert_eq!(weekdays.len(), 3);
    /// # Ok::<(), penalty_engine::domain::HabitValidationError>(())
    /// ```
    pub fn try_from_indices<I, T>(values: I) -> Result<Self, HabitValidationError>
    where
        I: IntoIterator<Item = T>,
        T: Into<i64>,
    {
        values
            .into_iter()
            .map(|value| {
                let value = value.into();
                u8::try_from(value)
                    .ok()
                    .filter(|day| *day <= 6)
                    .ok_or(HabitValidationError::WeekdayOutOfRange { value })
            })
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Self)
    }

    /// Return whether `date` falls on a required weekday.
    pub fn requires(&self, date: NaiveDate) -> bool {
        let index = date.weekday().num_days_from_monday();
        u8::try_from(index).is_ok_and(|day| self.0.contains(&day))
    }

    /// Iterate the weekday indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().copied()
    }

    /// Number of required weekdays.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no weekday is required.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Positive penalty amount held in integer minor units (cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct PenaltyAmount(u64);

impl PenaltyAmount {
    /// Build an amount from minor units, rejecting zero.
    pub fn from_minor_units(minor_units: u64) -> Result<Self, HabitValidationError> {
        if minor_units == 0 {
            return Err(HabitValidationError::NonPositiveAmount);
        }
        Ok(Self(minor_units))
    }

    /// Amount in minor units, i.e. `amount * 100`.
    pub const fn minor_units(self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for PenaltyAmount {
    type Error = HabitValidationError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::from_minor_units(value)
    }
}

impl From<PenaltyAmount> for u64 {
    fn from(value: PenaltyAmount) -> Self {
        value.0
    }
}

impl fmt::Display for PenaltyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// A user-defined recurring commitment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Habit {
    /// Habit identifier.
    pub id: HabitId,
    /// Owning user.
    pub user_id: UserId,
    /// Weekdays on which a submission is required.
    pub weekdays: RequiredWeekdays,
    /// Amount charged per missed required day.
    pub penalty_amount: PenaltyAmount,
    /// Creation instant; the local creation day is exempt from penalties.
    pub created_at: DateTime<Utc>,
    /// Inactive habits are never evaluated or charged.
    pub is_active: bool,
    /// Permits automatic charging of penalties.
    pub auto_pay_enabled: bool,
}

/// Payment-related profile of a habit owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPaymentProfile {
    /// Stored timezone string, possibly a legacy abbreviation.
    pub timezone: Option<String>,
    /// Default payment method at the processor.
    pub default_payment_method_id: Option<String>,
    /// Processor customer identifier.
    pub customer_id: Option<String>,
}

impl UserPaymentProfile {
    /// Return the default payment method when it is present and non-blank.
    pub fn payment_method(&self) -> Option<&str> {
        self.default_payment_method_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}
