//! Internal Diesel row structs and their conversions into domain types.
//!
//! Rows never leave the persistence layer. Conversions validate stored values
//! and report violations as strings; each repository wraps them in its own
//! `Corrupt` error.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::{
    Habit, HabitId, NewPenalty, PaymentStatus, Penalty, PenaltyAmount, PenaltyId,
    RequiredWeekdays, UserId, UserPaymentProfile,
};

use super::diesel_helpers::counter_from_db;
use super::schema::{habits, penalties, users};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = habits)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct HabitRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub weekdays: Vec<i16>,
    pub penalty_amount_minor: i64,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
    pub auto_pay_enabled: bool,
}

impl TryFrom<HabitRow> for Habit {
    type Error = String;

    fn try_from(row: HabitRow) -> Result<Self, Self::Error> {
        let weekdays = RequiredWeekdays::try_from_indices(row.weekdays)
            .map_err(|err| format!("habit {}: {err}", row.id))?;
        let penalty_amount = amount_from_db(row.penalty_amount_minor)
            .map_err(|err| format!("habit {}: {err}", row.id))?;
        Ok(Self {
            id: HabitId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            weekdays,
            penalty_amount,
            created_at: row.created_at,
            is_active: row.is_active,
            auto_pay_enabled: row.auto_pay_enabled,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct UserProfileRow {
    pub timezone: Option<String>,
    pub default_payment_method_id: Option<String>,
    pub stripe_customer_id: Option<String>,
}

impl From<UserProfileRow> for UserPaymentProfile {
    fn from(row: UserProfileRow) -> Self {
        Self {
            timezone: row.timezone,
            default_payment_method_id: row.default_payment_method_id,
            customer_id: row.stripe_customer_id,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = penalties)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct PenaltyRow {
    pub id: Uuid,
    pub habit_id: Uuid,
    pub user_id: Uuid,
    pub amount_minor: i64,
    pub penalty_date: NaiveDate,
    pub is_paid: bool,
    pub payment_intent_id: Option<String>,
    pub payment_method_id: Option<String>,
    pub payment_status: String,
    pub retry_count: i32,
    pub last_retry_date: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PenaltyRow> for Penalty {
    type Error = String;

    fn try_from(row: PenaltyRow) -> Result<Self, Self::Error> {
        let payment_status = row
            .payment_status
            .parse::<PaymentStatus>()
            .map_err(|err| format!("penalty {}: {err}", row.id))?;
        let amount =
            amount_from_db(row.amount_minor).map_err(|err| format!("penalty {}: {err}", row.id))?;
        Ok(Self {
            id: PenaltyId::from_uuid(row.id),
            habit_id: HabitId::from_uuid(row.habit_id),
            user_id: UserId::from_uuid(row.user_id),
            amount,
            penalty_date: row.penalty_date,
            is_paid: row.is_paid,
            payment_intent_id: row.payment_intent_id,
            payment_method_id: row.payment_method_id,
            payment_status,
            retry_count: counter_from_db(row.retry_count),
            last_retry_date: row.last_retry_date,
            last_attempt_at: row.last_attempt_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = penalties)]
pub(crate) struct NewPenaltyRow<'a> {
    pub id: Uuid,
    pub habit_id: Uuid,
    pub user_id: Uuid,
    pub amount_minor: i64,
    pub penalty_date: NaiveDate,
    pub is_paid: bool,
    pub payment_status: &'a str,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
}

impl<'a> TryFrom<&'a NewPenalty> for NewPenaltyRow<'a> {
    type Error = String;

    fn try_from(penalty: &'a NewPenalty) -> Result<Self, Self::Error> {
        let amount_minor = i64::try_from(penalty.amount.minor_units())
            .map_err(|_| format!("penalty {}: amount exceeds storage range", penalty.id))?;
        Ok(Self {
            id: *penalty.id.as_uuid(),
            habit_id: *penalty.habit_id.as_uuid(),
            user_id: *penalty.user_id.as_uuid(),
            amount_minor,
            penalty_date: penalty.penalty_date,
            is_paid: false,
            payment_status: PaymentStatus::None.as_str(),
            retry_count: 0,
            created_at: penalty.created_at,
        })
    }
}

fn amount_from_db(minor: i64) -> Result<PenaltyAmount, String> {
    let minor = u64::try_from(minor).map_err(|_| format!("negative amount {minor}"))?;
    PenaltyAmount::from_minor_units(minor).map_err(|err| err.to_string())
}
