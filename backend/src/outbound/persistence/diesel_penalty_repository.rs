//! PostgreSQL-backed `PenaltyRepository`.
//!
//! Uniqueness of one penalty per habit and local day is enforced by the
//! `penalties_habit_date_key` constraint; inserts use `ON CONFLICT DO NOTHING`
//! on those columns so concurrent batch runs resolve to a single row.
//!
//! Status updates are single-statement writes. `retry_count` is incremented
//! in SQL, never read-modify-written, so overlapping sweeps cannot lose an
//! increment.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{
    FailedAttemptUpdate, PenaltyRepository, PenaltyRepositoryError, ProcessingUpdate,
    RetryCandidateQuery, SettlementUpdate,
};
use crate::domain::{HabitId, NewPenalty, PaymentStatus, Penalty, PenaltyId};

use super::diesel_helpers::{limit_for_db, map_diesel_error, map_pool_error};
use super::models::{NewPenaltyRow, PenaltyRow};
use super::pool::DbPool;
use super::schema::{habits, penalties, users};

/// Diesel implementation of the penalty ledger port.
#[derive(Clone)]
pub struct DieselPenaltyRepository {
    pool: DbPool,
}

impl DieselPenaltyRepository {
    /// Create a repository backed by `pool`.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn to_domain(row: PenaltyRow) -> Result<Penalty, PenaltyRepositoryError> {
    Penalty::try_from(row).map_err(PenaltyRepositoryError::corrupt)
}

fn collect_penalties(rows: Vec<PenaltyRow>) -> Result<Vec<Penalty>, PenaltyRepositoryError> {
    rows.into_iter().map(to_domain).collect()
}

fn expect_one_row(updated: usize, penalty_id: &PenaltyId) -> Result<(), PenaltyRepositoryError> {
    if updated == 0 {
        return Err(PenaltyRepositoryError::not_found(penalty_id.to_string()));
    }
    Ok(())
}

fn retry_count_cap(max_retries: u32) -> i32 {
    i32::try_from(max_retries).unwrap_or(i32::MAX)
}

#[async_trait]
impl PenaltyRepository for DieselPenaltyRepository {
    async fn find_by_habit_and_date(
        &self,
        habit_id: &HabitId,
        penalty_date: NaiveDate,
    ) -> Result<Option<Penalty>, PenaltyRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: Option<PenaltyRow> = penalties::table
            .filter(penalties::habit_id.eq(habit_id.as_uuid()))
            .filter(penalties::penalty_date.eq(penalty_date))
            .select(PenaltyRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        row.map(to_domain).transpose()
    }

    async fn insert_if_absent(
        &self,
        penalty: &NewPenalty,
    ) -> Result<Option<Penalty>, PenaltyRepositoryError> {
        let new_row = NewPenaltyRow::try_from(penalty).map_err(PenaltyRepositoryError::corrupt)?;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let inserted: Option<PenaltyRow> = diesel::insert_into(penalties::table)
            .values(&new_row)
            .on_conflict((penalties::habit_id, penalties::penalty_date))
            .do_nothing()
            .returning(PenaltyRow::as_returning())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        inserted.map(to_domain).transpose()
    }

    async fn mark_processing(
        &self,
        update: &ProcessingUpdate,
    ) -> Result<(), PenaltyRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let updated = diesel::update(penalties::table.find(update.penalty_id.as_uuid()))
            .set((
                penalties::payment_intent_id.eq(Some(update.payment_intent_id.as_str())),
                penalties::payment_method_id.eq(Some(update.payment_method_id.as_str())),
                penalties::payment_status.eq(PaymentStatus::Processing.as_str()),
                penalties::last_attempt_at.eq(Some(update.attempted_at)),
            ))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        expect_one_row(updated, &update.penalty_id)
    }

    async fn mark_attempt_failed(
        &self,
        update: &FailedAttemptUpdate,
    ) -> Result<(), PenaltyRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let updated = diesel::update(penalties::table.find(update.penalty_id.as_uuid()))
            .set((
                penalties::payment_status.eq(update.status.as_str()),
                penalties::retry_count.eq(penalties::retry_count + 1),
                penalties::last_retry_date.eq(Some(update.attempted_at)),
                penalties::last_attempt_at.eq(Some(update.attempted_at)),
            ))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        expect_one_row(updated, &update.penalty_id)
    }

    async fn apply_settlement(
        &self,
        update: &SettlementUpdate,
    ) -> Result<(), PenaltyRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let updated = diesel::update(penalties::table.find(update.penalty_id.as_uuid()))
            .set((
                penalties::payment_status.eq(update.status.as_str()),
                penalties::is_paid.eq(update.is_paid),
            ))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        expect_one_row(updated, &update.penalty_id)
    }

    async fn list_retry_candidates(
        &self,
        query: &RetryCandidateQuery,
    ) -> Result<Vec<Penalty>, PenaltyRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let rows: Vec<PenaltyRow> = penalties::table
            .inner_join(habits::table.inner_join(users::table))
            .filter(penalties::is_paid.eq(false))
            .filter(penalties::retry_count.lt(retry_count_cap(query.max_retries)))
            .filter(
                penalties::payment_status
                    .eq(PaymentStatus::Failed.as_str())
                    .and(
                        penalties::last_retry_date
                            .is_null()
                            .or(penalties::last_retry_date.le(query.due_at_or_before)),
                    )
                    .or(penalties::payment_status
                        .eq(PaymentStatus::None.as_str())
                        .and(penalties::last_attempt_at.is_null())
                        .and(penalties::created_at.le(query.due_at_or_before))),
            )
            .filter(habits::is_active.eq(true))
            .filter(habits::auto_pay_enabled.eq(true))
            .filter(users::default_payment_method_id.is_not_null())
            .filter(users::default_payment_method_id.ne(""))
            .select(PenaltyRow::as_select())
            .order_by(penalties::created_at.asc())
            .limit(limit_for_db(query.limit))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        collect_penalties(rows)
    }

    async fn list_processing_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Penalty>, PenaltyRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let rows: Vec<PenaltyRow> = penalties::table
            .filter(penalties::payment_status.eq(PaymentStatus::Processing.as_str()))
            .filter(
                penalties::last_attempt_at.le(cutoff).or(penalties::last_attempt_at
                    .is_null()
                    .and(penalties::created_at.le(cutoff))),
            )
            .select(PenaltyRow::as_select())
            .order_by(penalties::created_at.asc())
            .limit(limit_for_db(limit))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        collect_penalties(rows)
    }
}
