//! PostgreSQL-backed `VerificationRepository` over `habit_logs`.

use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::HabitId;
use crate::domain::ports::{VerificationRepository, VerificationRepositoryError};

use super::diesel_helpers::{map_diesel_error, map_pool_error};
use super::pool::DbPool;
use super::schema::habit_logs;

/// Diesel implementation of the verification lookup port.
///
/// Unverified submissions are ignored; only `verified = true` rows count.
#[derive(Clone)]
pub struct DieselVerificationRepository {
    pool: DbPool,
}

impl DieselVerificationRepository {
    /// Create a repository backed by `pool`.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VerificationRepository for DieselVerificationRepository {
    async fn latest_verified_date(
        &self,
        habit_id: &HabitId,
    ) -> Result<Option<NaiveDate>, VerificationRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        habit_logs::table
            .filter(habit_logs::habit_id.eq(habit_id.as_uuid()))
            .filter(habit_logs::verified.eq(true))
            .select(habit_logs::log_date)
            .order_by(habit_logs::log_date.desc())
            .first::<NaiveDate>(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)
    }
}
