//! PostgreSQL-backed `HabitRepository`.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{HabitRepository, HabitRepositoryError};
use crate::domain::{Habit, HabitId};

use super::diesel_helpers::{map_diesel_error, map_pool_error};
use super::models::HabitRow;
use super::pool::DbPool;
use super::schema::habits;

/// Diesel implementation of the habit read port.
#[derive(Clone)]
pub struct DieselHabitRepository {
    pool: DbPool,
}

impl DieselHabitRepository {
    /// Create a repository backed by `pool`.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn to_domain(row: HabitRow) -> Result<Habit, HabitRepositoryError> {
    Habit::try_from(row).map_err(HabitRepositoryError::corrupt)
}

#[async_trait]
impl HabitRepository for DieselHabitRepository {
    async fn list_active(&self) -> Result<Vec<Habit>, HabitRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let rows: Vec<HabitRow> = habits::table
            .filter(habits::is_active.eq(true))
            .select(HabitRow::as_select())
            .order_by(habits::created_at.asc())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        rows.into_iter().map(to_domain).collect()
    }

    async fn find(&self, habit_id: &HabitId) -> Result<Option<Habit>, HabitRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: Option<HabitRow> = habits::table
            .filter(habits::id.eq(habit_id.as_uuid()))
            .select(HabitRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        row.map(to_domain).transpose()
    }
}
