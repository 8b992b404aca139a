//! Driven port for reading habits.
//!
//! Habits are managed elsewhere; the engine needs the active set for the daily
//! detection pass and single lookups when re-checking payment preconditions.

use async_trait::async_trait;

use crate::domain::{Habit, HabitId};

use super::define_port_error;

define_port_error! {
    /// Errors raised while reading habits.
    pub enum HabitRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "habit repository connection failed: {message}",
        /// Query failed during execution.
        Query { message: String } => "habit repository query failed: {message}",
        /// A stored row violates habit invariants.
        Corrupt { message: String } => "habit row is invalid: {message}",
    }
}

/// Port for habit reads.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HabitRepository: Send + Sync {
    /// List every active habit.
    async fn list_active(&self) -> Result<Vec<Habit>, HabitRepositoryError>;

    /// Look up one habit regardless of its active flag.
    async fn find(&self, habit_id: &HabitId) -> Result<Option<Habit>, HabitRepositoryError>;
}

/// Fixture implementation with no habits.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureHabitRepository;

#[async_trait]
impl HabitRepository for FixtureHabitRepository {
    async fn list_active(&self) -> Result<Vec<Habit>, HabitRepositoryError> {
        Ok(Vec::new())
    }

    async fn find(&self, _habit_id: &HabitId) -> Result<Option<Habit>, HabitRepositoryError> {
        Ok(None)
    }
}
