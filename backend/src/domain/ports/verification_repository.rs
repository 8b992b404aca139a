//! Driven port for reading habit verification entries.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::HabitId;

use super::define_port_error;

define_port_error! {
    /// Errors raised while reading verification entries.
    pub enum VerificationRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "verification repository connection failed: {message}",
        /// Query failed during execution.
        Query { message: String } => "verification repository query failed: {message}",
    }
}

/// Port for verification lookups.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VerificationRepository: Send + Sync {
    /// Return the date of the most recent verified entry for `habit_id`.
    ///
    /// Dates are stored without zone information and denote the owner's local
    /// calendar day.
    async fn latest_verified_date(
        &self,
        habit_id: &HabitId,
    ) -> Result<Option<NaiveDate>, VerificationRepositoryError>;
}

/// Fixture implementation with no submissions.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureVerificationRepository;

#[async_trait]
impl VerificationRepository for FixtureVerificationRepository {
    async fn latest_verified_date(
        &self,
        _habit_id: &HabitId,
    ) -> Result<Option<NaiveDate>, VerificationRepositoryError> {
        Ok(None)
    }
}
