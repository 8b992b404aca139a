//! Driven port for reading user payment profiles.

use async_trait::async_trait;

use crate::domain::{UserId, UserPaymentProfile};

use super::define_port_error;

define_port_error! {
    /// Errors raised while reading user payment profiles.
    pub enum UserProfileRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "user profile connection failed: {message}",
        /// Query failed during execution.
        Query { message: String } => "user profile query failed: {message}",
    }
}

/// Port for payment profile lookups.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserProfileRepository: Send + Sync {
    /// Fetch the payment profile for `user_id`, if the user exists.
    async fn find_profile(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UserPaymentProfile>, UserProfileRepositoryError>;
}

/// Fixture implementation that knows no users.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureUserProfileRepository;

#[async_trait]
impl UserProfileRepository for FixtureUserProfileRepository {
    async fn find_profile(
        &self,
        _user_id: &UserId,
    ) -> Result<Option<UserPaymentProfile>, UserProfileRepositoryError> {
        Ok(None)
    }
}
