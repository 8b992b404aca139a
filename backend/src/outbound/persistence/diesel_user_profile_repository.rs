//! PostgreSQL-backed `UserProfileRepository`.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{UserProfileRepository, UserProfileRepositoryError};
use crate::domain::{UserId, UserPaymentProfile};

use super::diesel_helpers::{map_diesel_error, map_pool_error};
use super::models::UserProfileRow;
use super::pool::DbPool;
use super::schema::users;

#[derive(Clone)]
pub struct DieselUserProfileRepository {
    pool: DbPool,
}

impl DieselUserProfileRepository {
    /// Create a repository backed by `pool`.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserProfileRepository for DieselUserProfileRepository {
    async fn find_profile(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UserPaymentProfile>, UserProfileRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: Option<UserProfileRow> = users::table
            .filter(users::id.eq(user_id.as_uuid()))
            .select(UserProfileRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        Ok(row.map(UserPaymentProfile::from))
    }
}
