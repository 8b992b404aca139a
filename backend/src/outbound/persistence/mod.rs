//! PostgreSQL persistence adapters using Diesel ORM.
//!
//! Concrete implementations of the engine's repository ports, backed by
//! PostgreSQL through `diesel-async` and a `bb8` connection pool.
//!
//! Repositories only translate between Diesel rows and domain types. Row
//! structs (`models.rs`) and table definitions (`schema.rs`) stay private to
//! this module, and every database failure is mapped onto the owning port's
//! error enum.
//!
//! # Example
//!
//! ```ignore
//! use penalty_engine::outbound::persistence::{DbPool, DieselPenaltyRepository, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/penalties")).await?;
//! let penalties = DieselPenaltyRepository::new(pool);
//! ```

pub(crate) mod diesel_helpers;
mod diesel_habit_repository;
mod diesel_penalty_repository;
mod diesel_user_profile_repository;
mod diesel_verification_repository;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_habit_repository::DieselHabitRepository;
pub use diesel_penalty_repository::DieselPenaltyRepository;
pub use diesel_user_profile_repository::DieselUserProfileRepository;
pub use diesel_verification_repository::DieselVerificationRepository;
pub use migrations::{MigrationError, run_pending_migrations};
pub use pool::{DbPool, PoolConfig, PoolError};
