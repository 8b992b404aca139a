//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod habit_repository;
mod miss_notifier;
mod payment_processor;
mod penalty_repository;
mod user_profile_repository;
mod verification_repository;

#[cfg(test)]
pub use habit_repository::MockHabitRepository;
pub use habit_repository::{FixtureHabitRepository, HabitRepository, HabitRepositoryError};
#[cfg(test)]
pub use miss_notifier::MockMissNotifier;
pub use miss_notifier::{MissNotifier, MissNotifierError, NoOpMissNotifier};
#[cfg(test)]
pub use payment_processor::MockPaymentProcessor;
pub use payment_processor::{
    AUTHENTICATION_REQUIRED_CODE, FixturePaymentProcessor, PaymentIntent, PaymentIntentRequest,
    PaymentIntentStatus, PaymentProcessor, PaymentProcessorError,
};
#[cfg(test)]
pub use penalty_repository::MockPenaltyRepository;
pub use penalty_repository::{
    FailedAttemptUpdate, FixturePenaltyRepository, PenaltyRepository, PenaltyRepositoryError,
    ProcessingUpdate, RetryCandidateQuery, SettlementUpdate,
};
#[cfg(test)]
pub use user_profile_repository::MockUserProfileRepository;
pub use user_profile_repository::{
    FixtureUserProfileRepository, UserProfileRepository, UserProfileRepositoryError,
};
#[cfg(test)]
pub use verification_repository::MockVerificationRepository;
pub use verification_repository::{
    FixtureVerificationRepository, VerificationRepository, VerificationRepositoryError,
};
