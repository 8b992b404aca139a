//! Driven port notified when a miss produces a new penalty.
//!
//! Delivery (accountability partner message, push notification, ...) lives
//! outside the engine. Notifier failures never affect penalty processing.

use async_trait::async_trait;

use crate::domain::{Habit, Penalty};

use super::define_port_error;

define_port_error! {
    /// Errors raised by notifier adapters.
    pub enum MissNotifierError {
        /// The notification could not be delivered.
        Delivery { message: String } => "miss notification failed: {message}",
    }
}

/// Port invoked once per newly created penalty.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MissNotifier: Send + Sync {
    /// Announce that `habit` produced `penalty`.
    async fn penalty_created(
        &self,
        habit: &Habit,
        penalty: &Penalty,
    ) -> Result<(), MissNotifierError>;
}

/// Notifier that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMissNotifier;

#[async_trait]
impl MissNotifier for NoOpMissNotifier {
    async fn penalty_created(
        &self,
        _habit: &Habit,
        _penalty: &Penalty,
    ) -> Result<(), MissNotifierError> {
        Ok(())
    }
}
