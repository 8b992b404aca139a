//! Batch summaries returned by the engine.

use crate::domain::occurrence::NoActionReason;
use crate::domain::payment_orchestrator::{ChargeOutcome, ChargeTally};

/// What the daily check did with one habit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum HabitOutcome {
    NoAction(NoActionReason),
    AlreadyRecorded,
    /// An existing penalty that was never charged got its first attempt.
    Resumed {
        /// `None` when the charge could not be run or recorded.
        charge: Option<ChargeOutcome>,
    },
    Created {
        notified: bool,
        /// `None` when the charge could not be run or recorded.
        charge: Option<ChargeOutcome>,
    },
}

/// Summary of one penalty check run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PenaltyCheckReport {
    /// Active habits evaluated.
    pub habits_scanned: usize,
    /// Habits with a missed required day.
    pub misses: usize,
    pub penalties_created: usize,
    /// Misses that already had a penalty.
    pub duplicates: usize,
    /// Existing penalties charged for the first time on this run.
    pub resumed: usize,
    /// Habits that needed no penalty.
    pub no_action: usize,
    pub notifier_failures: usize,
    pub charges: ChargeTally,
    /// Habits whose processing failed.
    pub errors: usize,
}

impl PenaltyCheckReport {
    pub(super) fn record(&mut self, outcome: &HabitOutcome) {
        match outcome {
            HabitOutcome::NoAction(_) => self.no_action += 1,
            HabitOutcome::AlreadyRecorded => {
                self.misses += 1;
                self.duplicates += 1;
            }
            HabitOutcome::Resumed { charge } => {
                self.misses += 1;
                self.duplicates += 1;
                self.resumed += 1;
                self.record_charge(charge.as_ref());
            }
            HabitOutcome::Created { notified, charge } => {
                self.misses += 1;
                self.penalties_created += 1;
                if !notified {
                    self.notifier_failures += 1;
                }
                self.record_charge(charge.as_ref());
            }
        }
    }

    fn record_charge(&mut self, charge: Option<&ChargeOutcome>) {
        match charge {
            Some(outcome) => self.charges.record(outcome),
            None => self.errors += 1,
        }
    }

    pub(super) fn record_error(&mut self) {
        self.errors += 1;
    }
}
