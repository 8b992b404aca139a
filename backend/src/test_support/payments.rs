//! Scripted payment processor and recording notifier.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::ports::{
    MissNotifier, MissNotifierError, PaymentIntent, PaymentIntentRequest, PaymentIntentStatus,
    PaymentProcessor, PaymentProcessorError,
};
use crate::domain::{Habit, Penalty, PenaltyId};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(_) => panic!("test double mutex"),
    }
}

#[derive(Default)]
struct ProcessorState {
    scripted: VecDeque<Result<PaymentIntent, PaymentProcessorError>>,
    requests: Vec<PaymentIntentRequest>,
    statuses: HashMap<String, PaymentIntentStatus>,
    created: usize,
}

/// Processor that replays scripted results and records every request.
///
/// Unscripted creations succeed with a fresh `processing` intent. Lookups
/// return the status set through [`ScriptedPaymentProcessor::set_status`],
/// defaulting to `processing`.
#[derive(Default)]
pub struct ScriptedPaymentProcessor(Mutex<ProcessorState>);

impl ScriptedPaymentProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next creation call.
    pub fn push_result(&self, result: Result<PaymentIntent, PaymentProcessorError>) {
        lock(&self.0).scripted.push_back(result);
    }

    pub fn set_status(&self, payment_intent_id: &str, status: PaymentIntentStatus) {
        lock(&self.0)
            .statuses
            .insert(payment_intent_id.to_owned(), status);
    }

    pub fn requests(&self) -> Vec<PaymentIntentRequest> {
        lock(&self.0).requests.clone()
    }
}

#[async_trait]
impl PaymentProcessor for ScriptedPaymentProcessor {
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, PaymentProcessorError> {
        let mut state = lock(&self.0);
        state.requests.push(request.clone());
        if let Some(result) = state.scripted.pop_front() {
            return result;
        }
        state.created += 1;
        Ok(PaymentIntent {
            id: format!("pi_test_{}", state.created),
            status: PaymentIntentStatus::Processing,
        })
    }

    async fn retrieve_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent, PaymentProcessorError> {
        let status = lock(&self.0)
            .statuses
            .get(payment_intent_id)
            .cloned()
            .unwrap_or(PaymentIntentStatus::Processing);
        Ok(PaymentIntent {
            id: payment_intent_id.to_owned(),
            status,
        })
    }
}

/// Notifier that records every announced penalty.
#[derive(Default)]
pub struct RecordingNotifier {
    announced: Mutex<Vec<PenaltyId>>,
    failing: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier that records and then reports a delivery failure.
    pub fn failing() -> Self {
        Self {
            announced: Mutex::default(),
            failing: true,
        }
    }

    pub fn announced(&self) -> Vec<PenaltyId> {
        lock(&self.announced).clone()
    }
}

#[async_trait]
impl MissNotifier for RecordingNotifier {
    async fn penalty_created(
        &self,
        _habit: &Habit,
        penalty: &Penalty,
    ) -> Result<(), MissNotifierError> {
        lock(&self.announced).push(penalty.id);
        if self.failing {
            return Err(MissNotifierError::delivery("partner channel offline"));
        }
        Ok(())
    }
}
