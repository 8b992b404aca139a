//! Driven port for the external payment processor.
//!
//! The domain owns the request shape and the error taxonomy so orchestration
//! stays adapter-agnostic. Adapters map processor responses into these types.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::define_port_error;

/// Card error code signalling that the customer must authenticate the charge.
pub const AUTHENTICATION_REQUIRED_CODE: &str = "authentication_required";

/// Domain-owned payment intent request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntentRequest {
    /// Amount in minor currency units.
    pub amount_minor_units: u64,
    /// ISO currency code, lower case.
    pub currency: String,
    /// Payment method to charge.
    pub payment_method_id: Option<String>,
    /// Processor customer owning the payment method.
    pub customer_id: Option<String>,
    /// Confirm the intent immediately.
    pub confirm: bool,
    /// Charge without the customer present.
    pub off_session: bool,
    /// Reconciliation metadata (`penalty_id`, `user_id`).
    pub metadata: BTreeMap<String, String>,
    /// Key letting the processor collapse duplicate submissions of one attempt.
    pub idempotency_key: String,
}

/// Processor-side lifecycle state of a payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentIntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    /// A status this adapter does not recognise.
    Other(String),
}

impl PaymentIntentStatus {
    /// Parse the processor's status label.
    pub fn from_label(label: &str) -> Self {
        match label {
            "requires_payment_method" => Self::RequiresPaymentMethod,
            "requires_confirmation" => Self::RequiresConfirmation,
            "requires_action" => Self::RequiresAction,
            "processing" => Self::Processing,
            "requires_capture" => Self::RequiresCapture,
            "canceled" => Self::Canceled,
            "succeeded" => Self::Succeeded,
            other => Self::Other(other.to_owned()),
        }
    }
}

/// Payment intent identity and status returned by the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: String,
    pub status: PaymentIntentStatus,
}

define_port_error! {
    /// Errors surfaced while calling the payment processor.
    pub enum PaymentProcessorError {
        /// The card issuer requires customer authentication.
        AuthenticationRequired { message: String } =>
            "payment requires authentication: {message}",
        /// Any other card-level error (declines, expired cards, ...).
        Card { code: String, message: String } =>
            "card error {code}: {message}",
        /// The call exceeded its timeout.
        Timeout { message: String } =>
            "payment processor timeout: {message}",
        /// Network transport failed or the processor was unavailable.
        Transport { message: String } =>
            "payment processor transport failed: {message}",
        /// The processor rejected the request for a non-card reason.
        Api { message: String } =>
            "payment processor rejected request: {message}",
        /// The processor response could not be decoded.
        Decode { message: String } =>
            "payment processor response decode failed: {message}",
    }
}

impl PaymentProcessorError {
    /// Build the card error for `code`, promoting authentication requests.
    ///
    /// # Examples
    /// ```
    /// use penalty_engine::domain::ports::PaymentProcessorError;
    ///
    /// let err = PaymentProcessorError::from_card_code("authentication_required", "3DS");
    /// assert!(matches!(err, PaymentProcessorError::AuthenticationRequired { .. }));
    /// ```
    pub fn from_card_code(code: &str, message: impl Into<String>) -> Self {
        if code == AUTHENTICATION_REQUIRED_CODE {
            Self::authentication_required(message)
        } else {
            Self::card(code, message)
        }
    }

    /// True for errors the card issuer declared, as opposed to transport or
    /// protocol failures.
    pub fn is_card_error(&self) -> bool {
        matches!(self, Self::AuthenticationRequired { .. } | Self::Card { .. })
    }
}

/// Port for creating and inspecting payment intents.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Create (and, when requested, confirm) a payment intent.
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, PaymentProcessorError>;

    /// Fetch the current state of an existing payment intent.
    async fn retrieve_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent, PaymentProcessorError>;
}

/// Fixture processor that accepts every charge.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixturePaymentProcessor;

#[async_trait]
impl PaymentProcessor for FixturePaymentProcessor {
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, PaymentProcessorError> {
        Ok(PaymentIntent {
            id: format!("pi_fixture_{}", request.idempotency_key),
            status: PaymentIntentStatus::Processing,
        })
    }

    async fn retrieve_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent, PaymentProcessorError> {
        Ok(PaymentIntent {
            id: payment_intent_id.to_owned(),
            status: PaymentIntentStatus::Succeeded,
        })
    }
}
