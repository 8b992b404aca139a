//! DTOs for decoding Stripe Payment Intents responses.

use serde::Deserialize;

use crate::domain::ports::{PaymentIntent, PaymentIntentStatus, PaymentProcessorError};

#[derive(Debug, Deserialize)]
pub(super) struct PaymentIntentDto {
    pub(super) id: String,
    pub(super) status: String,
}

impl From<PaymentIntentDto> for PaymentIntent {
    fn from(dto: PaymentIntentDto) -> Self {
        Self {
            id: dto.id,
            status: PaymentIntentStatus::from_label(&dto.status),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ErrorEnvelopeDto {
    pub(super) error: StripeErrorDto,
}

/// Body of a Stripe `error` object. Every field is optional on the wire.
#[derive(Debug, Default, Deserialize)]
pub(super) struct StripeErrorDto {
    #[serde(rename = "type")]
    pub(super) kind: Option<String>,
    pub(super) code: Option<String>,
    pub(super) decline_code: Option<String>,
    pub(super) message: Option<String>,
}

impl StripeErrorDto {
    /// Card errors carry the issuer's verdict; anything else is an API failure.
    pub(super) fn into_card_error(self) -> Option<PaymentProcessorError> {
        if self.kind.as_deref() != Some("card_error") {
            return None;
        }
        let code = self
            .code
            .or(self.decline_code)
            .unwrap_or_else(|| "card_declined".to_owned());
        let message = self.message.unwrap_or_else(|| code.clone());
        Some(PaymentProcessorError::from_card_code(&code, message))
    }

    pub(super) fn summary(&self) -> Option<String> {
        match (&self.kind, &self.message) {
            (Some(kind), Some(message)) => Some(format!("{kind}: {message}")),
            (None, Some(message)) => Some(message.clone()),
            (Some(kind), None) => Some(kind.clone()),
            (None, None) => None,
        }
    }
}
