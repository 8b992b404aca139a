//! Reqwest-backed Stripe payment processor.
//!
//! This adapter owns transport details only: form encoding, authentication,
//! idempotency headers, HTTP error mapping and JSON decoding into domain
//! payment intents.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tracing::debug;
use zeroize::Zeroizing;

use super::dto::{ErrorEnvelopeDto, PaymentIntentDto};
use crate::domain::ports::{
    PaymentIntent, PaymentIntentRequest, PaymentProcessor, PaymentProcessorError,
};

/// Production Stripe API origin.
pub const STRIPE_API_BASE: &str = "https://api.stripe.com/";

const PAYMENT_INTENTS_PATH: &str = "v1/payment_intents";
const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Stripe adapter performing authenticated HTTPS calls against one API origin.
pub struct StripeHttpProcessor {
    client: Client,
    base_url: Url,
    secret_key: Zeroizing<String>,
}

impl StripeHttpProcessor {
    /// Build an adapter with a reqwest client bounded by `timeout`.
    ///
    /// `base_url` is normally [`STRIPE_API_BASE`]; tests and stripe-mock
    /// deployments point it elsewhere.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(
        base_url: Url,
        secret_key: Zeroizing<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: with_trailing_slash(base_url),
            secret_key,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, PaymentProcessorError> {
        self.base_url
            .join(path)
            .map_err(|err| PaymentProcessorError::api(format!("invalid endpoint {path}: {err}")))
    }

    async fn decode_response(
        response: reqwest::Response,
    ) -> Result<PaymentIntent, PaymentProcessorError> {
        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, body.as_ref()));
        }
        parse_payment_intent(body.as_ref())
    }
}

#[async_trait]
impl PaymentProcessor for StripeHttpProcessor {
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, PaymentProcessorError> {
        let endpoint = self.endpoint(PAYMENT_INTENTS_PATH)?;
        debug!(
            idempotency_key = %request.idempotency_key,
            amount = request.amount_minor_units,
            "creating payment intent"
        );
        let response = self
            .client
            .post(endpoint)
            .bearer_auth(self.secret_key.as_str())
            .header(IDEMPOTENCY_HEADER, request.idempotency_key.as_str())
            .form(&form_fields(request))
            .send()
            .await
            .map_err(map_transport_error)?;

        Self::decode_response(response).await
    }

    async fn retrieve_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent, PaymentProcessorError> {
        if !is_valid_object_id(payment_intent_id) {
            return Err(PaymentProcessorError::api(format!(
                "malformed payment intent id '{payment_intent_id}'"
            )));
        }
        let endpoint = self.endpoint(&format!("{PAYMENT_INTENTS_PATH}/{payment_intent_id}"))?;
        let response = self
            .client
            .get(endpoint)
            .bearer_auth(self.secret_key.as_str())
            .send()
            .await
            .map_err(map_transport_error)?;

        Self::decode_response(response).await
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Stripe object ids are ASCII alphanumerics and underscores.
fn is_valid_object_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Encode a request as Stripe's bracketed form fields.
fn form_fields(request: &PaymentIntentRequest) -> Vec<(String, String)> {
    let mut fields = vec![
        ("amount".to_owned(), request.amount_minor_units.to_string()),
        ("currency".to_owned(), request.currency.clone()),
    ];
    if let Some(payment_method) = &request.payment_method_id {
        fields.push(("payment_method".to_owned(), payment_method.clone()));
    }
    if let Some(customer) = &request.customer_id {
        fields.push(("customer".to_owned(), customer.clone()));
    }
    if request.confirm {
        fields.push(("confirm".to_owned(), "true".to_owned()));
    }
    if request.off_session {
        fields.push(("off_session".to_owned(), "true".to_owned()));
    }
    fields.extend(
        request
            .metadata
            .iter()
            .map(|(key, value)| (format!("metadata[{key}]"), value.clone())),
    );
    fields
}

fn parse_payment_intent(body: &[u8]) -> Result<PaymentIntent, PaymentProcessorError> {
    let decoded: PaymentIntentDto = serde_json::from_slice(body).map_err(|error| {
        PaymentProcessorError::decode(format!("invalid payment intent payload: {error}"))
    })?;
    Ok(decoded.into())
}

fn map_transport_error(error: reqwest::Error) -> PaymentProcessorError {
    if error.is_timeout() {
        PaymentProcessorError::timeout(error.to_string())
    } else {
        PaymentProcessorError::transport(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> PaymentProcessorError {
    let stripe_error = serde_json::from_slice::<ErrorEnvelopeDto>(body)
        .map(|envelope| envelope.error)
        .unwrap_or_default();
    let detail = stripe_error.summary();
    if let Some(card_error) = stripe_error.into_card_error() {
        return card_error;
    }

    let message = match detail {
        Some(detail) => format!("status {}: {detail}", status.as_u16()),
        None => format!("status {}", status.as_u16()),
    };
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            PaymentProcessorError::timeout(message)
        }
        StatusCode::TOO_MANY_REQUESTS => PaymentProcessorError::transport(message),
        _ if status.is_client_error() => PaymentProcessorError::api(message),
        _ => PaymentProcessorError::transport(message),
    }
}

#[cfg(test)]
mod tests {
    //! Coverage for non-network request encoding and response mapping.

    use std::collections::BTreeMap;

    use super::*;
    use crate::domain::ports::PaymentIntentStatus;
    use rstest::rstest;

    fn request() -> PaymentIntentRequest {
        PaymentIntentRequest {
            amount_minor_units: 1250,
            currency: "usd".to_owned(),
            payment_method_id: Some("pm_card_visa".to_owned()),
            customer_id: Some("cus_123".to_owned()),
            confirm: true,
            off_session: true,
            metadata: BTreeMap::from([
                ("penalty_id".to_owned(), "pen-1".to_owned()),
                ("user_id".to_owned(), "user-1".to_owned()),
            ]),
            idempotency_key: "penalty-pen-1-attempt-0".to_owned(),
        }
    }

    fn field<'a>(fields: &'a [(String, String)], name: &str) -> Option<&'a str> {
        fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    #[test]
    fn encodes_off_session_confirmation_with_metadata() {
        let fields = form_fields(&request());

        assert_eq!(field(&fields, "amount"), Some("1250"));
        assert_eq!(field(&fields, "currency"), Some("usd"));
        assert_eq!(field(&fields, "payment_method"), Some("pm_card_visa"));
        assert_eq!(field(&fields, "customer"), Some("cus_123"));
        assert_eq!(field(&fields, "confirm"), Some("true"));
        assert_eq!(field(&fields, "off_session"), Some("true"));
        assert_eq!(field(&fields, "metadata[penalty_id]"), Some("pen-1"));
        assert_eq!(field(&fields, "metadata[user_id]"), Some("user-1"));
    }

    #[test]
    fn omits_absent_customer() {
        let mut request = request();
        request.customer_id = None;

        assert_eq!(field(&form_fields(&request), "customer"), None);
    }

    #[test]
    fn decodes_payment_intent_status() {
        let body = br#"{"id":"pi_123","object":"payment_intent","status":"processing"}"#;

        let intent = parse_payment_intent(body).expect("payload decodes");

        assert_eq!(intent.id, "pi_123");
        assert_eq!(intent.status, PaymentIntentStatus::Processing);
    }

    #[test]
    fn undecodable_success_body_is_a_decode_error() {
        let error = parse_payment_intent(b"<html>").expect_err("decode fails");
        assert!(matches!(error, PaymentProcessorError::Decode { .. }));
    }

    #[test]
    fn authentication_required_card_error_is_promoted() {
        let body = br#"{"error":{"type":"card_error","code":"authentication_required",
            "message":"This payment requires authentication."}}"#;

        let error = map_status_error(StatusCode::PAYMENT_REQUIRED, body);

        assert!(matches!(
            error,
            PaymentProcessorError::AuthenticationRequired { .. }
        ));
    }

    #[test]
    fn decline_code_is_used_when_code_is_missing() {
        let body = br#"{"error":{"type":"card_error","decline_code":"insufficient_funds"}}"#;

        let error = map_status_error(StatusCode::PAYMENT_REQUIRED, body);

        assert!(matches!(
            error,
            PaymentProcessorError::Card { ref code, .. } if code == "insufficient_funds"
        ));
    }

    #[rstest]
    #[case::rate_limited(StatusCode::TOO_MANY_REQUESTS, "Transport")]
    #[case::request_timeout(StatusCode::REQUEST_TIMEOUT, "Timeout")]
    #[case::gateway_timeout(StatusCode::GATEWAY_TIMEOUT, "Timeout")]
    #[case::bad_request(StatusCode::BAD_REQUEST, "Api")]
    #[case::unauthorised(StatusCode::UNAUTHORIZED, "Api")]
    #[case::server_error(StatusCode::INTERNAL_SERVER_ERROR, "Transport")]
    fn maps_http_statuses_to_domain_errors(#[case] status: StatusCode, #[case] expected: &str) {
        let body = br#"{"error":{"type":"invalid_request_error","message":"No such customer"}}"#;
        let error = map_status_error(status, body);
        let matched = match expected {
            "Transport" => matches!(error, PaymentProcessorError::Transport { .. }),
            "Timeout" => matches!(error, PaymentProcessorError::Timeout { .. }),
            "Api" => matches!(error, PaymentProcessorError::Api { .. }),
            _ => panic!("unsupported test expectation: {expected}"),
        };
        assert!(matched, "{status} should map to {expected}, got {error:?}");
    }

    #[test]
    fn status_message_keeps_stripe_detail() {
        let body = br#"{"error":{"type":"invalid_request_error","message":"No such customer"}}"#;

        let error = map_status_error(StatusCode::BAD_REQUEST, body);

        assert!(error.to_string().contains("No such customer"));
    }

    #[rstest]
    #[case("pi_3Nx9", true)]
    #[case("", false)]
    #[case("pi_1/../customers", false)]
    #[case("pi 1", false)]
    fn validates_object_ids(#[case] id: &str, #[case] valid: bool) {
        assert_eq!(is_valid_object_id(id), valid);
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let url = Url::parse("http://localhost:12111/stripe").expect("valid url");

        let joined = with_trailing_slash(url)
            .join(PAYMENT_INTENTS_PATH)
            .expect("joins");

        assert_eq!(joined.as_str(), "http://localhost:12111/stripe/v1/payment_intents");
    }
}
