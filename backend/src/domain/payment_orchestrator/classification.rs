//! Request construction and failure classification for charge attempts.

use std::collections::BTreeMap;

use crate::domain::penalty::{PaymentStatus, Penalty};
use crate::domain::ports::{PaymentIntentRequest, PaymentProcessorError};

/// Payment method and customer a charge is drawn against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ChargeTarget {
    pub payment_method_id: String,
    pub customer_id: Option<String>,
}

/// Key shared by every submission of one attempt.
///
/// A crashed run re-submitting the same attempt collapses onto the intent the
/// processor already created; the next attempt (after `retry_count` grows)
/// gets a fresh key.
pub(super) fn idempotency_key(penalty: &Penalty) -> String {
    format!("penalty-{}-attempt-{}", penalty.id, penalty.retry_count)
}

pub(super) fn build_request(
    penalty: &Penalty,
    target: &ChargeTarget,
    currency: &str,
) -> PaymentIntentRequest {
    let metadata = BTreeMap::from([
        ("penalty_id".to_owned(), penalty.id.to_string()),
        ("user_id".to_owned(), penalty.user_id.to_string()),
    ]);
    PaymentIntentRequest {
        amount_minor_units: penalty.amount.minor_units(),
        currency: currency.to_owned(),
        payment_method_id: Some(target.payment_method_id.clone()),
        customer_id: target.customer_id.clone(),
        confirm: true,
        off_session: true,
        metadata,
        idempotency_key: idempotency_key(penalty),
    }
}

/// Status persisted for a failed attempt.
pub(super) fn classify_failure(error: &PaymentProcessorError) -> PaymentStatus {
    match error {
        PaymentProcessorError::AuthenticationRequired { .. } => PaymentStatus::RequiresAction,
        _ => PaymentStatus::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HabitId, NewPenalty, PenaltyAmount, PenaltyId, UserId};
    use chrono::{NaiveDate, Utc};
    use rstest::rstest;

    fn penalty(retry_count: u32) -> Penalty {
        let mut penalty = NewPenalty {
            id: PenaltyId::random(),
            habit_id: HabitId::random(),
            user_id: UserId::random(),
            amount: PenaltyAmount::from_minor_units(1250).expect("positive"),
            penalty_date: NaiveDate::from_ymd_opt(2024, 6, 10).expect("valid date"),
            created_at: Utc::now(),
        }
        .into_penalty();
        penalty.retry_count = retry_count;
        penalty
    }

    #[rstest]
    fn request_charges_minor_units_off_session() {
        let penalty = penalty(0);
        let target = ChargeTarget {
            payment_method_id: "pm_123".to_owned(),
            customer_id: Some("cus_9".to_owned()),
        };

        let request = build_request(&penalty, &target, "usd");

        assert_eq!(request.amount_minor_units, 1250);
        assert_eq!(request.currency, "usd");
        assert!(request.confirm);
        assert!(request.off_session);
        assert_eq!(request.payment_method_id.as_deref(), Some("pm_123"));
        assert_eq!(request.customer_id.as_deref(), Some("cus_9"));
        assert_eq!(
            request.metadata.get("penalty_id"),
            Some(&penalty.id.to_string())
        );
        assert_eq!(
            request.metadata.get("user_id"),
            Some(&penalty.user_id.to_string())
        );
    }

    #[rstest]
    fn idempotency_key_changes_per_attempt() {
        let first = penalty(0);
        let mut second = first.clone();
        second.retry_count = 1;

        assert_eq!(
            idempotency_key(&first),
            format!("penalty-{}-attempt-0", first.id)
        );
        assert_ne!(idempotency_key(&first), idempotency_key(&second));
    }

    #[rstest]
    #[case(PaymentProcessorError::authentication_required("3DS"), PaymentStatus::RequiresAction)]
    #[case(PaymentProcessorError::card("card_declined", "declined"), PaymentStatus::Failed)]
    #[case(PaymentProcessorError::timeout("elapsed"), PaymentStatus::Failed)]
    #[case(PaymentProcessorError::transport("reset"), PaymentStatus::Failed)]
    #[case(PaymentProcessorError::api("bad param"), PaymentStatus::Failed)]
    #[case(PaymentProcessorError::decode("json"), PaymentStatus::Failed)]
    fn failures_classify_to_persisted_status(
        #[case] error: PaymentProcessorError,
        #[case] expected: PaymentStatus,
    ) {
        assert_eq!(classify_failure(&error), expected);
    }
}
