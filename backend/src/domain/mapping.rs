//! Mapping helpers from port errors to domain errors.

use crate::domain::Error;
use crate::domain::ports::{
    HabitRepositoryError, PaymentProcessorError, PenaltyRepositoryError,
    UserProfileRepositoryError, VerificationRepositoryError,
};

pub(crate) fn map_habit_error(error: HabitRepositoryError) -> Error {
    match error {
        HabitRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("habit store unavailable: {message}"))
        }
        other => Error::internal(other.to_string()),
    }
}

pub(crate) fn map_verification_error(error: VerificationRepositoryError) -> Error {
    match error {
        VerificationRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("verification store unavailable: {message}"))
        }
        other => Error::internal(other.to_string()),
    }
}

pub(crate) fn map_profile_error(error: UserProfileRepositoryError) -> Error {
    match error {
        UserProfileRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("user profile store unavailable: {message}"))
        }
        other => Error::internal(other.to_string()),
    }
}

pub(crate) fn map_penalty_error(error: PenaltyRepositoryError) -> Error {
    match error {
        PenaltyRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("penalty store unavailable: {message}"))
        }
        PenaltyRepositoryError::NotFound { message } => Error::not_found(message),
        other => Error::internal(other.to_string()),
    }
}

pub(crate) fn map_processor_error(error: PaymentProcessorError) -> Error {
    match error {
        PaymentProcessorError::Timeout { .. } | PaymentProcessorError::Transport { .. } => {
            Error::service_unavailable(error.to_string())
        }
        other => Error::internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorCode;
    use rstest::rstest;

    #[rstest]
    #[case(PenaltyRepositoryError::connection("refused"), ErrorCode::ServiceUnavailable)]
    #[case(PenaltyRepositoryError::not_found("row"), ErrorCode::NotFound)]
    #[case(PenaltyRepositoryError::query("syntax"), ErrorCode::InternalError)]
    #[case(PenaltyRepositoryError::corrupt("status"), ErrorCode::InternalError)]
    fn penalty_errors_map_to_codes(#[case] error: PenaltyRepositoryError, #[case] code: ErrorCode) {
        assert_eq!(map_penalty_error(error).code(), code);
    }

    #[rstest]
    fn connection_failures_keep_the_adapter_message() {
        let error = map_habit_error(HabitRepositoryError::connection("pool timed out"));
        assert_eq!(error.code(), ErrorCode::ServiceUnavailable);
        assert!(error.message().contains("pool timed out"));
    }

    #[rstest]
    #[case(PaymentProcessorError::timeout("30s"), ErrorCode::ServiceUnavailable)]
    #[case(PaymentProcessorError::transport("reset"), ErrorCode::ServiceUnavailable)]
    #[case(PaymentProcessorError::decode("json"), ErrorCode::InternalError)]
    fn processor_errors_map_to_codes(
        #[case] error: PaymentProcessorError,
        #[case] code: ErrorCode,
    ) {
        assert_eq!(map_processor_error(error).code(), code);
    }

    #[rstest]
    fn verification_and_profile_query_errors_are_internal() {
        assert_eq!(
            map_verification_error(VerificationRepositoryError::query("bad")).code(),
            ErrorCode::InternalError
        );
        assert_eq!(
            map_profile_error(UserProfileRepositoryError::query("bad")).code(),
            ErrorCode::InternalError
        );
    }
}
