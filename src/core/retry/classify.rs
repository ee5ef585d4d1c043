//! Delivery error classification

use crate::domain::DeliveryErrorKind;

/// Whether a failed delivery should be attempted again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    Fatal,
}

/// Maps every delivery error kind to exactly one disposition
///
/// Transient transport and server-side failures are retried. Anything the
/// sink reports about the request itself is fatal, as is an unclassified
/// failure.
pub fn classify(kind: DeliveryErrorKind) -> RetryDisposition {
    match kind {
        DeliveryErrorKind::Connection
        | DeliveryErrorKind::ServerError
        | DeliveryErrorKind::InternalError
        | DeliveryErrorKind::Io
        | DeliveryErrorKind::BackendService => RetryDisposition::Retryable,
        DeliveryErrorKind::MalformedPayload
        | DeliveryErrorKind::NotFound
        | DeliveryErrorKind::VersionConflict
        | DeliveryErrorKind::InvalidCredentials
        | DeliveryErrorKind::Unclassified => RetryDisposition::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(DeliveryErrorKind::Connection => RetryDisposition::Retryable; "connection")]
    #[test_case(DeliveryErrorKind::ServerError => RetryDisposition::Retryable; "server error")]
    #[test_case(DeliveryErrorKind::InternalError => RetryDisposition::Retryable; "internal error")]
    #[test_case(DeliveryErrorKind::Io => RetryDisposition::Retryable; "io")]
    #[test_case(DeliveryErrorKind::BackendService => RetryDisposition::Retryable; "backend service")]
    #[test_case(DeliveryErrorKind::MalformedPayload => RetryDisposition::Fatal; "malformed payload")]
    #[test_case(DeliveryErrorKind::NotFound => RetryDisposition::Fatal; "not found")]
    #[test_case(DeliveryErrorKind::VersionConflict => RetryDisposition::Fatal; "version conflict")]
    #[test_case(DeliveryErrorKind::InvalidCredentials => RetryDisposition::Fatal; "invalid credentials")]
    #[test_case(DeliveryErrorKind::Unclassified => RetryDisposition::Fatal; "unclassified fails closed")]
    fn test_classify(kind: DeliveryErrorKind) -> RetryDisposition {
        classify(kind)
    }

    #[test]
    fn test_every_kind_is_classified() {
        let retryable = DeliveryErrorKind::ALL
            .iter()
            .filter(|kind| classify(**kind) == RetryDisposition::Retryable)
            .count();
        assert_eq!(retryable, 5);
    }
}
