//! Classification of AWS CLI failures.
//!
//! The CLI reports control-plane errors as text on stderr, for example
//! `An error occurred (InvalidInstanceID.NotFound) when calling the
//! DescribeInstances operation: ...`. This module turns that text into a
//! [`FailureKind`] so no other module ever inspects raw provider output.

use crate::error::ProviderError;

/// Error codes meaning the instance does not exist.
const NOT_FOUND_MARKERS: &[&str] = &["InvalidInstanceID.NotFound", "InvalidInstanceID.Malformed"];

/// Error codes and messages meaning the credentials were rejected.
const AUTH_MARKERS: &[&str] = &[
    "AuthFailure",
    "UnauthorizedOperation",
    "UnrecognizedClientException",
    "InvalidClientTokenId",
    "ExpiredToken",
    "SignatureDoesNotMatch",
    "Unable to locate credentials",
];

/// Error codes and messages meaning another attempt may succeed.
const TRANSIENT_MARKERS: &[&str] = &[
    "RequestLimitExceeded",
    "Throttling",
    "ServiceUnavailable",
    "InternalError",
    "Could not connect to the endpoint URL",
    "Connection was closed",
    "Read timeout",
    "Connect timeout",
];

/// What a failed provider call means for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The resource does not exist.
    NotFound,
    /// Credentials were rejected; never retried.
    Authentication,
    /// Throttling or network trouble; retried with backoff.
    Transient,
    /// Any other refusal.
    Other,
}

/// Classify the stderr of a failed AWS CLI call.
///
/// Authentication wins over the other kinds so a rejected token is never
/// retried even when the message also mentions a timeout.
#[must_use]
pub fn classify_failure(stderr: &str) -> FailureKind {
    let contains_any = |markers: &[&str]| markers.iter().any(|marker| stderr.contains(marker));

    if contains_any(AUTH_MARKERS) {
        FailureKind::Authentication
    } else if contains_any(NOT_FOUND_MARKERS) {
        FailureKind::NotFound
    } else if contains_any(TRANSIENT_MARKERS) {
        FailureKind::Transient
    } else {
        FailureKind::Other
    }
}

/// Map a classified failure to a semantic provider error.
///
/// `NotFound` becomes `RequestFailed` here; callers that treat absence as a
/// state check for it before calling this.
#[must_use]
pub fn provider_error(kind: FailureKind, operation: &str, stderr: &str) -> ProviderError {
    let message = stderr.trim().to_owned();
    match kind {
        FailureKind::Authentication => ProviderError::AuthenticationFailed { message },
        FailureKind::Transient => ProviderError::Transient {
            operation: operation.to_owned(),
            message,
        },
        FailureKind::NotFound | FailureKind::Other => ProviderError::RequestFailed {
            operation: operation.to_owned(),
            message,
        },
    }
}
