//! Error types for webhook signature verification.
//!
//! All verification failures are represented by [`SignatureError`], which provides
//! a specific variant for each failure mode so callers can tell why a request was
//! rejected. Claim-level failures are nested as [`ClaimsError`].

use crate::claims::ClaimsError;

/// Errors that can occur while verifying a signed webhook request.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    /// The signature header is missing or empty.
    #[error("signature not found")]
    SignatureNotFound,

    /// The legacy `MessageBird-Request-Timestamp` header is missing or empty.
    #[error("request timestamp not found")]
    MissingTimestamp,

    /// A header value contains bytes that are not visible ASCII.
    #[error("invalid value in header {0}")]
    InvalidHeaderValue(&'static str),

    /// The request timestamp is not a decimal Unix epoch.
    #[error("invalid request timestamp: {0}")]
    InvalidTimestamp(String),

    /// The request timestamp lies outside the configured validity period.
    #[error("request timestamp outside of validity period")]
    TimestampOutOfRange,

    /// The raw query string could not be parsed.
    #[error("invalid query string: {0}")]
    InvalidQuery(String),

    /// The signature is not valid base64.
    #[error("signature is not valid base64")]
    InvalidEncoding,

    /// The signature does not match the request.
    #[error("invalid signature")]
    InvalidSignature,

    /// The token is signed with an algorithm outside the HMAC family.
    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The token is not a well-formed compact JWT.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The base URL could not be combined with the request target.
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),

    /// The request body could not be read.
    #[error("failed to read request body: {0}")]
    Body(String),

    /// The token was signed correctly but one of its claims is invalid.
    #[error(transparent)]
    Claims(#[from] ClaimsError),
}

impl From<jsonwebtoken::errors::Error> for SignatureError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                Self::UnsupportedAlgorithm(err.to_string())
            }
            _ => Self::MalformedToken(err.to_string()),
        }
    }
}
