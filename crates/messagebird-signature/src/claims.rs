//! Claim types and the validation predicate shared by both signature schemes.
//!
//! A signed token is only half of the check: its claims must also describe the
//! request that actually arrived. Before validating, the verifier computes the
//! [`ExpectedHashes`] of the inbound URL and body; the token is accepted only if
//! every one of the following holds:
//!
//! - `iss` is `MessageBird`
//! - the start-of-validity claim (`nbf`, or `iat` for legacy tokens) is not
//!   later than now plus [`CLOCK_SKEW`]
//! - `exp` is not earlier than now minus [`CLOCK_SKEW`]
//! - `jti` is present and non-empty
//! - `url_hash` equals the expected URL hash, when one is expected
//! - `payload_hash` is present exactly when the request has a body, and matches it

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::hash::sha256_hex;

/// The issuer every MessageBird token must carry.
pub const ISSUER: &str = "MessageBird";

/// Permitted clock drift between signer and verifier, in both directions.
pub const CLOCK_SKEW: TimeDelta = TimeDelta::seconds(1);

/// Reasons a correctly signed token is still rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimsError {
    /// `iss` is not `MessageBird`.
    #[error("invalid iss: expected MessageBird, got {0:?}")]
    WrongIssuer(String),

    /// A required claim is absent or empty.
    #[error("missing {0}")]
    MissingClaim(&'static str),

    /// A time claim cannot be represented as an instant.
    #[error("invalid {0}: out of range")]
    InvalidClaim(&'static str),

    /// The token is not valid yet (`nbf` or `iat` in the future).
    #[error("{0} is in the future")]
    NotYetValid(&'static str),

    /// The token has expired.
    #[error("exp is in the past")]
    Expired,

    /// `url_hash` does not match the URL the request was delivered to.
    #[error("invalid url_hash")]
    UrlHashMismatch,

    /// `payload_hash` is set but the request has no body.
    #[error("payload_hash set but no payload")]
    UnexpectedPayloadHash,

    /// The request has a body but `payload_hash` is not set.
    #[error("payload_hash not set but payload present")]
    MissingPayloadHash,

    /// `payload_hash` does not match the request body.
    #[error("invalid payload_hash")]
    PayloadHashMismatch,
}

/// A JWT NumericDate: seconds since the Unix epoch, possibly fractional.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct NumericDate(f64);

impl NumericDate {
    /// Create a NumericDate from whole seconds since the epoch.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_timestamp(secs: i64) -> Self {
        Self(secs as f64)
    }

    /// Create a NumericDate from fractional seconds since the epoch.
    #[must_use]
    pub fn from_secs_f64(secs: f64) -> Self {
        Self(secs)
    }

    /// Create a NumericDate from an instant, keeping microsecond precision.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_datetime(instant: DateTime<Utc>) -> Self {
        Self(instant.timestamp_micros() as f64 / 1_000_000.0)
    }

    /// Seconds since the epoch.
    #[must_use]
    pub fn as_secs_f64(self) -> f64 {
        self.0
    }

    /// The instant this date denotes, or `None` when it is not finite or out of range.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        let micros = (self.0 * 1_000_000.0).round();
        if !micros.is_finite() || micros < i64::MIN as f64 || micros > i64::MAX as f64 {
            return None;
        }
        DateTime::from_timestamp_micros(micros as i64)
    }
}

impl fmt::Display for NumericDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for NumericDate {
    #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Whole seconds go out as integers, which is what most signers emit.
        if self.0.fract() == 0.0 && self.0.abs() < 9.0e15 {
            serializer.serialize_i64(self.0 as i64)
        } else {
            serializer.serialize_f64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for NumericDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        f64::deserialize(deserializer).map(Self)
    }
}

/// Hashes computed from the request that actually arrived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedHashes {
    /// Hex SHA-256 of the full request URL; `None` skips URL binding.
    pub url_hash: Option<String>,
    /// Hex SHA-256 of the body; `None` when the body is empty.
    pub payload_hash: Option<String>,
}

impl ExpectedHashes {
    /// Compute the expected hashes for a request URL and body.
    ///
    /// An absent or empty URL disables the `url_hash` check. An empty payload
    /// means the token must not carry a `payload_hash`.
    ///
    /// # Examples
    ///
    /// ```
    /// use messagebird_signature::claims::ExpectedHashes;
    ///
    /// let expected = ExpectedHashes::new(None, b"");
    /// assert!(expected.url_hash.is_none());
    /// assert!(expected.payload_hash.is_none());
    /// ```
    #[must_use]
    pub fn new(url: Option<&str>, payload: &[u8]) -> Self {
        Self {
            url_hash: url
                .filter(|u| !u.is_empty())
                .map(|u| sha256_hex(u.as_bytes())),
            payload_hash: (!payload.is_empty()).then(|| sha256_hex(payload)),
        }
    }
}

/// Borrowed view over the claims of either token flavour.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClaimSet<'a> {
    pub issuer: &'a str,
    /// Name of the start-of-validity claim (`nbf` or `iat`).
    pub start_claim: &'static str,
    pub start: Option<NumericDate>,
    pub expires_at: Option<NumericDate>,
    pub jti: &'a str,
    pub url_hash: &'a str,
    pub payload_hash: Option<&'a str>,
}

/// Check a claim set against the inbound request at instant `now`.
pub(crate) fn validate_claims(
    claims: &ClaimSet<'_>,
    expected: &ExpectedHashes,
    now: DateTime<Utc>,
) -> Result<(), ClaimsError> {
    if claims.issuer != ISSUER {
        return Err(ClaimsError::WrongIssuer(claims.issuer.to_owned()));
    }

    let start = claims
        .start
        .ok_or(ClaimsError::MissingClaim(claims.start_claim))?
        .to_datetime()
        .ok_or(ClaimsError::InvalidClaim(claims.start_claim))?;
    // Skew saturates at the ends of the representable range.
    if start.checked_sub_signed(CLOCK_SKEW).unwrap_or(DateTime::<Utc>::MIN_UTC) > now {
        return Err(ClaimsError::NotYetValid(claims.start_claim));
    }

    let expires_at = claims
        .expires_at
        .ok_or(ClaimsError::MissingClaim("exp"))?
        .to_datetime()
        .ok_or(ClaimsError::InvalidClaim("exp"))?;
    if expires_at.checked_add_signed(CLOCK_SKEW).unwrap_or(DateTime::<Utc>::MAX_UTC) < now {
        return Err(ClaimsError::Expired);
    }

    if claims.jti.is_empty() {
        return Err(ClaimsError::MissingClaim("jti"));
    }

    if let Some(url_hash) = &expected.url_hash {
        if claims.url_hash != url_hash.as_str() {
            return Err(ClaimsError::UrlHashMismatch);
        }
    }

    let claimed = claims.payload_hash.filter(|h| !h.is_empty());
    match (claimed, expected.payload_hash.as_deref()) {
        (Some(_), None) => Err(ClaimsError::UnexpectedPayloadHash),
        (None, Some(_)) => Err(ClaimsError::MissingPayloadHash),
        (Some(claimed), Some(actual)) if claimed != actual => Err(ClaimsError::PayloadHashMismatch),
        _ => Ok(()),
    }
}
