//! Legacy HMAC-SHA256 webhook verification.
//!
//! Requests signed with the legacy scheme carry two headers:
//!
//! - `MessageBird-Request-Timestamp` - Unix epoch seconds, decimal
//! - `MessageBird-Signature` - standard padded base64 of the HMAC below
//!
//! The signature is computed with the shared signing key over:
//!
//! ```text
//! timestamp + "\n" + canonical_query + "\n" + SHA256(body)
//! ```
//!
//! where `SHA256(body)` is the raw 32-byte digest and `canonical_query` is the
//! query string normalized by [`crate::query::canonical_query`].
//!
//! The scheme also defined a JWT-shaped claims token (claims with `iat` rather
//! than `nbf`), which [`RequestValidator::validate_token`] decodes and checks by
//! hand without going through a JWT library.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD as BASE64_URL};
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use hmac::{Hmac, KeyInit, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::debug;

use messagebird_core::SigningKey;

use crate::claims::{ClaimSet, ClaimsError, ExpectedHashes, NumericDate, validate_claims};
use crate::clock::{Clock, SystemClock};
use crate::error::SignatureError;
use crate::hash::sha256;
use crate::middleware::ValidateService;
use crate::query::canonical_query;
use crate::validator::SignatureValidator;

/// Header carrying the signing timestamp.
pub const TIMESTAMP_HEADER: &str = "MessageBird-Request-Timestamp";

/// Header carrying the base64 HMAC signature.
pub const SIGNATURE_HEADER: &str = "MessageBird-Signature";

/// The only algorithm accepted in legacy claims tokens.
const TOKEN_ALGORITHM: &str = "HS256";

type HmacSha256 = Hmac<Sha256>;

/// Claims of a legacy signature token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer; must be `MessageBird`.
    #[serde(default)]
    pub iss: String,
    /// Issued-at time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<NumericDate>,
    /// Expiration time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<NumericDate>,
    /// Unique token identifier.
    #[serde(default)]
    pub jti: String,
    /// Hex SHA-256 of the request URL.
    #[serde(default)]
    pub url_hash: String,
    /// Hex SHA-256 of the request body, absent for empty bodies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_hash: Option<String>,
}

impl Claims {
    /// Decode the claims segment of a compact token without checking its signature.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::MalformedToken`] if the token is not three
    /// base64url segments or the claims are not valid JSON.
    pub fn decode_unverified(token: &str) -> Result<Self, SignatureError> {
        let (_, claims, _) = split_token(token)?;
        decode_segment(claims)
    }

    /// Check the claims against the inbound request at instant `now`.
    ///
    /// # Errors
    ///
    /// Returns the [`ClaimsError`] of the first failing check.
    pub fn validate(
        &self,
        expected: &ExpectedHashes,
        now: DateTime<Utc>,
    ) -> Result<(), ClaimsError> {
        validate_claims(
            &ClaimSet {
                issuer: &self.iss,
                start_claim: "iat",
                start: self.iat,
                expires_at: self.exp,
                jti: &self.jti,
                url_hash: &self.url_hash,
                payload_hash: self.payload_hash.as_deref(),
            },
            expected,
            now,
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

/// Verifier for legacy HMAC-signed webhook requests.
///
/// # Examples
///
/// ```
/// use base64::Engine;
/// use base64::engine::general_purpose::STANDARD;
/// use messagebird_signature::legacy::RequestValidator;
///
/// let validator = RequestValidator::new("PlLrKaqvZNRR5zAjm42ZT6q1SQxgbbGd");
/// let mac = validator.calculate_signature("1544544948", "abc=foo&def=bar", b"{\"a key\":\"some value\"}");
/// let signature = STANDARD.encode(mac);
///
/// assert!(validator.valid_signature(
///     "1544544948",
///     "def=bar&abc=foo",
///     b"{\"a key\":\"some value\"}",
///     &signature,
/// ));
/// ```
#[derive(Debug, Clone)]
pub struct RequestValidator {
    signing_key: SigningKey,
    period: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl RequestValidator {
    /// Create a validator accepting any parsable timestamp.
    #[must_use]
    pub fn new(signing_key: impl Into<SigningKey>) -> Self {
        Self {
            signing_key: signing_key.into(),
            period: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Reject timestamps further than `period` from the current time.
    #[must_use]
    pub fn with_max_validity(mut self, period: Duration) -> Self {
        self.period = Some(period);
        self
    }

    /// Use `clock` instead of the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The configured validity period, if any.
    #[must_use]
    pub fn max_validity(&self) -> Option<Duration> {
        self.period
    }

    /// Whether `timestamp` is a Unix epoch within the validity period.
    #[must_use]
    pub fn valid_timestamp(&self, timestamp: &str) -> bool {
        self.check_timestamp(timestamp).is_ok()
    }

    /// Compute the raw HMAC-SHA256 signature over the canonical message.
    ///
    /// `query` is used verbatim; callers verifying a request should pass the
    /// canonical query string.
    #[must_use]
    pub fn calculate_signature(&self, timestamp: &str, query: &str, body: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(self.signing_key.as_bytes())
            .expect("HMAC can accept any key length");
        mac.update(timestamp.as_bytes());
        mac.update(b"\n");
        mac.update(query.as_bytes());
        mac.update(b"\n");
        mac.update(&sha256(body));
        mac.finalize().into_bytes().to_vec()
    }

    /// Whether `signature` (base64) signs the given timestamp, raw query and body.
    #[must_use]
    pub fn valid_signature(
        &self,
        timestamp: &str,
        raw_query: &str,
        body: &[u8],
        signature: &str,
    ) -> bool {
        self.check_signature(timestamp, raw_query, body, signature)
            .is_ok()
    }

    /// Produce the `MessageBird-Signature` header value for a request.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::InvalidQuery`] if `raw_query` cannot be parsed.
    pub fn sign(&self, timestamp: &str, raw_query: &str, body: &[u8]) -> Result<String, SignatureError> {
        let query = canonical_query(raw_query)?;
        Ok(BASE64.encode(self.calculate_signature(timestamp, &query, body)))
    }

    /// Verify the timestamp and signature headers of a buffered request.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::MissingTimestamp`] or
    /// [`SignatureError::SignatureNotFound`] when a header is absent, and the
    /// timestamp or signature error otherwise.
    pub fn validate_request(&self, req: &http::Request<Bytes>) -> Result<(), SignatureError> {
        let timestamp =
            header_value(req, TIMESTAMP_HEADER)?.ok_or(SignatureError::MissingTimestamp)?;
        let signature =
            header_value(req, SIGNATURE_HEADER)?.ok_or(SignatureError::SignatureNotFound)?;

        self.check_timestamp(timestamp)?;
        self.check_signature(
            timestamp,
            req.uri().query().unwrap_or(""),
            req.body(),
            signature,
        )?;

        debug!(timestamp, "legacy signature verified");
        Ok(())
    }

    /// Verify a legacy claims token: its HS256 signature, then its claims.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::MalformedToken`],
    /// [`SignatureError::UnsupportedAlgorithm`] or
    /// [`SignatureError::InvalidSignature`] for envelope failures and
    /// [`SignatureError::Claims`] for claim failures.
    pub fn validate_token(
        &self,
        token: &str,
        url: Option<&str>,
        payload: &[u8],
    ) -> Result<Claims, SignatureError> {
        let (header, claims, signature) = split_token(token)?;

        let header: TokenHeader = decode_segment(header)?;
        if header.alg != TOKEN_ALGORITHM {
            return Err(SignatureError::UnsupportedAlgorithm(header.alg));
        }

        let provided = BASE64_URL
            .decode(signature)
            .map_err(|_| SignatureError::MalformedToken("signature is not base64url".to_owned()))?;
        let signing_input = &token[..token.len() - signature.len() - 1];
        let expected = self.hmac(signing_input.as_bytes());
        if !bool::from(provided.as_slice().ct_eq(expected.as_slice())) {
            return Err(SignatureError::InvalidSignature);
        }

        let claims: Claims = decode_segment(claims)?;
        claims.validate(&ExpectedHashes::new(url, payload), self.clock.now())?;
        Ok(claims)
    }

    /// Encode and sign `claims` as a compact HS256 token.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::MalformedToken`] if the claims cannot be serialized.
    pub fn sign_token(&self, claims: &Claims) -> Result<String, SignatureError> {
        let header = TokenHeader {
            alg: TOKEN_ALGORITHM.to_owned(),
            typ: Some("JWT".to_owned()),
        };
        let header = serde_json::to_vec(&header)
            .map_err(|e| SignatureError::MalformedToken(e.to_string()))?;
        let claims = serde_json::to_vec(claims)
            .map_err(|e| SignatureError::MalformedToken(e.to_string()))?;

        let signing_input = format!("{}.{}", BASE64_URL.encode(header), BASE64_URL.encode(claims));
        let signature = BASE64_URL.encode(self.hmac(signing_input.as_bytes()));
        Ok(format!("{signing_input}.{signature}"))
    }

    /// Guard `inner` with this validator.
    #[must_use]
    pub fn validate<S>(self, inner: S) -> ValidateService<S, Self> {
        self.wrap(inner)
    }

    fn check_timestamp(&self, timestamp: &str) -> Result<(), SignatureError> {
        let secs: i64 = timestamp
            .parse()
            .map_err(|_| SignatureError::InvalidTimestamp(timestamp.to_owned()))?;
        let signed_at = DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| SignatureError::InvalidTimestamp(timestamp.to_owned()))?;

        if let Some(period) = self.period {
            let period = TimeDelta::from_std(period).unwrap_or(TimeDelta::MAX);
            let drift = (self.clock.now() - signed_at).abs();
            if drift > period {
                debug!(timestamp, drift_secs = drift.num_seconds(), "stale request timestamp");
                return Err(SignatureError::TimestampOutOfRange);
            }
        }

        Ok(())
    }

    fn check_signature(
        &self,
        timestamp: &str,
        raw_query: &str,
        body: &[u8],
        signature: &str,
    ) -> Result<(), SignatureError> {
        let query = canonical_query(raw_query)?;
        let provided = BASE64
            .decode(signature)
            .map_err(|_| SignatureError::InvalidEncoding)?;
        let expected = self.calculate_signature(timestamp, &query, body);

        if provided.as_slice().ct_eq(expected.as_slice()).into() {
            Ok(())
        } else {
            Err(SignatureError::InvalidSignature)
        }
    }

    fn hmac(&self, data: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(self.signing_key.as_bytes())
            .expect("HMAC can accept any key length");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}

impl SignatureValidator for RequestValidator {
    fn validate_request(&self, req: &http::Request<Bytes>) -> Result<(), SignatureError> {
        RequestValidator::validate_request(self, req)
    }
}

/// Read a header as a string; empty values count as absent.
fn header_value<'a>(
    req: &'a http::Request<Bytes>,
    name: &'static str,
) -> Result<Option<&'a str>, SignatureError> {
    match req.headers().get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v).filter(|v| !v.is_empty()))
            .map_err(|_| SignatureError::InvalidHeaderValue(name)),
    }
}

/// Split a compact token into its three segments.
fn split_token(token: &str) -> Result<(&str, &str, &str), SignatureError> {
    let mut segments = token.split('.');
    match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(header), Some(claims), Some(signature), None) => Ok((header, claims, signature)),
        _ => Err(SignatureError::MalformedToken(
            "token must have three segments".to_owned(),
        )),
    }
}

/// Decode a base64url JSON segment.
fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, SignatureError> {
    let bytes = BASE64_URL
        .decode(segment)
        .map_err(|e| SignatureError::MalformedToken(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| SignatureError::MalformedToken(e.to_string()))
}
