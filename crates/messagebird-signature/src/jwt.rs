//! JWT claims verification.
//!
//! Requests carry a compact JWT in the `MessageBird-Signature-JWT` header. The
//! token is signed with the shared key using an HMAC algorithm (HS256, HS384 or
//! HS512) and its claims bind it to the request:
//!
//! | Claim          | Meaning                                             |
//! |----------------|-----------------------------------------------------|
//! | `iss`          | always `MessageBird`                                |
//! | `nbf`          | not valid before                                    |
//! | `exp`          | not valid after                                     |
//! | `jti`          | unique token id                                     |
//! | `url_hash`     | hex SHA-256 of the full request URL                 |
//! | `payload_hash` | hex SHA-256 of the body, omitted for empty bodies   |
//!
//! Signature and algorithm checks are delegated to `jsonwebtoken`; its own time
//! checks are disabled and every claim is checked by [`Claims::validate`]
//! against an explicit clock, with [`CLOCK_SKEW`](crate::claims::CLOCK_SKEW)
//! tolerance.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use http::uri::PathAndQuery;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use messagebird_core::SigningKey;

use crate::claims::{ClaimSet, ClaimsError, ExpectedHashes, ISSUER, NumericDate, validate_claims};
use crate::clock::{Clock, SystemClock};
use crate::error::SignatureError;
use crate::hash::sha256_hex;
use crate::middleware::ValidateService;
use crate::validator::SignatureValidator;

/// Header carrying the signed token.
pub const SIGNATURE_HEADER: &str = "MessageBird-Signature-JWT";

/// Algorithms a token may be signed with.
pub const ALLOWED_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Default lifetime of tokens produced by [`Signer`].
pub const DEFAULT_TTL: TimeDelta = TimeDelta::minutes(5);

/// Claims of a webhook signature token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer; must be `MessageBird`.
    #[serde(default)]
    pub iss: String,
    /// Not valid before.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<NumericDate>,
    /// Not valid after.
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
    /// Build claims describing a request, valid from `now` for `ttl`.
    ///
    /// A missing URL yields an empty `url_hash`, so the token only verifies
    /// against validators that skip URL binding.
    #[must_use]
    pub fn for_request(url: Option<&str>, payload: &[u8], now: DateTime<Utc>, ttl: TimeDelta) -> Self {
        Self {
            iss: ISSUER.to_owned(),
            nbf: Some(NumericDate::from_datetime(now)),
            exp: Some(NumericDate::from_datetime(now + ttl)),
            jti: uuid::Uuid::new_v4().to_string(),
            url_hash: url.map(|u| sha256_hex(u.as_bytes())).unwrap_or_default(),
            payload_hash: (!payload.is_empty()).then(|| sha256_hex(payload)),
        }
    }

    /// Check the claims against the inbound request at instant `now`.
    ///
    /// # Errors
    ///
    /// Returns the [`ClaimsError`] of the first failing check.
    pub fn validate(&self, expected: &ExpectedHashes, now: DateTime<Utc>) -> Result<(), ClaimsError> {
        validate_claims(
            &ClaimSet {
                issuer: &self.iss,
                start_claim: "nbf",
                start: self.nbf,
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

/// Resolve a request's path and query against the configured base URL.
///
/// Returns `None` when `base_url` is empty, which disables URL binding.
///
/// `target` is always read as a path and query. A leading `//` is kept as part
/// of the path and text before a `:` is never read as a scheme, so the result
/// keeps the scheme and authority of `base_url`. An absolute path replaces the
/// base path; a relative one is merged with it. Any fragment is dropped.
///
/// # Examples
///
/// ```
/// use messagebird_signature::jwt::resolve_url;
///
/// let url = resolve_url("https://example.com", "/webhook?b=2&a=1").unwrap();
/// assert_eq!(url.as_deref(), Some("https://example.com/webhook?b=2&a=1"));
///
/// let url = resolve_url("https://example.com", "//evil.example/x").unwrap();
/// assert_eq!(url.as_deref(), Some("https://example.com//evil.example/x"));
///
/// assert_eq!(resolve_url("", "/webhook").unwrap(), None);
/// ```
///
/// # Errors
///
/// Returns [`SignatureError::InvalidBaseUrl`] if the base URL does not parse or
/// cannot carry a path.
pub fn resolve_url(base_url: &str, target: &str) -> Result<Option<String>, SignatureError> {
    if base_url.is_empty() {
        return Ok(None);
    }
    let base = Url::parse(base_url).map_err(|e| SignatureError::InvalidBaseUrl(e.to_string()))?;
    if base.cannot_be_a_base() {
        return Err(SignatureError::InvalidBaseUrl(format!("{base_url} cannot be a base")));
    }

    let target = target.split_once('#').map_or(target, |(before, _)| before);
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    };

    let mut full = if path.starts_with('/') {
        let mut full = base;
        full.set_path(path);
        full
    } else if path.is_empty() {
        base
    } else {
        base.join(&format!("./{path}"))
            .map_err(|e| SignatureError::InvalidBaseUrl(e.to_string()))?
    };
    if query.is_some() || !path.is_empty() {
        full.set_query(query);
    }
    full.set_fragment(None);
    Ok(Some(full.into()))
}

/// Verifier for JWT-signed webhook requests.
#[derive(Clone)]
pub struct Validator {
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("decoding_key", &"[REDACTED]")
            .field("algorithms", &self.validation.algorithms)
            .field("clock", &self.clock)
            .finish()
    }
}

impl Validator {
    /// Create a validator for tokens signed with `signing_key`.
    #[must_use]
    pub fn new(signing_key: impl Into<SigningKey>) -> Self {
        let signing_key = signing_key.into();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = ALLOWED_ALGORITHMS.to_vec();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.required_spec_claims.clear();

        Self {
            decoding_key: DecodingKey::from_secret(signing_key.as_bytes()),
            validation,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` instead of the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Verify a token against the URL and body of the request it arrived with.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::InvalidSignature`],
    /// [`SignatureError::UnsupportedAlgorithm`] or
    /// [`SignatureError::MalformedToken`] when the token itself is rejected and
    /// [`SignatureError::Claims`] when a claim does not hold.
    pub fn validate_signature(
        &self,
        token: &str,
        url: Option<&str>,
        payload: &[u8],
    ) -> Result<TokenData<Claims>, SignatureError> {
        let expected = ExpectedHashes::new(url, payload);
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        data.claims.validate(&expected, self.clock.now())?;
        Ok(data)
    }

    /// Verify a buffered request, resolving its target against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::SignatureNotFound`] when the header is missing
    /// or empty, otherwise whatever [`Validator::validate_signature`] reports.
    pub fn validate_request(&self, req: &http::Request<Bytes>, base_url: &str) -> Result<(), SignatureError> {
        let token = match req.headers().get(SIGNATURE_HEADER) {
            None => return Err(SignatureError::SignatureNotFound),
            Some(value) => value
                .to_str()
                .map_err(|_| SignatureError::InvalidHeaderValue(SIGNATURE_HEADER))?,
        };
        if token.is_empty() {
            return Err(SignatureError::SignatureNotFound);
        }

        let target = req.uri().path_and_query().map_or("/", PathAndQuery::as_str);
        let url = resolve_url(base_url, target)?;
        let data = self.validate_signature(token, url.as_deref(), req.body())?;

        debug!(
            jti = %data.claims.jti,
            alg = ?data.header.alg,
            url_bound = url.is_some(),
            "jwt signature verified"
        );
        Ok(())
    }

    /// Bind this validator to a base URL so it can serve as a [`SignatureValidator`].
    #[must_use]
    pub fn for_base_url(self, base_url: impl Into<String>) -> BoundValidator {
        BoundValidator {
            validator: self,
            base_url: base_url.into(),
        }
    }

    /// Guard `inner`, resolving request targets against `base_url`.
    #[must_use]
    pub fn validate<S>(self, inner: S, base_url: impl Into<String>) -> ValidateService<S, BoundValidator> {
        self.for_base_url(base_url).wrap(inner)
    }
}

/// A [`Validator`] paired with the base URL webhooks are delivered to.
#[derive(Debug, Clone)]
pub struct BoundValidator {
    validator: Validator,
    base_url: String,
}

impl BoundValidator {
    /// The base URL request targets are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl SignatureValidator for BoundValidator {
    fn validate_request(&self, req: &http::Request<Bytes>) -> Result<(), SignatureError> {
        self.validator.validate_request(req, &self.base_url)
    }
}

/// Issues signature tokens the way MessageBird does.
///
/// Useful for exercising a webhook endpoint locally.
#[derive(Clone)]
pub struct Signer {
    encoding_key: EncodingKey,
    algorithm: Algorithm,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("encoding_key", &"[REDACTED]")
            .field("algorithm", &self.algorithm)
            .field("ttl", &self.ttl)
            .field("clock", &self.clock)
            .finish()
    }
}

impl Signer {
    /// Create an HS256 signer with a five minute token lifetime.
    #[must_use]
    pub fn new(signing_key: impl Into<SigningKey>) -> Self {
        let signing_key = signing_key.into();
        Self {
            encoding_key: EncodingKey::from_secret(signing_key.as_bytes()),
            algorithm: Algorithm::HS256,
            ttl: DEFAULT_TTL,
            clock: Arc::new(SystemClock),
        }
    }

    /// Sign with `algorithm` instead of HS256.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Issue tokens valid for `ttl`.
    #[must_use]
    pub fn with_ttl(mut self, ttl: TimeDelta) -> Self {
        self.ttl = ttl;
        self
    }

    /// Use `clock` instead of the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sign a token for a request to `url` carrying `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::UnsupportedAlgorithm`] if the configured
    /// algorithm cannot be used with a shared secret.
    pub fn sign(&self, url: Option<&str>, payload: &[u8]) -> Result<String, SignatureError> {
        self.sign_claims(&Claims::for_request(url, payload, self.clock.now(), self.ttl))
    }

    /// Sign arbitrary claims.
    ///
    /// # Errors
    ///
    /// See [`Signer::sign`].
    pub fn sign_claims(&self, claims: &Claims) -> Result<String, SignatureError> {
        if !ALLOWED_ALGORITHMS.contains(&self.algorithm) {
            return Err(SignatureError::UnsupportedAlgorithm(format!("{:?}", self.algorithm)));
        }
        Ok(jsonwebtoken::encode(&Header::new(self.algorithm), claims, &self.encoding_key)?)
    }
}
