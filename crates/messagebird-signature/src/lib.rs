//! Request signature verification for MessageBird webhooks.
//!
//! MessageBird signs every webhook call it makes so the receiver can check the
//! request came from MessageBird and was not altered in transit. Two schemes
//! exist and both are supported here:
//!
//! - [`jwt`] - the current scheme. A `MessageBird-Signature-JWT` header holds a
//!   compact JWT, signed with an HMAC algorithm, whose claims carry SHA-256
//!   hashes of the request URL and body.
//! - [`legacy`] - the original scheme. `MessageBird-Request-Timestamp` and
//!   `MessageBird-Signature` headers carry a timestamp and a base64 HMAC-SHA256
//!   over the timestamp, the canonical query string and the body hash.
//!
//! Both validators implement [`SignatureValidator`], so either can guard a hyper
//! service through [`ValidateService`], which answers `401 Unauthorized` with an
//! empty body whenever verification fails.
//!
//! # Usage
//!
//! ```rust
//! use messagebird_signature::jwt::{Signer, Validator};
//!
//! let signer = Signer::new("PlLrKaqvZNRR5zAjm42ZT6q1SQxgbbGd");
//! let url = "https://example.com/webhook?id=42";
//! let token = signer.sign(Some(url), b"{\"status\":\"delivered\"}").unwrap();
//!
//! let validator = Validator::new("PlLrKaqvZNRR5zAjm42ZT6q1SQxgbbGd");
//! assert!(
//!     validator
//!         .validate_signature(&token, Some(url), b"{\"status\":\"delivered\"}")
//!         .is_ok()
//! );
//! ```
//!
//! # Modules
//!
//! - [`body`] - Buffering request bodies so they can be read after verification
//! - [`claims`] - Claim types and the validation predicate shared by both schemes
//! - [`clock`] - Injectable time source
//! - [`error`] - Verification error types
//! - [`hash`] - SHA-256 helpers
//! - [`jwt`] - JWT claims verification
//! - [`legacy`] - Legacy HMAC verification
//! - [`middleware`] - hyper service wrapper rejecting unsigned requests
//! - [`query`] - Query string canonicalization

pub mod body;
pub mod claims;
pub mod clock;
pub mod error;
pub mod hash;
pub mod jwt;
pub mod legacy;
pub mod middleware;
pub mod query;
mod validator;

pub use claims::{ClaimsError, ExpectedHashes, NumericDate};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::SignatureError;
pub use messagebird_core::SigningKey;
pub use middleware::ValidateService;
pub use validator::SignatureValidator;
