//! The contract shared by both signature schemes.

use std::fmt;

use bytes::Bytes;

use crate::error::SignatureError;
use crate::middleware::ValidateService;

/// A verifier for signed webhook requests.
///
/// Implementations are immutable once built and can be shared by any number of
/// concurrent requests.
pub trait SignatureValidator: Send + Sync + fmt::Debug {
    /// Verify a request whose body has already been buffered.
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureError`] naming the first check that failed.
    fn validate_request(&self, req: &http::Request<Bytes>) -> Result<(), SignatureError>;

    /// Guard `inner` so it only sees requests that pass verification.
    fn wrap<S>(self, inner: S) -> ValidateService<S, Self>
    where
        Self: Sized,
    {
        ValidateService::new(inner, self)
    }
}

impl<V: SignatureValidator + ?Sized> SignatureValidator for std::sync::Arc<V> {
    fn validate_request(&self, req: &http::Request<Bytes>) -> Result<(), SignatureError> {
        (**self).validate_request(req)
    }
}
