//! hyper service wrapper that rejects requests failing signature verification.
//!
//! [`ValidateService`] sits in front of any hyper service:
//!
//! 1. The request body is buffered (see [`crate::body`]).
//! 2. The configured [`SignatureValidator`] checks the request.
//! 3. On failure the client gets `401 Unauthorized` with an empty body and the
//!    inner service is never called. The reason is logged but never sent, so
//!    every rejection looks the same on the wire.
//! 4. On success the inner service receives the request with its body intact.

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{Either, Empty, Full};
use hyper::service::Service;
use tracing::{debug, warn};

use crate::body::{buffer_request, into_replayable};
use crate::validator::SignatureValidator;

/// Response body of a guarded service: the inner body, or empty on rejection.
pub type ValidatedBody<B> = Either<B, Empty<Bytes>>;

/// Service wrapper enforcing webhook signature verification.
#[derive(Debug)]
pub struct ValidateService<S, V> {
    inner: S,
    validator: Arc<V>,
}

impl<S, V> ValidateService<S, V> {
    /// Guard `inner` with `validator`.
    #[must_use]
    pub fn new(inner: S, validator: V) -> Self {
        Self {
            inner,
            validator: Arc::new(validator),
        }
    }

    /// Guard `inner` with an already shared validator.
    #[must_use]
    pub fn from_shared(inner: S, validator: Arc<V>) -> Self {
        Self { inner, validator }
    }

    /// The validator in use.
    #[must_use]
    pub fn validator(&self) -> &V {
        &self.validator
    }
}

impl<S: Clone, V> Clone for ValidateService<S, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            validator: Arc::clone(&self.validator),
        }
    }
}

impl<S, V, B, ResBody> Service<http::Request<B>> for ValidateService<S, V>
where
    B: http_body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Display,
    S: Service<http::Request<Full<Bytes>>, Response = http::Response<ResBody>>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: Send + 'static,
    V: SignatureValidator + 'static,
{
    type Response = http::Response<ValidatedBody<ResBody>>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<B>) -> Self::Future {
        let inner = self.inner.clone();
        let validator = Arc::clone(&self.validator);

        Box::pin(async move {
            let method = req.method().clone();
            let uri = req.uri().clone();

            let req = match buffer_request(req).await {
                Ok(req) => req,
                Err(err) => {
                    warn!(%method, %uri, error = %err, "failed to buffer webhook request");
                    return Ok(unauthorized());
                }
            };

            if let Err(err) = validator.validate_request(&req) {
                debug!(%method, %uri, error = %err, "rejected webhook request");
                return Ok(unauthorized());
            }

            debug!(%method, %uri, "webhook signature verified");
            let response = inner.call(into_replayable(req)).await?;
            Ok(response.map(Either::Left))
        })
    }
}

/// The uniform rejection: `401 Unauthorized` with an empty body.
#[must_use]
pub fn unauthorized<B>() -> http::Response<ValidatedBody<B>> {
    let mut response = http::Response::new(Either::Right(Empty::new()));
    *response.status_mut() = http::StatusCode::UNAUTHORIZED;
    response
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use http_body_util::BodyExt;
    use hyper::service::service_fn;

    use super::*;
    use crate::error::SignatureError;

    /// Accepts requests carrying `x-test-allow: yes`.
    #[derive(Debug)]
    struct HeaderValidator;

    impl SignatureValidator for HeaderValidator {
        fn validate_request(&self, req: &http::Request<Bytes>) -> Result<(), SignatureError> {
            match req.headers().get("x-test-allow") {
                Some(v) if v == "yes" => Ok(()),
                _ => Err(SignatureError::SignatureNotFound),
            }
        }
    }

    fn echo_service(
        calls: Arc<AtomicUsize>,
    ) -> impl Service<
        http::Request<Full<Bytes>>,
        Response = http::Response<Full<Bytes>>,
        Error = Infallible,
        Future = impl Future<Output = Result<http::Response<Full<Bytes>>, Infallible>> + Send,
    > + Clone
    + Send
    + 'static {
        service_fn(move |req: http::Request<Full<Bytes>>| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let body = req.into_body().collect().await?.to_bytes();
                Ok::<_, Infallible>(http::Response::new(Full::new(body)))
            }
        })
    }

    #[tokio::test]
    async fn test_should_forward_valid_request_with_body_intact() {
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = HeaderValidator.wrap(echo_service(Arc::clone(&calls)));

        let req = http::Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("x-test-allow", "yes")
            .body(Full::new(Bytes::from_static(b"payload bytes")))
            .unwrap();

        let resp = svc.call(req).await.unwrap();
        assert_eq!(resp.status(), http::StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.as_ref(), b"payload bytes");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_should_reject_invalid_request_with_empty_401() {
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = HeaderValidator.wrap(echo_service(Arc::clone(&calls)));

        let req = http::Request::builder()
            .method("POST")
            .uri("/webhook")
            .body(Full::new(Bytes::from_static(b"payload bytes")))
            .unwrap();

        let resp = svc.call(req).await.unwrap();
        assert_eq!(resp.status(), http::StatusCode::UNAUTHORIZED);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_should_share_validator_between_clones() {
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = HeaderValidator.wrap(echo_service(Arc::clone(&calls)));
        let cloned = svc.clone();
        assert!(std::ptr::eq(svc.validator(), cloned.validator()));
    }
}
