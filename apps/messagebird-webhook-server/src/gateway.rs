//! Top-level service of the receiver.
//!
//! Health probes (`GET /health`) are answered directly. Everything else is a
//! webhook delivery and goes through signature verification first.

use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{Either, Full};
use hyper::service::Service;

use messagebird_core::SignatureMode;
use messagebird_signature::SignatureValidator;
use messagebird_signature::ValidateService;
use messagebird_signature::middleware::ValidatedBody;

use crate::handler::WebhookHandler;

/// Response body of the receiver.
pub type ReceiverBody = ValidatedBody<Full<Bytes>>;

/// Routes health probes and verified webhook deliveries.
#[derive(Debug, Clone)]
pub struct ReceiverService {
    webhook: ValidateService<WebhookHandler, Arc<dyn SignatureValidator>>,
    mode: SignatureMode,
}

impl ReceiverService {
    /// Create a receiver verifying deliveries with `validator`.
    pub fn new(validator: Arc<dyn SignatureValidator>, mode: SignatureMode) -> Self {
        Self {
            webhook: validator.wrap(WebhookHandler),
            mode,
        }
    }
}

impl<B> Service<http::Request<B>> for ReceiverService
where
    B: http_body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Display,
{
    type Response = http::Response<ReceiverBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<B>) -> Self::Future {
        if is_health_check(req.method(), req.uri().path()) {
            let mode = self.mode;
            return Box::pin(async move { Ok(health_check_response(mode)) });
        }

        self.webhook.call(req)
    }
}

/// Check if the request is a health check probe.
fn is_health_check(method: &http::Method, path: &str) -> bool {
    *method == http::Method::GET && (path == "/health" || path == "/_health")
}

/// Produce the health check response.
fn health_check_response(mode: SignatureMode) -> http::Response<ReceiverBody> {
    let body = serde_json::json!({ "status": "running", "signature_mode": mode.as_str() });
    http::Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Either::Left(Full::new(Bytes::from(body.to_string()))))
        .expect("static health response should be valid")
}
