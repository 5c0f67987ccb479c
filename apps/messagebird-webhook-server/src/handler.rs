//! Handler for verified webhook deliveries.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::service::Service;
use tracing::info;

/// Acknowledges every delivery that reaches it.
///
/// Only requests that passed signature verification are routed here, so the
/// handler just records the delivery and answers `200 OK`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebhookHandler;

impl Service<http::Request<Full<Bytes>>> for WebhookHandler {
    type Response = http::Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Full<Bytes>>) -> Self::Future {
        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let body = body.collect().await?.to_bytes();

            info!(
                method = %parts.method,
                path = parts.uri.path(),
                content_type = parts
                    .headers
                    .get(http::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or(""),
                bytes = body.len(),
                "webhook delivered",
            );

            Ok(ok_response())
        })
    }
}

fn ok_response() -> http::Response<Full<Bytes>> {
    http::Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "text/plain")
        .body(Full::new(Bytes::from_static(b"OK")))
        .expect("static webhook response should be valid")
}
