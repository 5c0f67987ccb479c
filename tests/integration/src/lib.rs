//! End-to-end tests for webhook signature verification.
//!
//! Each test starts an in-process hyper server on an ephemeral port, guarded by
//! the validator under test, and talks to it over real TCP with `reqwest`. The
//! guarded handler echoes the request body back so tests can check that the
//! body survives verification unchanged.
//!
//! ```text
//! cargo test -p messagebird-integration
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Once;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use messagebird_signature::SignatureValidator;
use tokio::net::TcpListener;

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Echo the request body back with `200 OK`.
async fn echo(req: http::Request<Full<Bytes>>) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let body = req.into_body().collect().await?.to_bytes();
    Ok(http::Response::new(Full::new(body)))
}

/// Start a server guarded by the validator `make_validator` builds for the
/// bound address, and return that address.
///
/// The server runs until the test's runtime shuts down.
pub async fn spawn_server<V, F>(make_validator: F) -> SocketAddr
where
    V: SignatureValidator + 'static,
    F: FnOnce(SocketAddr) -> V,
{
    init_tracing();

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let service = make_validator(addr).wrap(service_fn(echo));

    tokio::spawn(async move {
        let http = HttpConnBuilder::new(TokioExecutor::new());
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                continue;
            };
            let conn = http
                .serve_connection(TokioIo::new(stream), service.clone())
                .into_owned();
            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    tracing::debug!(error = %e, "test connection error");
                }
            });
        }
    });

    addr
}

/// HTTP client for talking to a test server.
#[must_use]
pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

mod test_jwt;
mod test_legacy;
