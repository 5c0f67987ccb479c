//! MessageBird webhook receiver.
//!
//! Accepts MessageBird webhook deliveries and rejects every request whose
//! signature does not verify with `401 Unauthorized`.
//!
//! # Usage
//!
//! ```text
//! MESSAGEBIRD_SIGNING_KEY=... MESSAGEBIRD_WEBHOOK_BASE_URL=https://hooks.example.com \
//!     messagebird-webhook-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `WEBHOOK_LISTEN` | `0.0.0.0:8080` | Bind address |
//! | `MESSAGEBIRD_SIGNING_KEY` | *(required)* | Signing key from the MessageBird dashboard |
//! | `MESSAGEBIRD_SIGNATURE_MODE` | `jwt` | `jwt` or `legacy` |
//! | `MESSAGEBIRD_WEBHOOK_BASE_URL` | *(empty)* | Public base URL; empty disables `url_hash` checks |
//! | `MESSAGEBIRD_MAX_VALIDITY_HOURS` | *(unset)* | Maximum legacy timestamp age |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

mod gateway;
mod handler;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use messagebird_core::{SignatureMode, WebhookConfig};
use messagebird_signature::SignatureValidator;
use messagebird_signature::jwt;
use messagebird_signature::legacy::RequestValidator;

use crate::gateway::ReceiverService;

/// Server version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// Build the validator for the configured signature mode.
fn build_validator(config: &WebhookConfig) -> Arc<dyn SignatureValidator> {
    match config.mode {
        SignatureMode::Jwt => {
            if config.base_url.is_empty() {
                warn!("MESSAGEBIRD_WEBHOOK_BASE_URL is empty, url_hash will not be checked");
            }
            Arc::new(
                jwt::Validator::new(config.signing_key.clone())
                    .for_base_url(config.base_url.clone()),
            )
        }
        SignatureMode::Legacy => {
            let mut validator = RequestValidator::new(config.signing_key.clone());
            if let Some(period) = config.max_validity {
                validator = validator.with_max_validity(period);
            }
            Arc::new(validator)
        }
    }
}

/// Run the accept loop, serving connections until a shutdown signal is received.
async fn serve(listener: TcpListener, service: ReceiverService) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.clone();
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    graceful.shutdown().await;
    info!("all connections drained, exiting");

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = WebhookConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config.log_level)?;

    let validator = build_validator(&config);
    let service = ReceiverService::new(validator, config.mode);

    let addr: SocketAddr = config
        .listen
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.listen))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(
        %addr,
        mode = %config.mode,
        base_url = %config.base_url,
        max_validity_secs = config.max_validity.map(|d| d.as_secs()),
        version = VERSION,
        "starting MessageBird webhook server",
    );

    serve(listener, service).await
}
