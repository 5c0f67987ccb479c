//! Core types and configuration shared by the MessageBird crates.
//!
//! This crate holds the pieces every other crate in the workspace needs: the
//! [`SigningKey`] secret wrapper, environment-driven [`WebhookConfig`], and the
//! core error type.

mod config;
mod error;
mod types;

pub use config::{SignatureMode, WebhookConfig};
pub use error::{MessageBirdError, MessageBirdResult};
pub use types::SigningKey;
