//! Request body buffering.
//!
//! Signature verification needs the complete body, but the handler behind the
//! verifier needs it too. The body stream is therefore collected exactly once
//! into [`Bytes`]; verification borrows it and the downstream handler receives
//! the same bytes again as a fresh [`Full`] body.

use std::fmt::Display;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};

use crate::error::SignatureError;

/// Collect the body of `req` into memory.
///
/// # Errors
///
/// Returns [`SignatureError::Body`] if the body stream fails.
pub async fn buffer_request<B>(req: http::Request<B>) -> Result<http::Request<Bytes>, SignatureError>
where
    B: http_body::Body,
    B::Error: Display,
{
    let (parts, body) = req.into_parts();
    let bytes = body
        .collect()
        .await
        .map_err(|e| SignatureError::Body(e.to_string()))?
        .to_bytes();
    Ok(http::Request::from_parts(parts, bytes))
}

/// Turn a buffered request back into one with a readable body.
#[must_use]
pub fn into_replayable(req: http::Request<Bytes>) -> http::Request<Full<Bytes>> {
    req.map(Full::new)
}
