//! Query string canonicalization for the legacy HMAC scheme.
//!
//! The signer hashes the query string in a normalized form, so the verifier
//! re-parses whatever arrived on the wire and re-encodes it the same way:
//!
//! - parameters are split on `&`, empty segments are skipped
//! - keys and values are form-decoded (`+` is a space, `%XX` escapes)
//! - parameters are sorted by key (bytewise); values of a repeated key keep
//!   their original order
//! - keys and values are re-encoded leaving only `A-Z a-z 0-9 - _ . ~` raw,
//!   spaces become `+`, everything else becomes uppercase `%XX`
//!
//! A `;` inside a segment or a malformed `%` escape makes the query invalid.

use std::collections::BTreeMap;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode, percent_encode};

use crate::error::SignatureError;

/// Characters that stay unescaped in a canonical query component.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Parsed query parameters, sorted by key.
pub type QueryValues = BTreeMap<Vec<u8>, Vec<Vec<u8>>>;

/// Parse a raw query string into its decoded parameters.
///
/// # Errors
///
/// Returns [`SignatureError::InvalidQuery`] for a `;` separator or a malformed
/// percent escape.
pub fn parse_query(raw: &str) -> Result<QueryValues, SignatureError> {
    let mut values = QueryValues::new();

    for segment in raw.split('&') {
        if segment.is_empty() {
            continue;
        }
        if segment.contains(';') {
            return Err(SignatureError::InvalidQuery(
                "invalid semicolon separator in query".to_owned(),
            ));
        }

        let (key, value) = segment.split_once('=').unwrap_or((segment, ""));
        values
            .entry(form_decode(key)?)
            .or_default()
            .push(form_decode(value)?);
    }

    Ok(values)
}

/// Encode parameters in canonical form.
#[must_use]
pub fn encode_query(values: &QueryValues) -> String {
    let mut pairs = Vec::new();
    for (key, vals) in values {
        let key = form_encode(key);
        for val in vals {
            pairs.push(format!("{key}={}", form_encode(val)));
        }
    }
    pairs.join("&")
}

/// Parse and re-encode a raw query string in canonical form.
///
/// # Examples
///
/// ```
/// use messagebird_signature::query::canonical_query;
///
/// assert_eq!(canonical_query("b=2&a=1").unwrap(), "a=1&b=2");
/// assert_eq!(canonical_query("q=hello%20world").unwrap(), "q=hello+world");
/// assert_eq!(canonical_query("").unwrap(), "");
/// ```
///
/// # Errors
///
/// Returns [`SignatureError::InvalidQuery`] when the query cannot be parsed.
pub fn canonical_query(raw: &str) -> Result<String, SignatureError> {
    parse_query(raw).map(|values| encode_query(&values))
}

/// Decode one form-encoded component.
fn form_decode(component: &str) -> Result<Vec<u8>, SignatureError> {
    let bytes = component.as_bytes();

    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                let end = (i + 3).min(bytes.len());
                return Err(SignatureError::InvalidQuery(format!(
                    "invalid URL escape {:?}",
                    String::from_utf8_lossy(&bytes[i..end])
                )));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    // `+` must become a space before unescaping, so that `%2B` stays a plus.
    let spaced: Vec<u8> = bytes
        .iter()
        .map(|&b| if b == b'+' { b' ' } else { b })
        .collect();
    Ok(percent_decode(&spaced).collect())
}

/// Encode one component, using `+` for spaces.
fn form_encode(component: &[u8]) -> String {
    // `%` is always escaped, so `%20` in the output can only come from a space.
    percent_encode(component, QUERY_ENCODE_SET)
        .to_string()
        .replace("%20", "+")
}
