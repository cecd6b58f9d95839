//! Request boundary – turns a raw unlock request into a status line.
//!
//! The transport hands over the request's query string and `Content-Type`
//! header (if any).  Two query shapes are understood:
//!
//! | Shape | Example |
//! |---|---|
//! | `identity:code` (split at the **last** colon) | `?alice:123456` |
//! | form fields | `?id=alice&password=123456` |
//!
//! A query without a colon is a bare code for the empty identity.  Queries
//! are percent-decoded first.  A request that carries a body content type,
//! or whose query cannot be decoded, is answered with
//! [`StatusLine::REQUEST_DENIED`] without consulting the decision engine.

use std::fmt;

use doorlock_kernel::AuthDecisionEngine;
use doorlock_types::StatusLine;
use thiserror::Error;

/// Identity and code extracted from one request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub identity: String,
    pub code: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("code", &"<redacted>")
            .finish()
    }
}

/// Why a request was refused before reaching the decision engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Malformed {
    #[error("request carries a body content type")]
    ContentType,

    #[error("query is not valid percent-encoded UTF-8")]
    Encoding,

    #[error("form query has no password field")]
    MissingPassword,
}

/// Extract [`Credentials`] from a raw (still percent-encoded) query string.
pub fn parse_query(query: &str) -> Result<Credentials, Malformed> {
    if is_form(query) {
        return parse_form(query);
    }
    let decoded = decode(query)?;
    let (identity, code) = match decoded.rfind(':') {
        Some(p) => (&decoded[..p], &decoded[p + 1..]),
        None => ("", decoded.as_str()),
    };
    Ok(Credentials {
        identity: identity.to_string(),
        code: code.to_string(),
    })
}

/// Validate the request envelope and extract its credentials.
pub fn extract(query: &str, content_type: Option<&str>) -> Result<Credentials, Malformed> {
    if content_type.is_some_and(|ct| !ct.trim().is_empty()) {
        return Err(Malformed::ContentType);
    }
    parse_query(query)
}

/// Run one request through `engine` and return the status line to send.
pub fn respond(engine: &AuthDecisionEngine, query: &str, content_type: Option<&str>) -> StatusLine {
    match extract(query, content_type) {
        Ok(creds) => engine.decide(&creds.identity, &creds.code).status_line(),
        Err(e) => {
            tracing::debug!(reason = %e, "request denied");
            StatusLine::REQUEST_DENIED
        }
    }
}

fn is_form(query: &str) -> bool {
    query
        .split('&')
        .any(|pair| pair.starts_with("id=") || pair.starts_with("password="))
}

fn parse_form(query: &str) -> Result<Credentials, Malformed> {
    let mut identity = String::new();
    let mut code = None;
    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let value = decode(&value.replace('+', " "))?;
        match key {
            "id" => identity = value,
            "password" => code = Some(value),
            _ => {}
        }
    }
    let code = code.ok_or(Malformed::MissingPassword)?;
    Ok(Credentials { identity, code })
}

fn decode(raw: &str) -> Result<String, Malformed> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|_| Malformed::Encoding)
}
