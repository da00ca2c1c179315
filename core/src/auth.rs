//! Authentication strategies.
//!
//! # Design
//! A strategy either stamps credentials onto the headers of every send
//! (`apply`) or stays silent until the server challenges with 401/407 and
//! then supplies the headers for a single retry (`respond`). Both work on
//! the per-send header map, never on the request itself, so applying a
//! strategy does not change what a resent request looks like.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::{AUTHORIZATION, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, WWW_AUTHENTICATE};
use http::{HeaderMap, HeaderValue};

use crate::error::{RequestError, Result};

/// A 401 or 407 answer from the server.
#[derive(Debug, Clone, Copy)]
pub struct Challenge<'a> {
    pub status: u16,
    pub url: &'a str,
    pub headers: &'a HeaderMap,
}

impl Challenge<'_> {
    pub fn is_proxy(&self) -> bool {
        self.status == 407
    }

    /// The authentication schemes offered, e.g. `["Basic"]`.
    pub fn schemes(&self) -> Vec<&str> {
        let name = if self.is_proxy() {
            PROXY_AUTHENTICATE
        } else {
            WWW_AUTHENTICATE
        };
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split_whitespace().next())
            .collect()
    }
}

/// Whether a status code is an authentication challenge.
pub fn is_challenge(status: u16) -> bool {
    status == 401 || status == 407
}

pub trait Authentication: fmt::Debug + Send + Sync {
    /// Add credentials to the headers of an outgoing send.
    fn apply(&self, _headers: &mut HeaderMap) -> Result<()> {
        Ok(())
    }

    /// Headers to retry with after a challenge; `None` means no retry.
    fn respond(&self, _challenge: &Challenge<'_>) -> Result<Option<HeaderMap>> {
        Ok(None)
    }
}

/// Sends no credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl Authentication for NoAuth {}

/// Preemptive HTTP Basic authentication.
#[derive(Clone)]
pub struct BasicAuth {
    user: String,
    password: String,
}

impl BasicAuth {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn header_value(&self) -> String {
        basic_credentials(&self.user, &self.password)
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Authentication for BasicAuth {
    fn apply(&self, headers: &mut HeaderMap) -> Result<()> {
        headers.insert(AUTHORIZATION, header_value(&self.header_value())?);
        Ok(())
    }
}

/// Preemptive bearer-token authentication.
#[derive(Clone)]
pub struct BearerAuth {
    token: String,
}

impl BearerAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerAuth(<redacted>)")
    }
}

impl Authentication for BearerAuth {
    fn apply(&self, headers: &mut HeaderMap) -> Result<()> {
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", self.token))?);
        Ok(())
    }
}

/// Basic credentials sent only after the server (or proxy) asks for them.
#[derive(Clone)]
pub struct ChallengeAuth {
    user: String,
    password: String,
}

impl ChallengeAuth {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for ChallengeAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChallengeAuth")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Authentication for ChallengeAuth {
    fn respond(&self, challenge: &Challenge<'_>) -> Result<Option<HeaderMap>> {
        let offers_basic = challenge
            .schemes()
            .iter()
            .any(|s| s.eq_ignore_ascii_case("basic"));
        if !offers_basic {
            return Ok(None);
        }
        let name = if challenge.is_proxy() {
            PROXY_AUTHORIZATION
        } else {
            AUTHORIZATION
        };
        let mut headers = HeaderMap::new();
        headers.insert(
            name,
            header_value(&basic_credentials(&self.user, &self.password))?,
        );
        Ok(Some(headers))
    }
}

fn basic_credentials(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| RequestError::usage("credentials contain characters not allowed in a header"))
}
