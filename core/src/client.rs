//! Request execution: redirects, challenges, sinks and listeners.
//!
//! # Design
//! `Client` holds only a shared `Transport` and carries no per-request state;
//! the redirect counter and current URL live on the stack of one `execute`
//! call, so concurrent executions never interfere and a request can be run
//! again with a fresh count.
//!
//! One execution moves through these states:
//!
//! ```text
//! Validated -> Sent -> Redirecting -> Sent -> ... -> Completed
//!                  \-> Failed                    \-> Failed
//! ```
//!
//! A 301/302/303 answer is a redirect. Each one increments the counter; the
//! execution fails once the counter reaches the request's limit, so a limit
//! of N allows at most N sends. The body of an intermediate redirect is
//! discarded unread. A 401/407 answer is offered once per hop to the
//! request's authentication, which may supply headers for a single retry.
//!
//! Listeners are notified last: after the sink has finished and the
//! transport body has been dropped, or after the failure has been decided.

use std::io::{ErrorKind, Read};
use std::sync::Arc;

use http::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE, LOCATION};
use http::HeaderMap;
use tracing::{debug, warn};
use url::Url;

use crate::auth::{is_challenge, Challenge};
use crate::body::{BodySource, Resendable};
use crate::config::ClientConfig;
use crate::error::{RequestError, Result};
use crate::http::{is_redirect, RequestBody, TransportRequest, TransportResponse};
use crate::request::Request;
use crate::response::{Response, ResponseSink};
use crate::transport::{Transport, UreqTransport};

const CHUNK_SIZE: usize = 8 * 1024;

/// Executes requests over a `Transport`. Cloning is cheap and clones share
/// the transport.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
}

impl Client {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    pub fn from_shared(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// A client over `UreqTransport` configured from `config`.
    pub fn with_config(config: &ClientConfig) -> Result<Self> {
        Ok(Self::new(UreqTransport::with_config(config)?))
    }

    /// Execute and buffer the whole body in memory.
    pub fn execute(&self, request: &Request) -> Result<Response> {
        self.execute_into(request, ResponseSink::buffered())
    }

    /// Execute and feed the final response body into `sink`.
    pub fn execute_into(&self, request: &Request, sink: ResponseSink) -> Result<Response> {
        match self.run(request, sink) {
            Ok(response) => {
                request.listeners().notify_executed(request, &response);
                Ok(response)
            }
            Err(error) => {
                warn!(method = %request.method(), %error, "request failed");
                request.listeners().notify_failed(request, &error);
                Err(error)
            }
        }
    }

    fn run(&self, request: &Request, sink: ResponseSink) -> Result<Response> {
        request.validate()?;
        let parts = request.parts();
        let origin = parts
            .url
            .as_ref()
            .ok_or_else(|| RequestError::usage("no URL set"))?;
        let source = request.body_source();
        let mut url = request.final_url()?;
        let mut redirects = 0u32;

        loop {
            let response = self.send_hop(request, source, &url)?;
            if !is_redirect(response.status) {
                return complete(response, url, sink);
            }

            let status = response.status;
            let location = response
                .headers
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            drop(response);

            if !parts.allow_redirects {
                return Err(RequestError::RedirectsDisallowed { url });
            }
            redirects += 1;
            if redirects >= parts.max_redirects {
                return Err(RequestError::TooManyRedirects {
                    max: parts.max_redirects,
                    url: origin.to_string(),
                });
            }
            let location = location.ok_or(RequestError::MissingLocation { status })?;
            let next = resolve_location(origin, &url, &location)?;
            debug!(status, from = %url, to = %next, redirects, "following redirect");
            url = next;
        }
    }

    /// One hop: send, and on a challenge that the authentication answers,
    /// send once more with the extra headers.
    fn send_hop(&self, request: &Request, source: BodySource<'_>, url: &str) -> Result<TransportResponse> {
        let first = self.send_once(request, source, url, None)?;
        if !is_challenge(first.status) {
            return Ok(first);
        }
        let challenge = Challenge {
            status: first.status,
            url,
            headers: &first.headers,
        };
        let Some(extra) = request.authentication().respond(&challenge)? else {
            return Ok(first);
        };
        if !source.can_resend() {
            warn!(url, status = first.status, "challenge not answered: body cannot be sent twice");
            return Ok(first);
        }
        debug!(
            url = challenge.url,
            status = challenge.status,
            schemes = ?challenge.schemes(),
            "answering authentication challenge"
        );
        drop(first);
        self.send_once(request, source, url, Some(extra))
    }

    fn send_once(
        &self,
        request: &Request,
        source: BodySource<'_>,
        url: &str,
        extra: Option<HeaderMap>,
    ) -> Result<TransportResponse> {
        let parts = request.parts();
        let mut headers = parts.headers.clone();
        request.authentication().apply(&mut headers)?;
        if let Some(extra) = extra {
            headers.extend(extra);
        }
        if let Some(disposition) = source.content_disposition() {
            let value = HeaderValue::from_str(&disposition)
                .map_err(|_| RequestError::usage("attachment name is not a valid header value"))?;
            headers.insert(CONTENT_DISPOSITION, value);
        }

        let mut body = source.render()?;
        if let Some(body) = body.as_mut() {
            declare_content_type(&mut headers, body, &source);
        }
        debug!(method = %parts.method, url, has_body = body.is_some(), "sending request");
        self.transport.send(TransportRequest {
            method: parts.method,
            url: url.to_string(),
            headers,
            cookies: parts
                .cookies
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            body,
            timeouts: parts.timeouts,
            proxy: parts.proxy.clone(),
        })
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new(UreqTransport::new())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

/// A `Content-Type` set on the request overrides the body's default media
/// type. Multipart bodies keep their generated type since it carries the
/// boundary.
fn declare_content_type(headers: &mut HeaderMap, body: &mut RequestBody, source: &BodySource<'_>) {
    if matches!(source, BodySource::Multipart(_)) {
        if headers.remove(CONTENT_TYPE).is_some() {
            warn!("Content-Type header replaced by the multipart boundary type");
        }
        return;
    }
    if let Some(declared) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        body.content_type = declared.to_string();
    }
}

/// Drain the final response body into the sink, then release the body.
fn complete(response: TransportResponse, url: String, mut sink: ResponseSink) -> Result<Response> {
    let TransportResponse {
        status,
        status_message,
        headers,
        body,
    } = response;

    if let Err(e) = drain(status, body, &mut sink) {
        sink.abort();
        return Err(e);
    }
    debug!(status, %url, bytes = sink.len(), "request completed");
    Ok(Response::new(status, status_message, headers, url, sink))
}

fn drain(status: u16, mut body: Box<dyn Read>, sink: &mut ResponseSink) -> Result<()> {
    sink.init(status)?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(RequestError::Io(e)),
        };
        sink.append(&buf[..n])?;
    }
    drop(body);
    sink.finish()
}

/// Work out the next URL from a `Location` value. An absolute path is
/// joined to the scheme, host and port of the original request; anything
/// else relative is resolved against the URL that answered with the
/// redirect.
pub fn resolve_location(origin: &Url, current: &str, location: &str) -> Result<String> {
    if location.starts_with('/') && !location.starts_with("//") {
        let mut next = format!("{}://{}", origin.scheme(), origin.host_str().unwrap_or_default());
        if let Some(port) = origin.port() {
            next.push_str(&format!(":{port}"));
        }
        next.push_str(location);
        return Ok(next);
    }
    match Url::parse(location) {
        Ok(_) => Ok(location.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse(current).map_err(|e| RequestError::InvalidUrl {
                url: current.to_string(),
                reason: e.to_string(),
            })?;
            base.join(location)
                .map(String::from)
                .map_err(|e| RequestError::InvalidUrl {
                    url: location.to_string(),
                    reason: e.to_string(),
                })
        }
        Err(e) => Err(RequestError::InvalidUrl {
            url: location.to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn absolute_path_keeps_origin_port() {
        let next = resolve_location(&origin("http://host:1234/a"), "http://host:1234/a", "/next").unwrap();
        assert_eq!(next, "http://host:1234/next");
    }

    #[test]
    fn absolute_path_uses_origin_not_current_host() {
        let next = resolve_location(
            &origin("https://first.test/a"),
            "http://second.test:8080/b",
            "/c?d=1",
        )
        .unwrap();
        assert_eq!(next, "https://first.test/c?d=1");
    }

    #[test]
    fn absolute_location_is_taken_verbatim() {
        let next = resolve_location(&origin("http://a/"), "http://a/", "http://b.test/x").unwrap();
        assert_eq!(next, "http://b.test/x");
    }

    #[test]
    fn relative_location_joins_current_url() {
        let next = resolve_location(&origin("http://a/"), "http://a/dir/page", "other").unwrap();
        assert_eq!(next, "http://a/dir/other");
        let scheme_relative =
            resolve_location(&origin("http://a/"), "http://a/dir/page", "//b.test/p").unwrap();
        assert_eq!(scheme_relative, "http://b.test/p");
    }
}
