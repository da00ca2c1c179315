//! Plain-data types exchanged with the network transport.
//!
//! # Design
//! The core never touches sockets. The executor assembles a
//! `TransportRequest` (method, final URL, headers, cookies, optional body
//! stream, timeouts, proxy) and hands it to a `Transport`, which answers with
//! a `TransportResponse` carrying the status line, headers and a body
//! stream. Bodies travel as owned readers so that file-backed payloads are
//! streamed and released when the send that owns them ends.

use std::fmt;
use std::io::{self, Read};
use std::time::Duration;

use http::HeaderMap;

/// HTTP method for a request, tagged with whether it may carry a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Head,
    Delete,
    Options,
}

impl Method {
    /// Whether a raw body may be set on a request with this method.
    ///
    /// DELETE reports `false`; a request can still opt in with
    /// `Request::allow_delete_body`.
    pub fn permits_body(self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
        }
    }

    pub fn to_http(self) -> http::Method {
        match self {
            Method::Get => http::Method::GET,
            Method::Post => http::Method::POST,
            Method::Put => http::Method::PUT,
            Method::Patch => http::Method::PATCH,
            Method::Head => http::Method::HEAD,
            Method::Delete => http::Method::DELETE,
            Method::Options => http::Method::OPTIONS,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status codes the executor follows as redirects. 307/308 are not included.
pub const REDIRECT_STATUSES: [u16; 3] = [301, 302, 303];

pub fn is_redirect(status: u16) -> bool {
    REDIRECT_STATUSES.contains(&status)
}

/// Per-request timeouts. `None` leaves the transport default in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Timeouts {
    pub connect: Option<Duration>,
    pub read: Option<Duration>,
    pub write: Option<Duration>,
}

impl Timeouts {
    pub fn is_default(&self) -> bool {
        self.connect.is_none() && self.read.is_none() && self.write.is_none()
    }
}

/// An outgoing body: its media type, its length when known up front, and
/// the bytes as a single-use reader.
pub struct RequestBody {
    pub content_type: String,
    pub content_length: Option<u64>,
    pub reader: Box<dyn Read + Send>,
}

impl RequestBody {
    pub fn from_bytes(content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            content_length: Some(bytes.len() as u64),
            reader: Box::new(io::Cursor::new(bytes)),
        }
    }

    /// Drain the reader into memory. Used by transports that need the whole
    /// payload and by tests.
    pub fn read_to_vec(mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.content_length.unwrap_or(0) as usize);
        self.reader.read_to_end(&mut out)?;
        Ok(out)
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBody")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// A fully assembled request as handed to the transport.
#[derive(Debug)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub cookies: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    pub timeouts: Timeouts,
    pub proxy: Option<String>,
}

/// What the transport returns: the status line, headers and a body stream.
pub struct TransportResponse {
    pub status: u16,
    pub status_message: String,
    pub headers: HeaderMap,
    pub body: Box<dyn Read>,
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("status_message", &self.status_message)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_capable_methods() {
        assert!(Method::Post.permits_body());
        assert!(Method::Put.permits_body());
        assert!(Method::Patch.permits_body());
        assert!(!Method::Get.permits_body());
        assert!(!Method::Head.permits_body());
        assert!(!Method::Delete.permits_body());
        assert!(!Method::Options.permits_body());
    }

    #[test]
    fn redirect_statuses_exclude_307_and_308() {
        assert!(is_redirect(301));
        assert!(is_redirect(302));
        assert!(is_redirect(303));
        assert!(!is_redirect(307));
        assert!(!is_redirect(308));
        assert!(!is_redirect(200));
    }

    #[test]
    fn method_maps_to_http_crate() {
        assert_eq!(Method::Patch.to_http(), http::Method::PATCH);
        assert_eq!(Method::Options.to_string(), "OPTIONS");
    }

    #[test]
    fn request_body_from_bytes_knows_its_length() {
        let body = RequestBody::from_bytes("text/plain", b"hello".to_vec());
        assert_eq!(body.content_length, Some(5));
        assert_eq!(body.read_to_vec().unwrap(), b"hello");
    }
}
