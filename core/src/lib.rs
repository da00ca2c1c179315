//! Fluent HTTP request building and blocking execution.
//!
//! # Overview
//! A `Request` is assembled with chained setters (URL, parameters, headers,
//! cookies, one of several body representations, authentication, timeouts,
//! redirect policy) and executed by a `Client`, which follows redirects,
//! answers authentication challenges and feeds the final body into a
//! `ResponseSink`. A `Session` shares a cookie jar and defaults between
//! requests.
//!
//! ```no_run
//! use requests_core::{get, Client};
//!
//! let client = Client::default();
//! let request = get("http://example.test/search")
//!     .parameter("q", "a b")
//!     .allow_redirects(true);
//! let response = client.execute(&request)?;
//! println!("{} {}", response.status(), response.text()?);
//! # Ok::<(), requests_core::RequestError>(())
//! ```
//!
//! # Design
//! - The network sits behind the `Transport` trait. `UreqTransport` is the
//!   production implementation; tests script responses directly.
//! - Configuration mistakes are recorded on the request and reported before
//!   anything is sent.
//! - Bodies and response sinks are streamed in chunks; files are opened only
//!   for the send or the write that needs them.

pub mod attachment;
pub mod auth;
pub mod body;
pub mod client;
pub mod config;
pub mod cookies;
pub mod error;
pub mod form;
pub mod http;
pub mod listener;
pub mod params;
pub mod request;
pub mod response;
pub mod session;
pub mod transport;

pub use crate::attachment::Attachment;
pub use crate::auth::{Authentication, BasicAuth, BearerAuth, Challenge, ChallengeAuth, NoAuth};
pub use crate::body::{BodySource, RawBody, Resendable};
pub use crate::client::Client;
pub use crate::config::ClientConfig;
pub use crate::cookies::Cookies;
pub use crate::error::{RequestError, Result};
pub use crate::form::{FormData, FormField};
pub use crate::http::{Method, Timeouts, TransportRequest, TransportResponse};
pub use crate::listener::{ListenerId, RequestListener};
pub use crate::params::Parameters;
pub use crate::request::{Request, RequestParts};
pub use crate::response::{Charset, Response, ResponseSink};
pub use crate::session::Session;
pub use crate::transport::{Transport, UreqTransport};

pub fn get(url: &str) -> Request {
    Request::new(Method::Get, url)
}

pub fn post(url: &str) -> Request {
    Request::new(Method::Post, url)
}

pub fn put(url: &str) -> Request {
    Request::new(Method::Put, url)
}

pub fn patch(url: &str) -> Request {
    Request::new(Method::Patch, url)
}

pub fn head(url: &str) -> Request {
    Request::new(Method::Head, url)
}

pub fn delete(url: &str) -> Request {
    Request::new(Method::Delete, url)
}

pub fn options(url: &str) -> Request {
    Request::new(Method::Options, url)
}
