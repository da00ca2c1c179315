//! The request descriptor and its fluent builder.
//!
//! # Design
//! `Request` is built by chaining consuming setters. A setter that is given
//! something invalid does not panic and does not break the chain: the first
//! such error is recorded and replayed by `validate`, which the client calls
//! before any network activity. The data that goes on the wire lives in
//! `RequestParts`, a plain struct the client reads but never mutates, so
//! the same request can be executed again.
//!
//! A request may hold form data, an attachment and a raw body at once.
//! Which one is sent is decided per send by `BodySource::select`.

use std::sync::Arc;
use std::time::Duration;

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::attachment::Attachment;
use crate::auth::{Authentication, NoAuth};
use crate::body::{BodySource, RawBody, Resendable};
use crate::cookies::Cookies;
use crate::error::{RequestError, Result};
use crate::form::{FormData, APPLICATION_JSON_UTF8, OCTET_STREAM, TEXT_PLAIN_UTF8};
use crate::http::{Method, Timeouts};
use crate::listener::{ListenerId, Listeners, RequestListener};
use crate::params::{encode_query, Parameters};

/// Redirect limit used when none is set.
pub const DEFAULT_MAX_REDIRECTS: u32 = 3;

/// Everything about a request that ends up on the wire.
#[derive(Debug, Clone)]
pub struct RequestParts {
    pub method: Method,
    pub url: Option<Url>,
    pub headers: HeaderMap,
    pub cookies: Cookies,
    pub parameters: Parameters,
    pub body: Option<RawBody>,
    pub form: FormData,
    pub attachment: Option<Attachment>,
    pub timeouts: Timeouts,
    pub proxy: Option<String>,
    pub allow_redirects: bool,
    pub max_redirects: u32,
    pub allow_delete_body: bool,
}

impl RequestParts {
    fn new(method: Method) -> Self {
        Self {
            method,
            url: None,
            headers: HeaderMap::new(),
            cookies: Cookies::new(),
            parameters: Parameters::new(),
            body: None,
            form: FormData::new(),
            attachment: None,
            timeouts: Timeouts::default(),
            proxy: None,
            allow_redirects: false,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            allow_delete_body: false,
        }
    }

    /// Whether a raw body may be set and sent.
    pub fn body_allowed(&self) -> bool {
        self.method.permits_body() || (self.method == Method::Delete && self.allow_delete_body)
    }
}

#[derive(Debug)]
pub struct Request {
    parts: RequestParts,
    auth: Arc<dyn Authentication>,
    error: Option<RequestError>,
    listeners: Listeners,
}

impl Request {
    pub fn new(method: Method, url: &str) -> Self {
        let mut request = Self {
            parts: RequestParts::new(method),
            auth: Arc::new(NoAuth),
            error: None,
            listeners: Listeners::default(),
        };
        match Url::parse(url) {
            Ok(parsed) => request.parts.url = Some(parsed),
            Err(e) => request.record(RequestError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            }),
        }
        request
    }

    fn record(&mut self, error: RequestError) {
        if self.error.is_none() {
            debug!(method = %self.parts.method, %error, "recording request configuration error");
            self.error = Some(error);
        }
    }

    // -- Headers, cookies, parameters ----------------------------------------

    /// Set a header, replacing any earlier value with the same
    /// (case-insensitive) name.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        let name = match HeaderName::from_bytes(name.as_bytes()) {
            Ok(name) => name,
            Err(_) => {
                self.record(RequestError::usage(format!("invalid header name '{name}'")));
                return self;
            }
        };
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.parts.headers.insert(name, value);
            }
            Err(_) => self.record(RequestError::usage(format!(
                "invalid value for header '{name}'"
            ))),
        }
        self
    }

    pub fn headers<'a, I>(self, headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        headers
            .into_iter()
            .fold(self, |request, (name, value)| request.header(name, value))
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.cookies.insert(name.into(), value.into());
        self
    }

    pub fn cookies<I, K, V>(mut self, cookies: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.parts
            .cookies
            .extend(cookies.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set a query parameter, replacing earlier values for the name.
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.parameters.set(name, value);
        self
    }

    /// Set a multi-valued query parameter.
    pub fn parameter_values<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.parts.parameters.set_many(name, values);
        self
    }

    pub fn parameters(mut self, parameters: &Parameters) -> Self {
        self.parts.parameters.extend_from(parameters);
        self
    }

    // -- Bodies ----------------------------------------------------------------

    /// Raw UTF-8 text body with media type `text/plain; charset=utf-8`.
    pub fn body_text(self, text: impl Into<String>) -> Self {
        self.set_body(text.into().into_bytes(), TEXT_PLAIN_UTF8.to_string())
    }

    /// Raw bytes with a declared media type. An empty media type falls back
    /// to `application/octet-stream`.
    pub fn body_bytes(self, data: impl Into<Vec<u8>>, media_type: impl Into<String>) -> Self {
        let mut media_type = media_type.into();
        if media_type.is_empty() {
            media_type = OCTET_STREAM.to_string();
        }
        self.set_body(data.into(), media_type)
    }

    /// Serialize `value` as the raw body with media type
    /// `application/json; charset=utf-8`.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(data) => self.set_body(data, APPLICATION_JSON_UTF8.to_string()),
            Err(e) => {
                self.record(RequestError::usage(format!("could not serialize JSON body: {e}")));
                self
            }
        }
    }

    fn set_body(mut self, data: Vec<u8>, media_type: String) -> Self {
        if !self.parts.body_allowed() {
            let method = self.parts.method;
            self.record(RequestError::usage(format!("{method} requests cannot carry a body")));
            return self;
        }
        self.parts.body = Some(RawBody { data, media_type });
        self
    }

    /// Merge form fields into the request. Only POST can send byte and
    /// stream fields; other methods send text and JSON fields as query
    /// parameters.
    pub fn form_data(mut self, form: FormData) -> Self {
        if self.parts.method != Method::Post && form.has_post_only_fields() {
            let method = self.parts.method;
            self.record(RequestError::illegal_state(format!(
                "{method} requests cannot send byte or stream form fields"
            )));
            return self;
        }
        self.parts.form.extend(form);
        self
    }

    /// Attach a single payload as the whole body. POST only.
    pub fn attachment(mut self, attachment: Attachment) -> Self {
        if self.parts.method != Method::Post {
            let method = self.parts.method;
            self.record(RequestError::illegal_state(format!(
                "{method} requests cannot send an attachment"
            )));
            return self;
        }
        self.parts.attachment = Some(attachment);
        self
    }

    /// Allow a DELETE request to carry a raw body. Set it before the body.
    pub fn allow_delete_body(mut self, allow: bool) -> Self {
        self.parts.allow_delete_body = allow;
        self
    }

    // -- Execution options -----------------------------------------------------

    pub fn auth(self, auth: impl Authentication + 'static) -> Self {
        self.shared_auth(Arc::new(auth))
    }

    pub fn shared_auth(mut self, auth: Arc<dyn Authentication>) -> Self {
        self.auth = auth;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.parts.timeouts.connect = Some(timeout);
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.parts.timeouts.read = Some(timeout);
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.parts.timeouts.write = Some(timeout);
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.parts.timeouts = timeouts;
        self
    }

    /// Route the request through an HTTP proxy, e.g. `http://proxy:3128`.
    pub fn proxy(mut self, proxy: &str) -> Self {
        match Url::parse(proxy) {
            Ok(_) => self.parts.proxy = Some(proxy.to_string()),
            Err(e) => self.record(RequestError::InvalidUrl {
                url: proxy.to_string(),
                reason: e.to_string(),
            }),
        }
        self
    }

    pub fn allow_redirects(mut self, allow: bool) -> Self {
        self.parts.allow_redirects = allow;
        self
    }

    pub fn max_redirects(mut self, max: u32) -> Self {
        self.parts.max_redirects = max;
        self
    }

    // -- Listeners -------------------------------------------------------------

    pub fn add_listener(&self, listener: Arc<dyn RequestListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    // -- Inspection --------------------------------------------------------------

    pub fn parts(&self) -> &RequestParts {
        &self.parts
    }

    pub fn method(&self) -> Method {
        self.parts.method
    }

    pub fn url(&self) -> Option<&Url> {
        self.parts.url.as_ref()
    }

    pub fn authentication(&self) -> &dyn Authentication {
        self.auth.as_ref()
    }

    /// The first configuration error recorded while building, if any.
    pub fn error(&self) -> Option<&RequestError> {
        self.error.as_ref()
    }

    /// Fail with the first recorded configuration error.
    pub fn validate(&self) -> Result<()> {
        if let Some(error) = &self.error {
            return Err(replay(error));
        }
        if self.parts.url.is_none() {
            return Err(RequestError::usage("no URL set"));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// The body that a send of this request would carry.
    pub fn body_source(&self) -> BodySource<'_> {
        BodySource::select(
            self.parts.method,
            self.parts.body_allowed(),
            &self.parts.form,
            self.parts.attachment.as_ref(),
            self.parts.body.as_ref(),
        )
    }

    /// Whether this request can be sent more than once.
    pub fn can_resend(&self) -> bool {
        self.body_source().can_resend()
    }

    /// The URL actually requested: the base URL (without fragment) followed
    /// by the query parameters and, for methods other than POST, the text
    /// and JSON form fields.
    pub fn final_url(&self) -> Result<String> {
        let mut base = self
            .parts
            .url
            .clone()
            .ok_or_else(|| RequestError::usage("no URL set"))?;
        base.set_fragment(None);

        let mut pairs: Vec<(String, String)> = self
            .parts
            .parameters
            .pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        if self.parts.method != Method::Post {
            pairs.extend(self.parts.form.query_pairs()?);
        }
        Ok(encode_query(
            base.as_str(),
            pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        ))
    }
}

/// Recorded errors are configuration errors; reproduce one for each call to
/// `validate`.
fn replay(error: &RequestError) -> RequestError {
    match error {
        RequestError::Usage(msg) => RequestError::Usage(msg.clone()),
        RequestError::IllegalState(msg) => RequestError::IllegalState(msg.clone()),
        RequestError::InvalidUrl { url, reason } => RequestError::InvalidUrl {
            url: url.clone(),
            reason: reason.clone(),
        },
        other => RequestError::Usage(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::BasicAuth;
    use http::header::AUTHORIZATION;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn request_is_send_and_sync() {
        assert_send_sync::<Request>();
    }

    #[test]
    fn defaults() {
        let request = Request::new(Method::Get, "http://example.test/");
        assert!(!request.parts().allow_redirects);
        assert_eq!(request.parts().max_redirects, 3);
        assert!(request.parts().timeouts.is_default());
        assert!(request.is_valid());
    }

    #[test]
    fn final_url_encodes_parameters_in_order() {
        let request = Request::new(Method::Get, "http://example.test/search")
            .parameter("q", "a b")
            .parameter_values("tag", ["x", "y"]);
        assert_eq!(
            request.final_url().unwrap(),
            "http://example.test/search?q=a%20b&tag=x&tag=y"
        );
    }

    #[test]
    fn final_url_continues_existing_query_and_drops_fragment() {
        let request = Request::new(Method::Get, "http://example.test/p?x=1#top").parameter("y", "2");
        assert_eq!(request.final_url().unwrap(), "http://example.test/p?x=1&y=2");
    }

    #[test]
    fn non_post_form_text_fields_become_query_pairs() {
        let request = Request::new(Method::Put, "http://h/r")
            .form_data(FormData::new().text("name", "Jo Do"))
            .body_text("payload");
        assert_eq!(request.final_url().unwrap(), "http://h/r?name=Jo%20Do");
        assert!(matches!(request.body_source(), BodySource::Raw(_)));
    }

    #[test]
    fn post_form_fields_stay_out_of_the_url() {
        let request = Request::new(Method::Post, "http://h/r")
            .parameter("p", "1")
            .form_data(FormData::new().text("name", "x"));
        assert_eq!(request.final_url().unwrap(), "http://h/r?p=1");
        assert!(matches!(request.body_source(), BodySource::Multipart(_)));
    }

    #[test]
    fn malformed_url_is_recorded() {
        let request = Request::new(Method::Get, "not a url");
        let err = request.validate().unwrap_err();
        assert!(matches!(err, RequestError::InvalidUrl { .. }));
        // replayed on every call
        assert!(request.validate().is_err());
    }

    #[test]
    fn body_on_get_is_a_usage_error() {
        let request = Request::new(Method::Get, "http://h/").body_text("nope");
        assert!(matches!(request.validate(), Err(RequestError::Usage(_))));
        assert!(request.parts().body.is_none());
    }

    #[test]
    fn delete_body_requires_opt_in() {
        let refused = Request::new(Method::Delete, "http://h/").body_text("x");
        assert!(refused.validate().is_err());

        let accepted = Request::new(Method::Delete, "http://h/")
            .allow_delete_body(true)
            .body_text("x");
        assert!(accepted.is_valid());
        assert!(matches!(accepted.body_source(), BodySource::Raw(_)));
    }

    #[test]
    fn attachment_on_put_is_illegal_state() {
        let request = Request::new(Method::Put, "http://h/").attachment(Attachment::bytes(vec![1]));
        assert!(matches!(request.validate(), Err(RequestError::IllegalState(_))));
    }

    #[test]
    fn byte_form_field_on_get_is_illegal_state() {
        let request = Request::new(Method::Get, "http://h/")
            .form_data(FormData::new().bytes("b", vec![1, 2], OCTET_STREAM));
        assert!(matches!(request.validate(), Err(RequestError::IllegalState(_))));
    }

    #[test]
    fn first_recorded_error_wins() {
        let request = Request::new(Method::Get, "http://h/")
            .header("bad header", "x")
            .body_text("y");
        let err = request.validate().unwrap_err();
        assert!(err.to_string().contains("invalid header name"));
    }

    #[test]
    fn later_raw_body_replaces_earlier() {
        let request = Request::new(Method::Post, "http://h/")
            .body_text("first")
            .body_bytes(b"second".to_vec(), "");
        let body = request.parts().body.as_ref().unwrap();
        assert_eq!(body.data, b"second");
        assert_eq!(body.media_type, OCTET_STREAM);
    }

    #[test]
    fn json_body_sets_media_type() {
        let request = Request::new(Method::Post, "http://h/").json(&serde_json::json!({"a": 1}));
        let body = request.parts().body.as_ref().unwrap();
        assert_eq!(body.media_type, APPLICATION_JSON_UTF8);
        assert_eq!(body.data, br#"{"a":1}"#);
    }

    #[test]
    fn headers_are_case_insensitive_and_last_write_wins() {
        let request = Request::new(Method::Get, "http://h/")
            .header("X-Token", "one")
            .header("x-token", "two");
        assert_eq!(request.parts().headers.get("X-TOKEN").unwrap(), "two");
        assert_eq!(request.parts().headers.len(), 1);
    }

    #[test]
    fn auth_does_not_touch_stored_headers() {
        let request = Request::new(Method::Get, "http://h/").auth(BasicAuth::new("u", "p"));
        let mut headers = request.parts().headers.clone();
        request.authentication().apply(&mut headers).unwrap();
        assert!(headers.contains_key(AUTHORIZATION));
        assert!(!request.parts().headers.contains_key(AUTHORIZATION));
    }

    #[test]
    fn reader_fields_make_request_single_use() {
        let request = Request::new(Method::Post, "http://h/").form_data(FormData::new().reader(
            "upload",
            "data.bin",
            OCTET_STREAM,
            std::io::Cursor::new(vec![1u8, 2, 3]),
        ));
        assert!(!request.can_resend());
        assert!(Request::new(Method::Post, "http://h/").body_text("x").can_resend());
    }

    #[test]
    fn invalid_proxy_is_recorded() {
        let request = Request::new(Method::Get, "http://h/").proxy("::nope");
        assert!(matches!(request.validate(), Err(RequestError::InvalidUrl { .. })));
    }
}
