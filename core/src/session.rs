//! Requests that share cookies and defaults.
//!
//! # Design
//! A session stamps its defaults (auth, timeouts, proxy, redirect policy,
//! cookie jar) onto each request it creates and registers a one-shot
//! listener on it. When the request completes with a status below 400, the
//! listener merges the response cookies into the jar; on completion or
//! failure it removes itself. An atomic flag makes sure the jar is updated
//! at most once per request, even if the request is executed again or is
//! notified from several threads.
//!
//! The jar is shared behind a mutex; cloning a `Session` shares the jar.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::auth::{Authentication, NoAuth};
use crate::config::ClientConfig;
use crate::cookies::Cookies;
use crate::error::RequestError;
use crate::http::{Method, Timeouts};
use crate::listener::{ListenerId, RequestListener};
use crate::request::{Request, DEFAULT_MAX_REDIRECTS};
use crate::response::Response;

#[derive(Debug, Clone)]
pub struct Session {
    jar: Arc<Mutex<Cookies>>,
    auth: Arc<dyn Authentication>,
    timeouts: Timeouts,
    proxy: Option<String>,
    allow_redirects: bool,
    max_redirects: u32,
}

impl Session {
    pub fn new() -> Self {
        Self {
            jar: Arc::new(Mutex::new(Cookies::new())),
            auth: Arc::new(NoAuth),
            timeouts: Timeouts::default(),
            proxy: None,
            allow_redirects: false,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }

    pub fn with_config(config: &ClientConfig) -> Self {
        Self {
            timeouts: config.timeouts(),
            proxy: config.proxy.clone(),
            allow_redirects: config.allow_redirects,
            max_redirects: config.max_redirects,
            ..Self::new()
        }
    }

    pub fn auth(mut self, auth: impl Authentication + 'static) -> Self {
        self.auth = Arc::new(auth);
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn allow_redirects(mut self, allow: bool) -> Self {
        self.allow_redirects = allow;
        self
    }

    pub fn max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = max;
        self
    }

    pub fn get(&self, url: &str) -> Request {
        self.request(Method::Get, url)
    }

    pub fn post(&self, url: &str) -> Request {
        self.request(Method::Post, url)
    }

    pub fn put(&self, url: &str) -> Request {
        self.request(Method::Put, url)
    }

    pub fn patch(&self, url: &str) -> Request {
        self.request(Method::Patch, url)
    }

    pub fn head(&self, url: &str) -> Request {
        self.request(Method::Head, url)
    }

    pub fn delete(&self, url: &str) -> Request {
        self.request(Method::Delete, url)
    }

    pub fn options(&self, url: &str) -> Request {
        self.request(Method::Options, url)
    }

    pub fn request(&self, method: Method, url: &str) -> Request {
        self.process(Request::new(method, url))
    }

    /// Apply the session defaults to `request` and attach the cookie
    /// listener. Settings made on the request afterwards override the
    /// defaults.
    pub fn process(&self, request: Request) -> Request {
        let mut request = request
            .cookies(self.cookies())
            .shared_auth(Arc::clone(&self.auth))
            .timeouts(self.timeouts)
            .allow_redirects(self.allow_redirects)
            .max_redirects(self.max_redirects);
        if let Some(proxy) = &self.proxy {
            request = request.proxy(proxy);
        }

        let jar = Arc::clone(&self.jar);
        request.listeners().add_with(move |id| {
            Arc::new(SessionListener {
                id,
                jar,
                fired: AtomicBool::new(false),
            })
        });
        request
    }

    /// Snapshot of the cookie jar.
    pub fn cookies(&self) -> Cookies {
        self.jar.lock().clone()
    }

    pub fn set_cookie(&self, name: impl Into<String>, value: impl Into<String>) {
        self.jar.lock().insert(name.into(), value.into());
    }

    pub fn clear_cookies(&self) {
        self.jar.lock().clear();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

struct SessionListener {
    id: ListenerId,
    jar: Arc<Mutex<Cookies>>,
    fired: AtomicBool,
}

impl SessionListener {
    /// True only for the first caller.
    fn claim(&self) -> bool {
        !self.fired.swap(true, Ordering::AcqRel)
    }
}

impl RequestListener for SessionListener {
    fn request_executed(&self, request: &Request, response: &Response) {
        if !self.claim() {
            return;
        }
        if response.ok() {
            let cookies = response.cookies();
            if !cookies.is_empty() {
                debug!(count = cookies.len(), "merging response cookies into session");
                self.jar
                    .lock()
                    .extend(cookies.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        request.remove_listener(self.id);
    }

    fn request_failed(&self, request: &Request, _error: &RequestError) {
        if self.claim() {
            request.remove_listener(self.id);
        }
    }
}
