//! The network boundary.
//!
//! # Design
//! The executor only ever talks to a `Transport`: one call sends one fully
//! assembled request and returns the raw status, headers and body stream.
//! Redirects, challenges, cookies and sinks are all handled above this
//! layer, so tests drive the executor with a scripted transport and
//! production code uses `UreqTransport`.
//!
//! `UreqTransport` never follows redirects itself and never turns 4xx/5xx
//! into errors. ureq fixes timeouts and proxy per agent, so one agent is
//! built for each distinct (timeouts, proxy) combination and reused.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;

use http::header::{CONTENT_LENGTH, CONTENT_TYPE, COOKIE, USER_AGENT};
use http::{HeaderMap, HeaderValue, Uri};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::ClientConfig;
use crate::cookies::cookie_header;
use crate::error::{RequestError, Result};
use crate::http::{Method, RequestBody, Timeouts, TransportRequest, TransportResponse};

pub trait Transport: Send + Sync {
    /// Perform exactly one HTTP exchange. Statuses of any value are returned
    /// as responses, not errors.
    fn send(&self, request: TransportRequest) -> Result<TransportResponse>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AgentKey {
    timeouts: Timeouts,
    proxy: Option<String>,
}

/// Blocking transport backed by a ureq agent.
pub struct UreqTransport {
    timeouts: Timeouts,
    proxy: Option<String>,
    user_agent: Option<HeaderValue>,
    agents: Mutex<HashMap<AgentKey, ureq::Agent>>,
}

impl UreqTransport {
    pub fn new() -> Self {
        Self {
            timeouts: Timeouts::default(),
            proxy: None,
            user_agent: None,
            agents: Mutex::new(HashMap::new()),
        }
    }

    /// Transport whose defaults come from `config`. Per-request timeouts and
    /// proxy take precedence over these.
    pub fn with_config(config: &ClientConfig) -> Result<Self> {
        let user_agent = config
            .user_agent
            .as_deref()
            .map(HeaderValue::from_str)
            .transpose()
            .map_err(|_| RequestError::Config("user_agent is not a valid header value".into()))?;
        Ok(Self {
            timeouts: config.timeouts(),
            proxy: config.proxy.clone(),
            user_agent,
            agents: Mutex::new(HashMap::new()),
        })
    }

    fn agent(&self, key: AgentKey) -> Result<ureq::Agent> {
        let mut agents = self.agents.lock();
        if let Some(agent) = agents.get(&key) {
            return Ok(agent.clone());
        }
        debug!(timeouts = ?key.timeouts, proxy = ?key.proxy, "building ureq agent");
        let agent = build_agent(&key)?;
        agents.insert(key, agent.clone());
        Ok(agent)
    }

    fn effective_key(&self, request: &TransportRequest) -> AgentKey {
        AgentKey {
            timeouts: Timeouts {
                connect: request.timeouts.connect.or(self.timeouts.connect),
                read: request.timeouts.read.or(self.timeouts.read),
                write: request.timeouts.write.or(self.timeouts.write),
            },
            proxy: request.proxy.clone().or_else(|| self.proxy.clone()),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport")
            .field("timeouts", &self.timeouts)
            .field("proxy", &self.proxy)
            .field("agents", &self.agents.lock().len())
            .finish()
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let agent = self.agent(self.effective_key(&request))?;
        let TransportRequest {
            method,
            url,
            mut headers,
            cookies,
            body,
            ..
        } = request;

        let cookie = cookie_header(cookies.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(cookie) = cookie {
            let value = HeaderValue::from_str(&cookie)
                .map_err(|_| RequestError::usage("cookie contains characters not allowed in a header"))?;
            headers.insert(COOKIE, value);
        }
        if let Some(user_agent) = &self.user_agent {
            if !headers.contains_key(USER_AGENT) {
                headers.insert(USER_AGENT, user_agent.clone());
            }
        }

        trace!(%method, %url, "ureq send");
        let response = match body {
            Some(body) => {
                let reader = stage_body(&mut headers, body)?;
                run(&agent, method, &url, headers, ureq::SendBody::from_owned_reader(reader))
            }
            None => run(&agent, method, &url, headers, ()),
        }?;

        let status = response.status();
        let (parts, body) = response.into_parts();
        Ok(TransportResponse {
            status: status.as_u16(),
            status_message: status.canonical_reason().unwrap_or("").to_string(),
            headers: parts.headers,
            body: Box::new(body.into_reader()),
        })
    }
}

/// Move the body's declared type and length into the headers and return
/// its reader.
fn stage_body(headers: &mut HeaderMap, body: RequestBody) -> Result<Box<dyn Read + Send>> {
    let content_type = HeaderValue::from_str(&body.content_type)
        .map_err(|_| RequestError::usage("media type is not a valid header value"))?;
    headers.entry(CONTENT_TYPE).or_insert(content_type);
    if let Some(length) = body.content_length {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    }
    Ok(body.reader)
}

fn run<B: ureq::AsSendBody>(
    agent: &ureq::Agent,
    method: Method,
    url: &str,
    headers: HeaderMap,
    body: B,
) -> Result<http::Response<ureq::Body>> {
    let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| RequestError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    let mut request = http::Request::new(body);
    *request.method_mut() = method.to_http();
    *request.uri_mut() = uri;
    *request.headers_mut() = headers;
    agent
        .run(request)
        .map_err(|e| RequestError::Transport(e.to_string()))
}

fn build_agent(key: &AgentKey) -> Result<ureq::Agent> {
    let mut builder = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .max_redirects(0)
        .max_redirects_will_error(false)
        .timeout_connect(key.timeouts.connect)
        .timeout_recv_response(key.timeouts.read)
        .timeout_recv_body(key.timeouts.read)
        .timeout_send_body(key.timeouts.write);
    if let Some(proxy) = &key.proxy {
        let proxy = ureq::Proxy::new(proxy).map_err(|e| RequestError::InvalidUrl {
            url: proxy.clone(),
            reason: e.to_string(),
        })?;
        builder = builder.proxy(Some(proxy));
    }
    Ok(builder.build().new_agent())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(timeouts: Timeouts, proxy: Option<&str>) -> TransportRequest {
        TransportRequest {
            method: Method::Get,
            url: "http://127.0.0.1:1/".to_string(),
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            body: None,
            timeouts,
            proxy: proxy.map(str::to_string),
        }
    }

    #[test]
    fn request_settings_override_config_defaults() {
        let config = ClientConfig {
            connect_timeout_ms: Some(100),
            read_timeout_ms: Some(200),
            proxy: Some("http://default:3128".into()),
            ..ClientConfig::default()
        };
        let transport = UreqTransport::with_config(&config).unwrap();
        let key = transport.effective_key(&request(
            Timeouts {
                read: Some(Duration::from_secs(5)),
                ..Timeouts::default()
            },
            Some("http://override:8080"),
        ));
        assert_eq!(key.timeouts.connect, Some(Duration::from_millis(100)));
        assert_eq!(key.timeouts.read, Some(Duration::from_secs(5)));
        assert_eq!(key.timeouts.write, None);
        assert_eq!(key.proxy.as_deref(), Some("http://override:8080"));
    }

    #[test]
    fn agents_are_reused_per_profile() {
        let transport = UreqTransport::new();
        let fast = Timeouts {
            connect: Some(Duration::from_millis(50)),
            ..Timeouts::default()
        };
        transport.agent(transport.effective_key(&request(fast, None))).unwrap();
        transport.agent(transport.effective_key(&request(fast, None))).unwrap();
        transport
            .agent(transport.effective_key(&request(Timeouts::default(), None)))
            .unwrap();
        assert_eq!(transport.agents.lock().len(), 2);
    }

    #[test]
    fn invalid_user_agent_is_rejected() {
        let config = ClientConfig {
            user_agent: Some("bad\nagent".into()),
            ..ClientConfig::default()
        };
        assert!(matches!(
            UreqTransport::with_config(&config),
            Err(RequestError::Config(_))
        ));
    }

    #[test]
    fn staging_keeps_a_declared_content_type() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));
        let body = RequestBody::from_bytes("text/plain", b"<a/>".to_vec());
        stage_body(&mut headers, body).unwrap();
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/xml");
        assert_eq!(headers.get(CONTENT_LENGTH).unwrap(), "4");
    }

    #[test]
    fn staging_moves_type_and_length_into_headers() {
        let mut headers = HeaderMap::new();
        let body = RequestBody::from_bytes("text/plain", b"hello".to_vec());
        let mut reader = stage_body(&mut headers, body).unwrap();
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "text/plain");
        assert_eq!(headers.get(CONTENT_LENGTH).unwrap(), "5");
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello");
    }
}
