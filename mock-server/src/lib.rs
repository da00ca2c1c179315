//! Local HTTP peer for exercising the request client end to end.
//!
//! Routes:
//! - `ANY /echo[/*]` describes the request it received as JSON.
//! - `GET /redirect/{n}` answers 302 with a relative `Location` until `n` is 0.
//! - `GET /redirect-absolute/{n}` does the same with absolute locations.
//! - `GET /see-other` answers 303 to `/echo`.
//! - `GET /loop` redirects to itself forever.
//! - `GET /no-location` answers 302 without a `Location` header.
//! - `GET /cookies/set?name=value` sets one cookie per query pair.
//! - `GET /cookies` returns the cookies the client sent.
//! - `GET /status/{code}` answers with `code` and sets a `status` cookie.
//! - `GET /basic-auth/{user}/{password}` challenges until given matching
//!   Basic credentials.
//! - `GET /bytes/{n}` returns `n` bytes counting up modulo 256.

use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::{Path, Query},
    http::{
        header::{AUTHORIZATION, COOKIE, HOST, LOCATION, SET_COOKIE, WWW_AUTHENTICATE},
        HeaderMap, Method, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// What `/echo` saw.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub body_len: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthOutcome {
    pub authenticated: bool,
    pub user: String,
}

pub fn app() -> Router {
    Router::new()
        .route("/echo", any(echo))
        .route("/echo/{*rest}", any(echo))
        .route("/redirect/{n}", get(redirect_relative))
        .route("/redirect-absolute/{n}", get(redirect_absolute))
        .route("/see-other", get(see_other))
        .route("/loop", get(redirect_loop))
        .route("/no-location", get(no_location))
        .route("/cookies", get(cookies))
        .route("/cookies/set", get(set_cookies))
        .route("/status/{code}", get(status))
        .route("/basic-auth/{user}/{password}", get(basic_auth))
        .route("/bytes/{n}", get(bytes))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Echo> {
    let mut seen = BTreeMap::new();
    for (name, value) in &headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        seen.entry(name.as_str().to_string())
            .and_modify(|v: &mut String| {
                v.push_str(", ");
                v.push_str(&value);
            })
            .or_insert(value);
    }
    Json(Echo {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers: seen,
        body: String::from_utf8_lossy(&body).into_owned(),
        body_len: body.len(),
    })
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())], "redirecting").into_response()
}

async fn redirect_relative(Path(n): Path<u32>) -> Response {
    match n {
        0 => (StatusCode::OK, "done").into_response(),
        n => found(&format!("/redirect/{}", n - 1)),
    }
}

async fn redirect_absolute(Path(n): Path<u32>, headers: HeaderMap) -> Response {
    let host = headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost")
        .to_string();
    match n {
        0 => (StatusCode::OK, "done").into_response(),
        n => found(&format!("http://{host}/redirect-absolute/{}", n - 1)),
    }
}

async fn see_other() -> Response {
    (StatusCode::SEE_OTHER, [(LOCATION, "/echo")]).into_response()
}

async fn redirect_loop() -> Response {
    found("/loop")
}

async fn no_location() -> StatusCode {
    StatusCode::FOUND
}

async fn cookies(headers: HeaderMap) -> Json<BTreeMap<String, String>> {
    let jar = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Json(jar)
}

async fn set_cookies(Query(pairs): Query<BTreeMap<String, String>>) -> Response {
    let mut headers = HeaderMap::new();
    for (name, value) in &pairs {
        if let Ok(v) = format!("{name}={value}; Path=/").parse() {
            headers.append(SET_COOKIE, v);
        }
    }
    (StatusCode::OK, headers, "cookies set").into_response()
}

async fn status(Path(code): Path<u16>) -> Response {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    (status, [(SET_COOKIE, format!("status={code}; Path=/"))], status.to_string()).into_response()
}

async fn basic_auth(Path((user, password)): Path<(String, String)>, headers: HeaderMap) -> Response {
    let expected = format!("Basic {}", STANDARD.encode(format!("{user}:{password}")));
    let given = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    if given == Some(expected.as_str()) {
        Json(AuthOutcome {
            authenticated: true,
            user,
        })
        .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            [(WWW_AUTHENTICATE, "Basic realm=\"mock\"")],
        )
            .into_response()
    }
}

async fn bytes(Path(n): Path<usize>) -> Vec<u8> {
    (0..n).map(|i| (i % 256) as u8).collect()
}
