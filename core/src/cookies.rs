//! Cookie extraction from `Set-Cookie` headers and `Cookie` header rendering.
//!
//! Only `name=value` is kept from each `Set-Cookie` value; attributes after
//! the first `;` (Path, Expires, ...) are discarded. Values without `=` are
//! dropped.

use std::collections::BTreeMap;

use http::header::SET_COOKIE;
use http::HeaderMap;
use tracing::warn;

/// Cookie name to value.
pub type Cookies = BTreeMap<String, String>;

/// Parse one `Set-Cookie` value into its name and value.
pub fn parse_set_cookie(raw: &str) -> Option<(String, String)> {
    let pair = raw.split(';').next().unwrap_or("");
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// Collect every cookie set by a response. Header lookup is
/// case-insensitive; a later cookie with the same name wins.
pub fn from_headers(headers: &HeaderMap) -> Cookies {
    let mut cookies = Cookies::new();
    for value in headers.get_all(SET_COOKIE) {
        let Ok(raw) = value.to_str() else {
            warn!("dropping Set-Cookie header that is not visible ASCII");
            continue;
        };
        match parse_set_cookie(raw) {
            Some((name, value)) => {
                cookies.insert(name, value);
            }
            None => warn!(header = raw, "dropping malformed Set-Cookie header"),
        }
    }
    cookies
}

/// Render cookies as a single `Cookie` request header value.
pub fn cookie_header<'a, I>(cookies: I) -> Option<String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let rendered: Vec<String> = cookies
        .into_iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    if rendered.is_empty() {
        None
    } else {
        Some(rendered.join("; "))
    }
}
