//! Query parameters and their URL encoding.
//!
//! Parameters keep insertion order; setting a name that already exists
//! replaces its values in place, so the name keeps its original position.
//! Encoding never sorts.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Everything outside the RFC 3986 unreserved set is escaped, so a space
/// becomes `%20` rather than `+`.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Insertion-ordered mapping of parameter name to one or more values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    entries: Vec<(String, Vec<String>)>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a single value for `name`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.set_many(name, [value.into()]);
    }

    /// Set an ordered list of values for `name`; the key is repeated once
    /// per value when encoded.
    pub fn set_many<I, V>(&mut self, name: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let name = name.into();
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = values,
            None => self.entries.push((name, values)),
        }
    }

    /// Copy every entry of `other` into `self` with `set_many` semantics.
    pub fn extend_from(&mut self, other: &Parameters) {
        for (name, values) in &other.entries {
            self.set_many(name.clone(), values.iter().cloned());
        }
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        let idx = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(idx).1)
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    /// One `(name, value)` pair per value, in encoding order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(n, vs)| vs.iter().map(move |v| (n.as_str(), v.as_str())))
    }
}

impl<K, V> FromIterator<(K, V)> for Parameters
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = Parameters::new();
        for (k, v) in iter {
            params.set(k, v);
        }
        params
    }
}

/// Percent-encode a single key or value (UTF-8).
pub fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, QUERY_COMPONENT).to_string()
}

/// Append `pairs` to `base` as a query string: `?` before the first pair
/// (or `&` when `base` already carries a query) and `&` between pairs.
pub fn encode_query<'a, I>(base: &str, pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = String::from(base);
    let mut sep = if base.contains('?') { '&' } else { '?' };
    for (key, value) in pairs {
        out.push(sep);
        out.push_str(&encode_component(key));
        out.push('=');
        out.push_str(&encode_component(value));
        sep = '&';
    }
    out
}

/// Split a query string (without the leading `?`) into decoded pairs.
/// Accepts `+` as an encoded space.
pub fn decode_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(s: &str) -> String {
    let spaced = s.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_values_repeat_the_key_in_order() {
        let mut params = Parameters::new();
        params.set("q", "a b");
        params.set_many("tag", ["x", "y"]);
        let url = encode_query("http://example.test/search", params.pairs());
        assert_eq!(url, "http://example.test/search?q=a%20b&tag=x&tag=y");
    }

    #[test]
    fn replacing_a_name_keeps_its_position() {
        let mut params = Parameters::new();
        params.set("a", "1");
        params.set("b", "2");
        params.set("a", "3");
        let names: Vec<&str> = params.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(params.get("a"), Some(&["3".to_string()][..]));
    }

    #[test]
    fn pair_count_matches_total_values() {
        let mut params = Parameters::new();
        params.set_many("a", ["1", "2", "3"]);
        params.set("b", "x");
        params.set_many("c", Vec::<String>::new());
        let url = encode_query("http://h/", params.pairs());
        let query = url.split_once('?').unwrap().1;
        assert_eq!(query.split('&').count(), 4);
    }

    #[test]
    fn no_pairs_leaves_base_untouched() {
        assert_eq!(encode_query("http://h/x", std::iter::empty()), "http://h/x");
    }

    #[test]
    fn existing_query_continues_with_ampersand() {
        let url = encode_query("http://h/x?v=1", [("w", "2")]);
        assert_eq!(url, "http://h/x?v=1&w=2");
    }

    #[test]
    fn reserved_and_unicode_characters_are_escaped() {
        assert_eq!(encode_component("a&b=c/d"), "a%26b%3Dc%2Fd");
        assert_eq!(encode_component("é"), "%C3%A9");
        assert_eq!(encode_component("keep-._~"), "keep-._~");
    }

    #[test]
    fn decoding_reconstructs_the_mapping() {
        let mut params = Parameters::new();
        params.set("name", "Jane Doe & co");
        params.set_many("k", ["ü", "=", ""]);
        let url = encode_query("http://h/p", params.pairs());
        let decoded = decode_query(url.split_once('?').unwrap().1);
        let expected: Vec<(String, String)> = params
            .pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn decode_accepts_plus_as_space() {
        assert_eq!(
            decode_query("q=a+b&r"),
            vec![("q".to_string(), "a b".to_string()), ("r".to_string(), String::new())]
        );
    }
}
