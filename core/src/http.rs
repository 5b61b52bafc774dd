//! Request and response types exchanged with a `Connection`.
//!
//! # Design
//! `RequestDescriptor` is filled in by the client and handed to the
//! connection by value. Query parameters and body are optional, and each is
//! written only through its setter: a field that is still `None` when the
//! connection sees the descriptor was never set, which is how the client's
//! "empty options set nothing" rule stays observable.
//!
//! Header names are case-insensitive on the wire, so the descriptor stores
//! them lower-cased and merges by that key.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

/// Loosely-structured request options: a JSON object.
pub type Options = serde_json::Map<String, Value>;

/// Header mapping, name to value.
pub type Headers = BTreeMap<String, String>;

/// HTTP verb supported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Delete,
    Head,
    Put,
    Post,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Delete => "DELETE",
            Verb::Head => "HEAD",
            Verb::Put => "PUT",
            Verb::Post => "POST",
        }
    }

    /// Write-style verbs put their options in the body; the others put them
    /// in the query string.
    pub fn carries_body(&self) -> bool {
        matches!(self, Verb::Put | Verb::Post)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An in-flight request, built per call and consumed by the connection.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    verb: Verb,
    path: String,
    headers: Headers,
    params: Option<Options>,
    body: Option<Value>,
}

impl RequestDescriptor {
    pub fn new(verb: Verb) -> Self {
        Self {
            verb,
            path: String::new(),
            headers: Headers::new(),
            params: None,
            body: None,
        }
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn params(&self) -> Option<&Options> {
        self.params.as_ref()
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    /// Merge `headers` into the current set; incoming values win.
    pub fn merge_headers(&mut self, headers: Headers) {
        for (name, value) in headers {
            self.headers.insert(name.to_ascii_lowercase(), value);
        }
    }

    pub fn set_params(&mut self, params: Options) {
        self.params = Some(params);
    }

    pub fn set_body(&mut self, body: Value) {
        self.body = Some(body);
    }

    /// Query parameters flattened to string pairs: strings verbatim, `null`
    /// as an empty value, arrays as one pair per element, anything else as
    /// its JSON text.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let Some(params) = &self.params else {
            return Vec::new();
        };
        let mut pairs = Vec::with_capacity(params.len());
        for (name, value) in params {
            match value {
                Value::Array(items) => {
                    pairs.extend(items.iter().map(|item| (name.clone(), query_value(item))))
                }
                other => pairs.push((name.clone(), query_value(other))),
            }
        }
        pairs
    }

    /// The body as JSON bytes, if one was set.
    pub fn encoded_body(&self) -> Result<Option<Vec<u8>>, serde_json::Error> {
        self.body.as_ref().map(serde_json::to_vec).transpose()
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// A response returned by a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Response {
    /// A bare 200 response carrying `body`.
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fresh_descriptor_has_nothing_set() {
        let req = RequestDescriptor::new(Verb::Get);
        assert_eq!(req.path(), "");
        assert!(req.headers().is_empty());
        assert!(req.params().is_none());
        assert!(req.body().is_none());
        assert!(req.query_pairs().is_empty());
        assert!(req.encoded_body().unwrap().is_none());
    }

    #[test]
    fn merge_headers_lowercases_and_overrides() {
        let mut req = RequestDescriptor::new(Verb::Post);
        req.merge_headers(Headers::from([
            ("User-Agent".to_string(), "default".to_string()),
            ("Accept".to_string(), "application/json".to_string()),
        ]));
        req.merge_headers(Headers::from([("user-agent".to_string(), "custom".to_string())]));

        assert_eq!(req.header("USER-AGENT"), Some("custom"));
        assert_eq!(req.header("accept"), Some("application/json"));
        assert_eq!(req.headers().len(), 2);
    }

    #[test]
    fn set_params_with_empty_map_is_still_set() {
        let mut req = RequestDescriptor::new(Verb::Get);
        req.set_params(Options::new());
        assert_eq!(req.params(), Some(&Options::new()));
    }

    #[test]
    fn query_pairs_flatten_values() {
        let mut req = RequestDescriptor::new(Verb::Get);
        let params = json!({
            "unitName": "web.service",
            "limit": 10,
            "tag": ["a", "b"],
            "empty": null,
        });
        req.set_params(params.as_object().unwrap().clone());

        let pairs = req.query_pairs();
        assert!(pairs.contains(&("unitName".to_string(), "web.service".to_string())));
        assert!(pairs.contains(&("limit".to_string(), "10".to_string())));
        assert!(pairs.contains(&("tag".to_string(), "a".to_string())));
        assert!(pairs.contains(&("tag".to_string(), "b".to_string())));
        assert!(pairs.contains(&("empty".to_string(), String::new())));
        assert_eq!(pairs.len(), 5);
    }

    #[test]
    fn encoded_body_is_json() {
        let mut req = RequestDescriptor::new(Verb::Put);
        req.set_body(json!({ "desiredState": "launched" }));
        let bytes = req.encoded_body().unwrap().unwrap();
        let decoded: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, json!({ "desiredState": "launched" }));
    }

    #[test]
    fn only_put_and_post_carry_a_body() {
        assert!(Verb::Put.carries_body());
        assert!(Verb::Post.carries_body());
        assert!(!Verb::Get.carries_body());
        assert!(!Verb::Delete.carries_body());
        assert!(!Verb::Head.carries_body());
    }

    #[test]
    fn response_success_range() {
        assert!(Response::ok("").is_success());
        let not_found = Response {
            status: 404,
            headers: Vec::new(),
            body: String::new(),
        };
        assert!(!not_found.is_success());
    }
}
