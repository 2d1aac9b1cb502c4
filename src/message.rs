//! Captured HTTP messages and the interactions that group them
//!
//! Values in this module are plain data. They are built from live hyper
//! messages at capture time and can be turned back into a live response for
//! replay.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use hyper::ext::ReasonPhrase;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST, TRANSFER_ENCODING};
use hyper::{HeaderMap, StatusCode, Version};

use crate::{RecorderError, Result};

/// A single header line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Header name as captured
    pub name: String,
    /// Header value
    pub value: String,
}

/// Ordered header multimap with case-insensitive names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<Header>);

impl Headers {
    /// Create an empty header list
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a value, keeping existing values for the same name
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push(Header {
            name: name.into(),
            value: value.into(),
        });
    }

    /// First value for `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// All values for `name` in insertion order
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Whether any value exists for `name`
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replace every value of `name` in place, keeping positions
    pub fn replace_values(&mut self, name: &str, value: &str) {
        for header in self.0.iter_mut().filter(|h| h.name.eq_ignore_ascii_case(name)) {
            header.value = value.to_string();
        }
    }

    /// Iterate over all header lines
    pub fn iter(&self) -> std::slice::Iter<'_, Header> {
        self.0.iter()
    }

    /// Number of header lines
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no header lines
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn capture(map: &HeaderMap) -> Self {
        map.iter()
            .map(|(name, value)| Header {
                name: name.as_str().to_string(),
                value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
            })
            .collect()
    }
}

impl FromIterator<Header> for Headers {
    fn from_iter<I: IntoIterator<Item = Header>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Fully materialized message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    /// Raw bytes
    pub content: Bytes,
    /// Declared content type, including parameters
    pub content_type: Option<String>,
}

impl Body {
    /// Create a body from raw bytes and a declared content type
    pub fn new(content: impl Into<Bytes>, content_type: Option<String>) -> Self {
        Self {
            content: content.into(),
            content_type,
        }
    }

    /// Declared charset, from the `charset` content-type parameter
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.content_type.as_deref()?.split(';').skip(1).find_map(|param| {
            let (key, value) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim().trim_matches('"'))
        })
    }

    /// Media type without parameters, lowercased
    #[must_use]
    pub fn mime_type(&self) -> Option<String> {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(|mime| mime.trim().to_ascii_lowercase())
    }

    /// Whether the content type declares JSON
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.mime_type()
            .is_some_and(|mime| mime == "application/json" || mime.ends_with("+json"))
    }

    /// Whether the content type declares an urlencoded form
    #[must_use]
    pub fn is_form(&self) -> bool {
        self.mime_type()
            .is_some_and(|mime| mime == "application/x-www-form-urlencoded")
    }

    fn capture(headers: &HeaderMap, content: &Bytes) -> Option<Self> {
        let content_type = headers
            .get(CONTENT_TYPE)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());

        if content.is_empty() && content_type.is_none() {
            return None;
        }

        Some(Self {
            content: content.clone(),
            content_type,
        })
    }
}

/// Captured outgoing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP method
    pub method: String,
    /// Absolute URL
    pub url: String,
    /// Request headers
    pub headers: Headers,
    /// Request body
    pub body: Option<Body>,
}

impl Request {
    /// Capture a live request
    ///
    /// Relative URIs are made absolute from the `Host` header.
    #[must_use]
    pub fn capture(request: &hyper::Request<Bytes>) -> Self {
        let uri = request.uri();
        let url = if uri.authority().is_some() {
            uri.to_string()
        } else {
            let host = request
                .headers()
                .get(HOST)
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .unwrap_or_default();
            let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
            format!("http://{host}{path}")
        };

        Self {
            method: request.method().as_str().to_string(),
            url,
            headers: Headers::capture(request.headers()),
            body: Body::capture(request.headers(), request.body()),
        }
    }

    /// Path component of the URL
    #[must_use]
    pub fn path(&self) -> &str {
        let rest = self
            .url
            .split_once("://")
            .map_or(self.url.as_str(), |(_, rest)| rest);
        let rest = rest.split(['?', '#']).next().unwrap_or_default();
        rest.find('/').map_or("/", |idx| &rest[idx..])
    }

    /// Raw query string, without the leading `?`
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        let (_, query) = self.url.split_once('?')?;
        Some(query.split('#').next().unwrap_or_default())
    }

    /// Decoded query parameters in URL order
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.query().map(parse_query).unwrap_or_default()
    }
}

/// Captured response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Protocol version, e.g. `HTTP/1.1`
    pub http_version: String,
    /// Numeric status code
    pub status: u16,
    /// Status text
    pub status_text: String,
    /// Response headers
    pub headers: Headers,
    /// Response body
    pub body: Option<Body>,
}

impl Response {
    /// Capture a live response
    #[must_use]
    pub fn capture(response: &hyper::Response<Bytes>) -> Self {
        let status = response.status();
        let status_text = response.extensions().get::<ReasonPhrase>().map_or_else(
            || status.canonical_reason().unwrap_or_default().to_string(),
            |reason| String::from_utf8_lossy(reason.as_bytes()).into_owned(),
        );

        Self {
            http_version: format!("{:?}", response.version()),
            status: status.as_u16(),
            status_text,
            headers: Headers::capture(response.headers()),
            body: Body::capture(response.headers(), response.body()),
        }
    }

    /// `Location` header, if any
    #[must_use]
    pub fn redirect_url(&self) -> Option<&str> {
        self.headers.get("location")
    }

    /// Rebuild a live response indistinguishable from the captured one
    ///
    /// The stored `Content-Length` is ignored and recomputed from the body.
    /// `Transfer-Encoding` is dropped since the body is already complete.
    ///
    /// # Errors
    ///
    /// Returns error if the stored status or headers are not valid HTTP
    pub fn to_http(&self) -> Result<hyper::Response<Bytes>> {
        let status = StatusCode::from_u16(self.status).map_err(|e| {
            RecorderError::Transport(format!("Invalid stored status {}: {e}", self.status))
        })?;

        let mut builder = hyper::Response::builder()
            .status(status)
            .version(parse_version(&self.http_version));

        for header in self
            .headers
            .iter()
            .filter(|h| !is_framing_header(&h.name))
        {
            builder = builder.header(header.name.as_str(), header.value.as_str());
        }

        let content = self
            .body
            .as_ref()
            .map(|body| body.content.clone())
            .unwrap_or_default();
        if self.body.is_some() {
            builder = builder.header(CONTENT_LENGTH, content.len());
        }

        if status.canonical_reason() != Some(self.status_text.as_str())
            && !self.status_text.is_empty()
        {
            if let Ok(reason) = ReasonPhrase::try_from(self.status_text.clone().into_bytes()) {
                builder = builder.extension(reason);
            }
        }

        builder
            .body(content)
            .map_err(|e| RecorderError::Transport(format!("Failed to rebuild response: {e}")))
    }
}

/// One recorded request/response exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionMessage {
    /// Captured request
    pub request: Request,
    /// Captured response
    pub response: Response,
    /// When the exchange was captured
    pub recorded_at: DateTime<Utc>,
}

impl InteractionMessage {
    /// Pair a request with its response, stamped now
    #[must_use]
    pub fn new(request: Request, response: Response) -> Self {
        Self {
            request,
            response,
            recorded_at: Utc::now(),
        }
    }
}

/// Named, append-only sequence of exchanges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    name: String,
    messages: Vec<InteractionMessage>,
}

impl Interaction {
    /// Create an empty interaction
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            messages: Vec::new(),
        }
    }

    /// Create an interaction from already ordered messages
    pub fn with_messages(name: impl Into<String>, messages: Vec<InteractionMessage>) -> Self {
        Self {
            name: name.into(),
            messages,
        }
    }

    /// Cassette name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Messages in recording order
    #[must_use]
    pub fn messages(&self) -> &[InteractionMessage] {
        &self.messages
    }

    /// Append a message at the end
    pub fn push(&mut self, message: InteractionMessage) {
        self.messages.push(message);
    }

    /// Number of recorded messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether nothing has been recorded yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Split a raw query string into decoded pairs
#[must_use]
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

/// Decode one `application/x-www-form-urlencoded` component
#[must_use]
pub fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced).map_or(spaced.clone(), std::borrow::Cow::into_owned)
}

/// Headers describing the original wire framing of a body
fn is_framing_header(name: &str) -> bool {
    name.eq_ignore_ascii_case(CONTENT_LENGTH.as_str())
        || name.eq_ignore_ascii_case(TRANSFER_ENCODING.as_str())
}

fn parse_version(version: &str) -> Version {
    match version {
        "HTTP/0.9" => Version::HTTP_09,
        "HTTP/1.0" => Version::HTTP_10,
        "HTTP/2.0" | "HTTP/2" => Version::HTTP_2,
        "HTTP/3.0" | "HTTP/3" => Version::HTTP_3,
        _ => Version::HTTP_11,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_response() -> hyper::Response<Bytes> {
        hyper::Response::builder()
            .status(201)
            .header("Content-Type", "application/json; charset=utf-8")
            .header("Content-Length", "999")
            .header("X-Trace", "a")
            .header("X-Trace", "b")
            .body(Bytes::from_static(b"{\"ok\":true}"))
            .unwrap()
    }

    #[test]
    fn test_capture_request() {
        let live = hyper::Request::builder()
            .method("POST")
            .uri("http://example.com/api/items?b=2&a=1")
            .header("Content-Type", "text/plain; charset=windows-1253")
            .body(Bytes::from_static(b"payload"))
            .unwrap();

        let request = Request::capture(&live);
        assert_eq!(request.method, "POST");
        assert_eq!(request.url, "http://example.com/api/items?b=2&a=1");
        assert_eq!(request.path(), "/api/items");
        assert_eq!(request.query(), Some("b=2&a=1"));

        let body = request.body.unwrap();
        assert_eq!(body.content.as_ref(), b"payload");
        assert_eq!(body.charset(), Some("windows-1253"));
        assert_eq!(body.mime_type().as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_capture_relative_uri_uses_host() {
        let live = hyper::Request::builder()
            .uri("/json?name=x")
            .header("Host", "localhost:8080")
            .body(Bytes::new())
            .unwrap();

        let request = Request::capture(&live);
        assert_eq!(request.url, "http://localhost:8080/json?name=x");
        assert!(request.body.is_none());
    }

    #[test]
    fn test_headers_are_case_insensitive_and_ordered() {
        let response = Response::capture(&live_response());
        let traces: Vec<_> = response.headers.get_all("x-trace").collect();
        assert_eq!(traces, vec!["a", "b"]);
        assert_eq!(
            response.headers.get("CONTENT-TYPE"),
            Some("application/json; charset=utf-8")
        );
    }

    #[test]
    fn test_reconstruct_recomputes_content_length() {
        let response = Response::capture(&live_response());
        assert_eq!(response.status_text, "Created");

        let rebuilt = response.to_http().unwrap();
        assert_eq!(rebuilt.status(), StatusCode::CREATED);
        assert_eq!(rebuilt.headers().get(CONTENT_LENGTH).unwrap(), "11");
        assert_eq!(rebuilt.headers().get_all("x-trace").iter().count(), 2);
        assert_eq!(rebuilt.body().as_ref(), b"{\"ok\":true}");
        assert!(rebuilt.extensions().get::<ReasonPhrase>().is_none());
    }

    #[test]
    fn test_reconstruct_drops_chunked_framing() {
        let chunked = hyper::Response::builder()
            .header("Transfer-Encoding", "chunked")
            .header("Content-Type", "text/plain")
            .body(Bytes::from_static(b"hello"))
            .unwrap();
        let response = Response::capture(&chunked);
        assert_eq!(response.headers.get("transfer-encoding"), Some("chunked"));

        let rebuilt = response.to_http().unwrap();
        assert!(rebuilt.headers().get(TRANSFER_ENCODING).is_none());
        assert_eq!(rebuilt.headers().get(CONTENT_LENGTH).unwrap(), "5");
        assert_eq!(rebuilt.headers().get(CONTENT_TYPE).unwrap(), "text/plain");
    }

    #[test]
    fn test_header_lookup_outlives_name() {
        let response = Response::capture(&live_response());
        let value = {
            let name = String::from("x-trace");
            response.headers.get(&name)
        };
        assert_eq!(value, Some("a"));
        assert!(response.headers.contains("X-TRACE"));
        assert!(!response.headers.contains("x-missing"));
    }

    #[test]
    fn test_reconstruct_keeps_custom_reason() {
        let mut response = Response::capture(&live_response());
        response.status_text = "Made It".to_string();

        let rebuilt = response.to_http().unwrap();
        let reason = rebuilt.extensions().get::<ReasonPhrase>().unwrap();
        assert_eq!(reason.as_bytes(), b"Made It");
    }

    #[test]
    fn test_parse_query_decodes() {
        let pairs = parse_query("name=Foo+Bar&key=a%26b&flag");
        assert_eq!(
            pairs,
            vec![
                ("name".to_string(), "Foo Bar".to_string()),
                ("key".to_string(), "a&b".to_string()),
                ("flag".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_interaction_append_only() {
        let mut interaction = Interaction::new("cassette");
        assert!(interaction.is_empty());

        let request = Request {
            method: "GET".to_string(),
            url: "http://example.com/".to_string(),
            headers: Headers::new(),
            body: None,
        };
        let response = Response::capture(&live_response());
        interaction.push(InteractionMessage::new(request, response));

        assert_eq!(interaction.len(), 1);
        assert_eq!(interaction.name(), "cassette");
    }
}
