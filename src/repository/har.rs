//! HTTP Archive (HAR 1.2) cassette format
//!
//! Cassettes are plain HAR logs so they can be opened by browser devtools and
//! other HAR tooling. Bodies that are not valid UTF-8 are stored base64
//! encoded; response content uses the standard `encoding` field and request
//! post data uses the `_encoding` extension field.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{Body, Header, Headers, Interaction, InteractionMessage, Request, Response};
use crate::{RecorderError, Result};

/// HAR format version written to every cassette
pub const HAR_VERSION: &str = "1.2";

const BASE64: &str = "base64";
const REQUEST_HTTP_VERSION: &str = "HTTP/1.1";

/// Top-level HAR document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarDocument {
    /// The log
    pub log: HarLog,
}

/// HAR log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarLog {
    /// Format version
    pub version: String,
    /// Producing application
    pub creator: HarCreator,
    /// Exchanges in recording order
    #[serde(default)]
    pub entries: Vec<HarEntry>,
}

/// Producing application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarCreator {
    /// Application name
    pub name: String,
    /// Application version
    pub version: String,
}

/// One exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarEntry {
    /// Capture time
    pub started_date_time: DateTime<Utc>,
    /// Total elapsed milliseconds
    #[serde(default)]
    pub time: f64,
    /// Request
    pub request: HarRequest,
    /// Response
    pub response: HarResponse,
    /// Cache info, always empty
    #[serde(default)]
    pub cache: serde_json::Map<String, serde_json::Value>,
    /// Phase timings
    #[serde(default)]
    pub timings: HarTimings,
}

/// Request part of an entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarRequest {
    /// Method
    pub method: String,
    /// Absolute URL
    pub url: String,
    /// Protocol version
    pub http_version: String,
    /// Cookies, not captured separately
    #[serde(default)]
    pub cookies: Vec<serde_json::Value>,
    /// Headers in captured order
    #[serde(default)]
    pub headers: Vec<HarNameValue>,
    /// Decoded query parameters, informational
    #[serde(default)]
    pub query_string: Vec<HarNameValue>,
    /// Request body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_data: Option<HarPostData>,
    /// Unknown header size
    #[serde(default = "unknown_size")]
    pub headers_size: i64,
    /// Body size in bytes
    #[serde(default = "unknown_size")]
    pub body_size: i64,
}

/// Response part of an entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarResponse {
    /// Status code
    pub status: u16,
    /// Status text
    #[serde(default)]
    pub status_text: String,
    /// Protocol version
    pub http_version: String,
    /// Cookies, not captured separately
    #[serde(default)]
    pub cookies: Vec<serde_json::Value>,
    /// Headers in captured order
    #[serde(default)]
    pub headers: Vec<HarNameValue>,
    /// Response body
    pub content: HarContent,
    /// Target of the `Location` header
    #[serde(rename = "redirectURL", default)]
    pub redirect_url: String,
    /// Unknown header size
    #[serde(default = "unknown_size")]
    pub headers_size: i64,
    /// Body size in bytes
    #[serde(default = "unknown_size")]
    pub body_size: i64,
}

/// Name/value pair used for headers and query parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarNameValue {
    /// Name
    pub name: String,
    /// Value
    pub value: String,
}

/// Request body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarPostData {
    /// Declared content type
    #[serde(default)]
    pub mime_type: String,
    /// Body text, base64 when `encoding` says so
    #[serde(default)]
    pub text: String,
    /// Body encoding extension
    #[serde(rename = "_encoding", default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

/// Response body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarContent {
    /// Body size in bytes
    pub size: i64,
    /// Declared content type
    #[serde(default)]
    pub mime_type: String,
    /// Body text, absent when the response had no body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// `base64` for binary bodies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

/// Phase timings, not measured
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarTimings {
    /// Send time
    pub send: f64,
    /// Wait time
    pub wait: f64,
    /// Receive time
    pub receive: f64,
}

fn unknown_size() -> i64 {
    -1
}

/// Encode an interaction as HAR JSON
///
/// # Errors
///
/// Returns error if serialization fails
pub fn render(interaction: &Interaction) -> Result<Vec<u8>> {
    let document = HarDocument::from(interaction);
    let mut bytes = serde_json::to_vec_pretty(&document).map_err(std::io::Error::from)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decode HAR JSON into the interaction named `name`
///
/// # Errors
///
/// Returns [`RecorderError::StorageCorrupt`] if the data is not a valid cassette
pub fn parse(name: &str, data: &[u8]) -> Result<Interaction> {
    let corrupt = |reason: String| RecorderError::StorageCorrupt {
        name: name.to_string(),
        reason,
    };

    let document: HarDocument =
        serde_json::from_slice(data).map_err(|e| corrupt(e.to_string()))?;

    let messages = document
        .log
        .entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            entry
                .into_message()
                .map_err(|reason| corrupt(format!("entry {index}: {reason}")))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Interaction::with_messages(name, messages))
}

impl From<&Interaction> for HarDocument {
    fn from(interaction: &Interaction) -> Self {
        Self {
            log: HarLog {
                version: HAR_VERSION.to_string(),
                creator: HarCreator {
                    name: env!("CARGO_PKG_NAME").to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
                entries: interaction.messages().iter().map(HarEntry::from).collect(),
            },
        }
    }
}

impl From<&InteractionMessage> for HarEntry {
    fn from(message: &InteractionMessage) -> Self {
        Self {
            started_date_time: message.recorded_at,
            time: 0.0,
            request: HarRequest::from(&message.request),
            response: HarResponse::from(&message.response),
            cache: serde_json::Map::new(),
            timings: HarTimings::default(),
        }
    }
}

impl HarEntry {
    fn into_message(self) -> std::result::Result<InteractionMessage, String> {
        Ok(InteractionMessage {
            request: self.request.into_request()?,
            response: self.response.into_response()?,
            recorded_at: self.started_date_time,
        })
    }
}

impl From<&Request> for HarRequest {
    fn from(request: &Request) -> Self {
        let post_data = request.body.as_ref().map(|body| {
            let (text, encoding) = encode_text(&body.content);
            HarPostData {
                mime_type: body.content_type.clone().unwrap_or_default(),
                text,
                encoding,
            }
        });

        Self {
            method: request.method.clone(),
            url: request.url.clone(),
            http_version: REQUEST_HTTP_VERSION.to_string(),
            cookies: Vec::new(),
            headers: name_values(&request.headers),
            query_string: request
                .query_pairs()
                .into_iter()
                .map(|(name, value)| HarNameValue { name, value })
                .collect(),
            post_data,
            headers_size: unknown_size(),
            body_size: request
                .body
                .as_ref()
                .map_or(0, |body| body.content.len() as i64),
        }
    }
}

impl HarRequest {
    fn into_request(self) -> std::result::Result<Request, String> {
        let body = self
            .post_data
            .map(|data| {
                decode_text(&data.text, data.encoding.as_deref())
                    .map(|content| Body::new(content, non_empty(data.mime_type)))
            })
            .transpose()?;

        Ok(Request {
            method: self.method,
            url: self.url,
            headers: headers_from(self.headers),
            body,
        })
    }
}

impl From<&Response> for HarResponse {
    fn from(response: &Response) -> Self {
        let content = match &response.body {
            Some(body) => {
                let (text, encoding) = encode_text(&body.content);
                HarContent {
                    size: body.content.len() as i64,
                    mime_type: body.content_type.clone().unwrap_or_default(),
                    text: Some(text),
                    encoding,
                }
            }
            None => HarContent {
                size: 0,
                mime_type: String::new(),
                text: None,
                encoding: None,
            },
        };

        Self {
            status: response.status,
            status_text: response.status_text.clone(),
            http_version: response.http_version.clone(),
            cookies: Vec::new(),
            headers: name_values(&response.headers),
            body_size: content.size,
            content,
            redirect_url: response.redirect_url().unwrap_or_default().to_string(),
            headers_size: unknown_size(),
        }
    }
}

impl HarResponse {
    fn into_response(self) -> std::result::Result<Response, String> {
        let content = self.content;
        let body = content
            .text
            .map(|text| {
                decode_text(&text, content.encoding.as_deref())
                    .map(|bytes| Body::new(bytes, non_empty(content.mime_type)))
            })
            .transpose()?;

        Ok(Response {
            http_version: self.http_version,
            status: self.status,
            status_text: self.status_text,
            headers: headers_from(self.headers),
            body,
        })
    }
}

fn name_values(headers: &Headers) -> Vec<HarNameValue> {
    headers
        .iter()
        .map(|h| HarNameValue {
            name: h.name.clone(),
            value: h.value.clone(),
        })
        .collect()
}

fn headers_from(pairs: Vec<HarNameValue>) -> Headers {
    pairs
        .into_iter()
        .map(|pair| Header {
            name: pair.name,
            value: pair.value,
        })
        .collect()
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn encode_text(content: &[u8]) -> (String, Option<String>) {
    match std::str::from_utf8(content) {
        Ok(text) => (text.to_string(), None),
        Err(_) => (STANDARD.encode(content), Some(BASE64.to_string())),
    }
}

fn decode_text(text: &str, encoding: Option<&str>) -> std::result::Result<Vec<u8>, String> {
    match encoding {
        None => Ok(text.as_bytes().to_vec()),
        Some(enc) if enc.eq_ignore_ascii_case(BASE64) => STANDARD
            .decode(text)
            .map_err(|e| format!("invalid base64 body: {e}")),
        Some(other) => Err(format!("unsupported body encoding '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Interaction {
        let mut request_headers = Headers::new();
        request_headers.append("Accept", "application/json");
        request_headers.append("X-Multi", "1");
        request_headers.append("X-Multi", "2");

        let mut response_headers = Headers::new();
        response_headers.append("Content-Type", "application/octet-stream");
        response_headers.append("Location", "http://example.com/next");

        let mut interaction = Interaction::new("sample");
        interaction.push(InteractionMessage::new(
            Request {
                method: "POST".to_string(),
                url: "http://example.com/upload?name=a%20b".to_string(),
                headers: request_headers,
                body: Some(Body::new(
                    &b"name=Foo"[..],
                    Some("application/x-www-form-urlencoded".to_string()),
                )),
            },
            Response {
                http_version: "HTTP/1.1".to_string(),
                status: 302,
                status_text: "Found".to_string(),
                headers: response_headers,
                body: Some(Body::new(
                    vec![0xff, 0x00, 0xfe, 0x10],
                    Some("application/octet-stream".to_string()),
                )),
            },
        ));
        interaction
    }

    #[test]
    fn test_render_follows_har_schema() {
        let bytes = render(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        let entry = &value["log"]["entries"][0];
        assert_eq!(value["log"]["version"], HAR_VERSION);
        assert_eq!(entry["request"]["method"], "POST");
        assert_eq!(entry["request"]["queryString"][0]["value"], "a b");
        assert_eq!(entry["request"]["postData"]["text"], "name=Foo");
        assert_eq!(entry["response"]["status"], 302);
        assert_eq!(entry["response"]["statusText"], "Found");
        assert_eq!(entry["response"]["redirectURL"], "http://example.com/next");
        assert_eq!(entry["response"]["content"]["encoding"], "base64");
        assert_eq!(entry["response"]["headers"][1]["name"], "Location");
    }

    #[test]
    fn test_round_trip() {
        let interaction = sample();
        let parsed = parse("sample", &render(&interaction).unwrap()).unwrap();
        assert_eq!(parsed, interaction);
    }

    #[test]
    fn test_empty_interaction_round_trip() {
        let interaction = Interaction::new("empty");
        let parsed = parse("empty", &render(&interaction).unwrap()).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_parse_garbage_is_corrupt() {
        let err = parse("broken", b"\x7fELF not json").unwrap_err();
        assert!(matches!(err, RecorderError::StorageCorrupt { ref name, .. } if name == "broken"));
    }

    #[test]
    fn test_parse_bad_base64_is_corrupt() {
        let mut bytes: serde_json::Value =
            serde_json::from_slice(&render(&sample()).unwrap()).unwrap();
        bytes["log"]["entries"][0]["response"]["content"]["text"] = "!!!".into();
        let err = parse("sample", &serde_json::to_vec(&bytes).unwrap()).unwrap_err();
        assert!(matches!(err, RecorderError::StorageCorrupt { .. }));
    }
}
