//! Redaction applied to exchanges before they are persisted

use std::fmt;

use bytes::Bytes;
use serde_json::Value;

use crate::message::{decode_component, Body, Headers, InteractionMessage, Request, Response};

/// Replacement used when a rule does not name one
pub const DEFAULT_REPLACEMENT: &str = "******";

/// Transforms an exchange into the copy that gets persisted
pub trait InteractionAnonymizer: Send + Sync + fmt::Debug {
    /// Return the redacted copy of `message`
    fn anonymize(&self, message: InteractionMessage) -> InteractionMessage;

    /// Apply the request-side redaction to a live request, so it compares
    /// equal to the persisted copy of the same request
    fn anonymize_request(&self, request: Request) -> Request {
        request
    }
}

/// What a rule redacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Query string parameter of the request URL
    RequestQueryParam(String),
    /// Request header value
    RequestHeader(String),
    /// Response header value
    ResponseHeader(String),
    /// Field of a JSON or urlencoded request body
    RequestBodyField(String),
    /// Field of a JSON or urlencoded response body
    ResponseBodyField(String),
}

/// Ordered list of (selector, replacement) rules
#[derive(Debug, Clone, Default)]
pub struct RulesAnonymizer {
    rules: Vec<(Selector, String)>,
}

impl RulesAnonymizer {
    /// Anonymizer with no rules
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule with an explicit replacement
    #[must_use]
    pub fn rule(mut self, selector: Selector, replacement: impl Into<String>) -> Self {
        self.rules.push((selector, replacement.into()));
        self
    }

    /// Redact a request query parameter
    #[must_use]
    pub fn request_query_param(self, name: impl Into<String>) -> Self {
        self.rule(Selector::RequestQueryParam(name.into()), DEFAULT_REPLACEMENT)
    }

    /// Redact a request header
    #[must_use]
    pub fn request_header(self, name: impl Into<String>) -> Self {
        self.rule(Selector::RequestHeader(name.into()), DEFAULT_REPLACEMENT)
    }

    /// Redact a response header
    #[must_use]
    pub fn response_header(self, name: impl Into<String>) -> Self {
        self.rule(Selector::ResponseHeader(name.into()), DEFAULT_REPLACEMENT)
    }

    /// Redact a request body field
    #[must_use]
    pub fn request_body_field(self, name: impl Into<String>) -> Self {
        self.rule(Selector::RequestBodyField(name.into()), DEFAULT_REPLACEMENT)
    }

    /// Redact a response body field
    #[must_use]
    pub fn response_body_field(self, name: impl Into<String>) -> Self {
        self.rule(Selector::ResponseBodyField(name.into()), DEFAULT_REPLACEMENT)
    }

    /// Rules in application order
    #[must_use]
    pub fn rules(&self) -> &[(Selector, String)] {
        &self.rules
    }
}

impl InteractionAnonymizer for RulesAnonymizer {
    fn anonymize(&self, mut message: InteractionMessage) -> InteractionMessage {
        self.redact_request(&mut message.request);
        self.redact_response(&mut message.response);
        message
    }

    fn anonymize_request(&self, mut request: Request) -> Request {
        self.redact_request(&mut request);
        request
    }
}

impl RulesAnonymizer {
    fn redact_request(&self, request: &mut Request) {
        for (selector, replacement) in &self.rules {
            match selector {
                Selector::RequestQueryParam(name) => {
                    request.url = redact_query(&request.url, name, replacement);
                }
                Selector::RequestHeader(name) => {
                    redact_header(&mut request.headers, name, replacement);
                }
                Selector::RequestBodyField(name) => {
                    redact_body(request.body.as_mut(), name, replacement);
                }
                Selector::ResponseHeader(_) | Selector::ResponseBodyField(_) => {}
            }
        }
    }

    fn redact_response(&self, response: &mut Response) {
        for (selector, replacement) in &self.rules {
            match selector {
                Selector::ResponseHeader(name) => {
                    redact_header(&mut response.headers, name, replacement);
                }
                Selector::ResponseBodyField(name) => {
                    redact_body(response.body.as_mut(), name, replacement);
                }
                Selector::RequestQueryParam(_)
                | Selector::RequestHeader(_)
                | Selector::RequestBodyField(_) => {}
            }
        }
    }
}

fn redact_header(headers: &mut Headers, name: &str, replacement: &str) {
    headers.replace_values(name, replacement);
}

/// Rewrite only the matching pairs of the query, leaving the rest verbatim
fn redact_query(url: &str, name: &str, replacement: &str) -> String {
    let Some((base, rest)) = url.split_once('?') else {
        return url.to_string();
    };
    let (query, fragment) = match rest.split_once('#') {
        Some((query, fragment)) => (query, Some(fragment)),
        None => (rest, None),
    };

    let query = redact_pairs(query, name, replacement);

    match fragment {
        Some(fragment) => format!("{base}?{query}#{fragment}"),
        None => format!("{base}?{query}"),
    }
}

fn redact_pairs(encoded: &str, name: &str, replacement: &str) -> String {
    let encoded_replacement = encode_query_value(replacement);
    encoded
        .split('&')
        .map(|pair| {
            let key = pair.split_once('=').map_or(pair, |(key, _)| key);
            if decode_component(key) == name {
                format!("{key}={encoded_replacement}")
            } else {
                pair.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Percent-encode only what cannot appear literally in a query value
fn encode_query_value(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_ascii_alphanumeric() || "-._~!$'()*,;:@/?".contains(c) {
            encoded.push(c);
        } else {
            let mut buf = [0u8; 4];
            encoded.push_str(&urlencoding::encode(c.encode_utf8(&mut buf)));
        }
    }
    encoded
}

fn redact_body(body: Option<&mut Body>, field: &str, replacement: &str) {
    let Some(body) = body else {
        return;
    };

    if body.is_json() {
        if let Ok(mut value) = serde_json::from_slice::<Value>(&body.content) {
            if redact_json(&mut value, field, replacement) {
                if let Ok(bytes) = serde_json::to_vec(&value) {
                    body.content = Bytes::from(bytes);
                }
            }
        }
    } else if body.is_form() {
        if let Ok(text) = std::str::from_utf8(&body.content) {
            let redacted = redact_pairs(text, field, replacement);
            if redacted != text {
                body.content = Bytes::from(redacted);
            }
        }
    }
}

/// Replace every value stored under `field`, at any depth
fn redact_json(value: &mut Value, field: &str, replacement: &str) -> bool {
    match value {
        Value::Object(map) => {
            let mut changed = false;
            for (key, child) in map.iter_mut() {
                if key == field {
                    if child.as_str() != Some(replacement) {
                        *child = Value::String(replacement.to_string());
                        changed = true;
                    }
                } else {
                    changed |= redact_json(child, field, replacement);
                }
            }
            changed
        }
        Value::Array(items) => items
            .iter_mut()
            .fold(false, |changed, item| redact_json(item, field, replacement) || changed),
        _ => false,
    }
}
