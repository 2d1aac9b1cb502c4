//! Configuration types for Reel

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::anonymizer::{RulesAnonymizer, Selector, DEFAULT_REPLACEMENT};
use crate::matcher::{MatchPolicy, RuleSet};
use crate::mode::Mode;
use crate::repository::validate_name;
use crate::{RecorderError, Result};

/// Default directory for cassettes, relative to the working directory
pub const DEFAULT_CASSETTE_DIR: &str = "tests/cassettes";

/// Recorder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// When false every call is passed through untouched
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Requested mode
    #[serde(default)]
    pub mode: Mode,
    /// Directory for the default HAR repository
    #[serde(default = "default_cassette_dir")]
    pub cassette_dir: PathBuf,
    /// Explicit cassette name; derived from the test identity when absent
    #[serde(default)]
    pub interaction_name: Option<String>,
    /// Upper bound for a forwarded call
    #[serde(default)]
    pub forward_timeout_ms: Option<u64>,
    /// Matching rules
    #[serde(default)]
    pub matcher: MatcherConfig,
    /// Redaction rules
    #[serde(default)]
    pub anonymizer: AnonymizerConfig,
}

/// Built-in match rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
    /// Method equality
    Method,
    /// URL equality up to query ordering
    Url,
    /// Path equality
    Path,
    /// Byte equality of bodies
    Body,
    /// Structural JSON equality of bodies
    JsonBody,
}

/// Matcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Consumption policy
    #[serde(default)]
    pub policy: MatchPolicy,
    /// Built-in rules in evaluation order
    #[serde(default = "default_rules")]
    pub rules: Vec<RuleKind>,
    /// Headers whose values must match
    #[serde(default)]
    pub headers: Vec<String>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            policy: MatchPolicy::default(),
            rules: default_rules(),
            headers: Vec::new(),
        }
    }
}

/// Anonymizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnonymizerConfig {
    /// Replacement written over redacted values
    #[serde(default = "default_replacement")]
    pub replacement: String,
    /// Request query parameters to redact
    #[serde(default)]
    pub request_query_params: Vec<String>,
    /// Request headers to redact
    #[serde(default)]
    pub request_headers: Vec<String>,
    /// Response headers to redact
    #[serde(default)]
    pub response_headers: Vec<String>,
    /// Request body fields to redact
    #[serde(default)]
    pub request_body_fields: Vec<String>,
    /// Response body fields to redact
    #[serde(default)]
    pub response_body_fields: Vec<String>,
}

impl Default for AnonymizerConfig {
    fn default() -> Self {
        Self {
            replacement: default_replacement(),
            request_query_params: Vec::new(),
            request_headers: Vec::new(),
            response_headers: Vec::new(),
            request_body_fields: Vec::new(),
            response_body_fields: Vec::new(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_cassette_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CASSETTE_DIR)
}

fn default_rules() -> Vec<RuleKind> {
    vec![RuleKind::Method, RuleKind::Url]
}

fn default_replacement() -> String {
    DEFAULT_REPLACEMENT.to_string()
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            mode: Mode::default(),
            cassette_dir: default_cassette_dir(),
            interaction_name: None,
            forward_timeout_ms: None,
            matcher: MatcherConfig::default(),
            anonymizer: AnonymizerConfig::default(),
        }
    }
}

impl RecorderConfig {
    /// Configuration with an explicit mode and cassette name
    pub fn with_mode(mode: Mode, interaction_name: impl Into<String>) -> Self {
        Self {
            mode,
            interaction_name: Some(interaction_name.into()),
            ..Self::default()
        }
    }

    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RecorderError::Config(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| RecorderError::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.interaction_name {
            validate_name(name)
                .map_err(|e| RecorderError::Config(format!("interaction_name: {e}")))?;
        }

        if self.forward_timeout_ms == Some(0) {
            return Err(RecorderError::Config(
                "forward_timeout_ms cannot be 0".to_string(),
            ));
        }

        if self.matcher.rules.is_empty() && self.matcher.headers.is_empty() {
            return Err(RecorderError::Config(
                "matcher must declare at least one rule".to_string(),
            ));
        }

        if self.anonymizer.replacement.is_empty() {
            return Err(RecorderError::Config(
                "anonymizer replacement cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Forward timeout as a duration
    #[must_use]
    pub fn forward_timeout(&self) -> Option<Duration> {
        self.forward_timeout_ms.map(Duration::from_millis)
    }

    /// Build the configured rule set
    #[must_use]
    pub fn rule_set(&self) -> RuleSet {
        let policy = self.matcher.policy;
        let name = match policy {
            MatchPolicy::Once => "config-match-once",
            MatchPolicy::Multiple => "config-match-multiple",
        };

        let rules = self
            .matcher
            .rules
            .iter()
            .fold(RuleSet::new(name, policy), |set, kind| match kind {
                RuleKind::Method => set.by_method(),
                RuleKind::Url => set.by_url(),
                RuleKind::Path => set.by_path(),
                RuleKind::Body => set.by_body(),
                RuleKind::JsonBody => set.by_json_body(),
            });

        self.matcher
            .headers
            .iter()
            .fold(rules, |set, header| set.by_header(header.clone()))
    }

    /// Build the configured anonymizer
    #[must_use]
    pub fn anonymizer(&self) -> RulesAnonymizer {
        let cfg = &self.anonymizer;
        let selectors = cfg
            .request_query_params
            .iter()
            .cloned()
            .map(Selector::RequestQueryParam)
            .chain(cfg.request_headers.iter().cloned().map(Selector::RequestHeader))
            .chain(cfg.response_headers.iter().cloned().map(Selector::ResponseHeader))
            .chain(
                cfg.request_body_fields
                    .iter()
                    .cloned()
                    .map(Selector::RequestBodyField),
            )
            .chain(
                cfg.response_body_fields
                    .iter()
                    .cloned()
                    .map(Selector::ResponseBodyField),
            );

        selectors.fold(RulesAnonymizer::new(), |anonymizer, selector| {
            anonymizer.rule(selector, cfg.replacement.clone())
        })
    }
}
