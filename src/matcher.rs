//! Matching live requests against recorded ones

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::message::{Interaction, Request};

/// Predicate over (live request, recorded request)
pub type MatchRule = Arc<dyn Fn(&Request, &Request) -> bool + Send + Sync>;

/// How recorded messages may be reused during one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Each recorded message satisfies at most one live request
    #[default]
    Once,
    /// A recorded message may satisfy any number of live requests
    Multiple,
}

/// Indices of recorded messages already used for replay
#[derive(Debug, Clone, Default)]
pub struct ConsumptionState {
    consumed: HashSet<usize>,
}

impl ConsumptionState {
    /// Fresh state with nothing consumed
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `index` was already used
    #[must_use]
    pub fn is_consumed(&self, index: usize) -> bool {
        self.consumed.contains(&index)
    }

    /// Mark `index` as used
    pub fn consume(&mut self, index: usize) {
        self.consumed.insert(index);
    }

    /// Number of consumed messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.consumed.len()
    }

    /// Whether nothing has been consumed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.consumed.is_empty()
    }
}

/// A named, ordered set of match rules evaluated together
#[derive(Clone)]
pub struct RuleSet {
    name: String,
    policy: MatchPolicy,
    rules: Vec<(String, MatchRule)>,
}

impl RuleSet {
    /// Empty rule set; it matches every request until rules are added
    pub fn new(name: impl Into<String>, policy: MatchPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            rules: Vec::new(),
        }
    }

    /// Empty MatchOnce rule set
    #[must_use]
    pub fn match_once() -> Self {
        Self::new("match-once", MatchPolicy::Once)
    }

    /// Empty MatchMultiple rule set
    #[must_use]
    pub fn match_multiple() -> Self {
        Self::new("match-multiple", MatchPolicy::Multiple)
    }

    /// Rule set name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Consumption policy
    #[must_use]
    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Names of the rules in evaluation order
    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|(name, _)| name.as_str())
    }

    /// Add a custom rule
    #[must_use]
    pub fn by<F>(mut self, name: impl Into<String>, rule: F) -> Self
    where
        F: Fn(&Request, &Request) -> bool + Send + Sync + 'static,
    {
        self.rules.push((name.into(), Arc::new(rule)));
        self
    }

    /// Methods must be equal, ignoring case
    #[must_use]
    pub fn by_method(self) -> Self {
        self.by("method", |live, recorded| {
            live.method.eq_ignore_ascii_case(&recorded.method)
        })
    }

    /// URLs must be equal up to query parameter ordering
    #[must_use]
    pub fn by_url(self) -> Self {
        self.by("url", |live, recorded| normalize_url(live) == normalize_url(recorded))
    }

    /// Paths must be equal, query ignored
    #[must_use]
    pub fn by_path(self) -> Self {
        self.by("path", |live, recorded| live.path() == recorded.path())
    }

    /// Values of header `name` must be equal, in order
    #[must_use]
    pub fn by_header(self, name: impl Into<String>) -> Self {
        let name = name.into();
        let rule_name = format!("header:{}", name.to_ascii_lowercase());
        self.by(rule_name, move |live, recorded| {
            live.headers
                .get_all(&name)
                .map(str::trim)
                .eq(recorded.headers.get_all(&name).map(str::trim))
        })
    }

    /// Bodies must be byte-for-byte equal
    #[must_use]
    pub fn by_body(self) -> Self {
        self.by("body", |live, recorded| body_bytes(live) == body_bytes(recorded))
    }

    /// Bodies must be structurally equal JSON, falling back to bytes
    #[must_use]
    pub fn by_json_body(self) -> Self {
        self.by("json-body", |live, recorded| {
            let parse = |request: &Request| {
                serde_json::from_slice::<serde_json::Value>(body_bytes(request)).ok()
            };
            match (parse(live), parse(recorded)) {
                (Some(a), Some(b)) => a == b,
                _ => body_bytes(live) == body_bytes(recorded),
            }
        })
    }

    /// Whether every rule accepts the pair
    #[must_use]
    pub fn matches(&self, live: &Request, recorded: &Request) -> bool {
        self.rules.iter().all(|(_, rule)| rule(live, recorded))
    }

    /// Earliest recorded message that satisfies the rule set
    ///
    /// Under [`MatchPolicy::Once`] consumed messages are skipped. The caller
    /// is responsible for marking the returned index as consumed.
    #[must_use]
    pub fn find(
        &self,
        live: &Request,
        interaction: &Interaction,
        consumption: &ConsumptionState,
    ) -> Option<usize> {
        interaction
            .messages()
            .iter()
            .enumerate()
            .filter(|(index, _)| {
                self.policy == MatchPolicy::Multiple || !consumption.is_consumed(*index)
            })
            .find(|(_, message)| self.matches(live, &message.request))
            .map(|(index, _)| index)
    }
}

impl Default for RuleSet {
    /// MatchOnce by method and URL
    fn default() -> Self {
        Self::match_once().by_method().by_url()
    }
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("rules", &self.rule_names().collect::<Vec<_>>())
            .finish()
    }
}

fn body_bytes(request: &Request) -> &[u8] {
    request.body.as_ref().map_or(&[], |body| body.content.as_ref())
}

/// Path and sorted query, used for order-insensitive URL comparison
fn normalize_url(request: &Request) -> (String, String, Vec<(String, String)>) {
    let base = request
        .url
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    let mut query = request.query_pairs();
    query.sort();
    (base, request.path().to_string(), query)
}
