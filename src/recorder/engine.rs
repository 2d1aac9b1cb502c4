//! Interception engine for one cassette

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::anonymizer::{InteractionAnonymizer, RulesAnonymizer};
use crate::config::{RecorderConfig, DEFAULT_CASSETTE_DIR};
use crate::matcher::RuleSet;
use crate::message::{InteractionMessage, Request, Response};
use crate::mode::{EnvOverride, Mode, ModeOverride, ModeResolver};
use crate::repository::{validate_name, HarFileRepository, InteractionRepository};
use crate::transport::{HyperTransport, Transport};
use crate::{RecorderError, Result};

use super::session::CassetteSession;

/// Records, replays or passes through every request sent through it
///
/// One engine serves one cassette. Concurrent calls are serialized around
/// the cassette state only; forwarding to the network happens outside the
/// critical section.
#[derive(Debug)]
pub struct Recorder {
    name: String,
    enabled: bool,
    resolver: ModeResolver,
    rules: RuleSet,
    repository: Arc<dyn InteractionRepository>,
    anonymizer: Arc<dyn InteractionAnonymizer>,
    transport: Arc<dyn Transport>,
    forward_timeout: Option<Duration>,
    session: Mutex<Option<CassetteSession>>,
    replayed: AtomicUsize,
    recorded: AtomicUsize,
    passed_through: AtomicUsize,
}

impl Recorder {
    /// Start building an engine for the named cassette
    pub fn builder(name: impl Into<String>) -> RecorderBuilder {
        RecorderBuilder::new(name)
    }

    /// Builder pre-filled from configuration
    ///
    /// The configured `interaction_name` wins over `name`.
    pub fn from_config(name: impl Into<String>, config: &RecorderConfig) -> RecorderBuilder {
        let name = config.interaction_name.clone().unwrap_or_else(|| name.into());
        let mut builder = RecorderBuilder::new(name)
            .enabled(config.enabled)
            .mode(config.mode)
            .rules(config.rule_set())
            .anonymizer(Arc::new(config.anonymizer()))
            .cassette_dir(config.cassette_dir.clone());
        if let Some(timeout) = config.forward_timeout() {
            builder = builder.forward_timeout(timeout);
        }
        builder
    }

    /// Cassette name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle one outgoing request
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::StorageMissing`] or
    /// [`RecorderError::NoMatchFound`] when replay cannot be satisfied,
    /// storage errors when the cassette cannot be read or written, and
    /// transport errors from forwarded calls
    pub async fn handle(&self, request: hyper::Request<Bytes>) -> Result<hyper::Response<Bytes>> {
        let requested = self.resolver.requested();
        if !self.enabled || requested == Mode::Passthrough {
            debug!("Passthrough: {} {}", request.method(), request.uri());
            self.passed_through.fetch_add(1, Ordering::Relaxed);
            return self.forward(request).await;
        }

        let live = Request::capture(&request);

        {
            let mut guard = self.session.lock().await;
            let session = self.open_session(&mut guard, requested).await?;

            if session.mode().permits_replay() {
                let comparable = self.anonymizer.anonymize_request(live.clone());
                let Some((index, response)) = session.take_match(&comparable, &self.rules) else {
                    warn!(
                        "No match in '{}' for {} {} ({} recorded, {} consumed)",
                        self.name,
                        live.method,
                        live.url,
                        session.interaction().len(),
                        session.consumed()
                    );
                    return Err(RecorderError::NoMatchFound {
                        method: live.method,
                        url: live.url,
                    });
                };
                drop(guard);

                debug!(
                    "Replay '{}' #{}: {} {} -> {}",
                    self.name, index, live.method, live.url, response.status
                );
                self.replayed.fetch_add(1, Ordering::Relaxed);
                return response.to_http();
            }
        }

        let response = self.forward(request).await?;
        let captured = InteractionMessage::new(live, Response::capture(&response));
        let persisted = self.anonymizer.anonymize(captured);

        {
            let mut guard = self.session.lock().await;
            let session = self.open_session(&mut guard, Mode::Record).await?;
            debug!(
                "Record '{}' #{}: {} {} -> {}",
                self.name,
                session.interaction().len(),
                persisted.request.method,
                persisted.request.url,
                persisted.response.status
            );
            session.append(persisted);
            self.repository.store(session.interaction()).await?;
        }

        self.recorded.fetch_add(1, Ordering::Relaxed);
        Ok(response)
    }

    /// Mode of the open session, if any call has been handled yet
    pub async fn session_mode(&self) -> Option<Mode> {
        self.session.lock().await.as_ref().map(CassetteSession::mode)
    }

    /// Call statistics
    #[must_use]
    pub fn stats(&self) -> RecorderStats {
        RecorderStats {
            replayed: self.replayed.load(Ordering::Relaxed),
            recorded: self.recorded.load(Ordering::Relaxed),
            passed_through: self.passed_through.load(Ordering::Relaxed),
        }
    }

    /// Make sure a session compatible with `requested` is open
    async fn open_session<'a>(
        &self,
        slot: &'a mut Option<CassetteSession>,
        requested: Mode,
    ) -> Result<&'a mut CassetteSession> {
        let established = slot.as_ref().map(CassetteSession::mode);
        let exists = if requested == Mode::Auto && established.is_none() {
            self.repository.exists(&self.name).await?
        } else {
            false
        };
        let mode = ModeResolver::resolve(requested, established, exists);

        if established != Some(mode) {
            let session = match mode {
                Mode::Record => {
                    info!("Recording cassette '{}'", self.name);
                    CassetteSession::recording(&self.name)
                }
                Mode::Replay => {
                    let interaction = self.repository.load(&self.name).await?;
                    info!(
                        "Replaying cassette '{}' ({} interactions)",
                        self.name,
                        interaction.len()
                    );
                    CassetteSession::replaying(interaction)
                }
                Mode::Passthrough | Mode::Auto => {
                    return Err(RecorderError::Config(format!(
                        "Cannot open a cassette session in {mode} mode"
                    )));
                }
            };
            *slot = Some(session);
        }

        slot.as_mut()
            .ok_or_else(|| RecorderError::Config("Cassette session was not opened".to_string()))
    }

    async fn forward(&self, request: hyper::Request<Bytes>) -> Result<hyper::Response<Bytes>> {
        let send = self.transport.send(request);
        match self.forward_timeout {
            Some(limit) => tokio::time::timeout(limit, send)
                .await
                .map_err(|_| RecorderError::Timeout(limit))?,
            None => send.await,
        }
    }
}

/// Call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    /// Calls served from the cassette
    pub replayed: usize,
    /// Calls forwarded and persisted
    pub recorded: usize,
    /// Calls forwarded without recording
    pub passed_through: usize,
}

/// Builder for [`Recorder`]; every collaborator has a default
#[derive(Debug)]
pub struct RecorderBuilder {
    name: String,
    enabled: bool,
    mode: Mode,
    rules: Option<RuleSet>,
    repository: Option<Arc<dyn InteractionRepository>>,
    anonymizer: Option<Arc<dyn InteractionAnonymizer>>,
    transport: Option<Arc<dyn Transport>>,
    mode_override: Option<Box<dyn ModeOverride>>,
    cassette_dir: Option<PathBuf>,
    forward_timeout: Option<Duration>,
}

impl RecorderBuilder {
    /// Builder for the named cassette in `Auto` mode
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            mode: Mode::Auto,
            rules: None,
            repository: None,
            anonymizer: None,
            transport: None,
            mode_override: None,
            cassette_dir: None,
            forward_timeout: None,
        }
    }

    /// Disable the engine entirely; every call passes through
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Requested mode
    #[must_use]
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Match rule set
    #[must_use]
    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Cassette repository
    #[must_use]
    pub fn repository(mut self, repository: Arc<dyn InteractionRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Anonymizer applied to persisted exchanges
    #[must_use]
    pub fn anonymizer(mut self, anonymizer: Arc<dyn InteractionAnonymizer>) -> Self {
        self.anonymizer = Some(anonymizer);
        self
    }

    /// Network transport
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Source of the external mode override
    #[must_use]
    pub fn mode_override(mut self, source: Box<dyn ModeOverride>) -> Self {
        self.mode_override = Some(source);
        self
    }

    /// Root of the default HAR repository
    #[must_use]
    pub fn cassette_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cassette_dir = Some(dir.into());
        self
    }

    /// Upper bound for forwarded calls
    #[must_use]
    pub fn forward_timeout(mut self, timeout: Duration) -> Self {
        self.forward_timeout = Some(timeout);
        self
    }

    /// Build the engine
    ///
    /// # Errors
    ///
    /// Returns error if the cassette name is invalid
    pub fn build(self) -> Result<Recorder> {
        validate_name(&self.name)?;

        let cassette_dir = self
            .cassette_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CASSETTE_DIR));
        let repository = self
            .repository
            .unwrap_or_else(|| Arc::new(HarFileRepository::new(cassette_dir)));
        let source = self.mode_override.unwrap_or_else(|| Box::new(EnvOverride));

        Ok(Recorder {
            name: self.name,
            enabled: self.enabled,
            resolver: ModeResolver::new(self.mode, source),
            rules: self.rules.unwrap_or_default(),
            repository,
            anonymizer: self
                .anonymizer
                .unwrap_or_else(|| Arc::new(RulesAnonymizer::default())),
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(HyperTransport::new())),
            forward_timeout: self.forward_timeout,
            session: Mutex::new(None),
            replayed: AtomicUsize::new(0),
            recorded: AtomicUsize::new(0),
            passed_through: AtomicUsize::new(0),
        })
    }
}
