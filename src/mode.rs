//! Recorder modes and per-call mode resolution

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::RecorderError;

/// Environment variable that forces a mode for every call
pub const OVERRIDE_MODE_ENV: &str = "HTTPRECORDER_OVERRIDE_MODE";

/// Operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Call the real transport, never touch the cassette
    Passthrough,
    /// Call the real transport and persist every exchange, overwriting the cassette
    Record,
    /// Serve only from the cassette
    Replay,
    /// Replay when the cassette exists, record otherwise
    #[default]
    Auto,
}

impl Mode {
    /// Whether this mode may serve recorded responses
    #[must_use]
    pub fn permits_replay(self) -> bool {
        matches!(self, Self::Replay)
    }

    /// Whether this mode may append to the cassette
    #[must_use]
    pub fn permits_record(self) -> bool {
        matches!(self, Self::Record)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Passthrough => "Passthrough",
            Self::Record => "Record",
            Self::Replay => "Replay",
            Self::Auto => "Auto",
        };
        f.write_str(name)
    }
}

impl FromStr for Mode {
    type Err = RecorderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passthrough" => Ok(Self::Passthrough),
            "record" => Ok(Self::Record),
            "replay" => Ok(Self::Replay),
            "auto" => Ok(Self::Auto),
            other => Err(RecorderError::Config(format!("Unknown recorder mode '{other}'"))),
        }
    }
}

/// Source of an external mode override
pub trait ModeOverride: Send + Sync + fmt::Debug {
    /// Current override, if any
    fn current(&self) -> Option<Mode>;
}

/// Reads [`OVERRIDE_MODE_ENV`] on every call
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvOverride;

impl ModeOverride for EnvOverride {
    fn current(&self) -> Option<Mode> {
        let raw = std::env::var(OVERRIDE_MODE_ENV).ok()?;
        if raw.trim().is_empty() {
            return None;
        }

        match raw.parse() {
            Ok(mode) => Some(mode),
            Err(e) => {
                warn!("Ignoring {}: {}", OVERRIDE_MODE_ENV, e);
                None
            }
        }
    }
}

/// Fixed override, mostly for tests that must not touch the environment
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedOverride(pub Option<Mode>);

impl ModeOverride for FixedOverride {
    fn current(&self) -> Option<Mode> {
        self.0
    }
}

/// Decides the effective mode of each intercepted call
#[derive(Debug)]
pub struct ModeResolver {
    configured: Mode,
    source: Box<dyn ModeOverride>,
}

impl ModeResolver {
    /// Create a resolver for a configured mode and override source
    #[must_use]
    pub fn new(configured: Mode, source: Box<dyn ModeOverride>) -> Self {
        Self { configured, source }
    }

    /// The mode requested by configuration
    #[must_use]
    pub fn configured(&self) -> Mode {
        self.configured
    }

    /// Requested mode after applying the override, `Auto` still unresolved
    #[must_use]
    pub fn requested(&self) -> Mode {
        match self.source.current() {
            Some(forced) => {
                if forced != self.configured {
                    debug!("Mode override {} replaces configured {}", forced, self.configured);
                }
                forced
            }
            None => self.configured,
        }
    }

    /// Resolve `Auto` into `Record` or `Replay`
    ///
    /// `established` is the mode an existing session already resolved to; it
    /// takes precedence so a recording session keeps recording.
    #[must_use]
    pub fn resolve(requested: Mode, established: Option<Mode>, cassette_exists: bool) -> Mode {
        match requested {
            Mode::Auto => match established {
                Some(mode) => mode,
                None if cassette_exists => Mode::Replay,
                None => Mode::Record,
            },
            other => other,
        }
    }
}
