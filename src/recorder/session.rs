//! Per-cassette session state

use crate::matcher::{ConsumptionState, RuleSet};
use crate::message::{Interaction, InteractionMessage, Request, Response};
use crate::mode::Mode;

/// In-memory state of one cassette while an engine uses it
///
/// A session is bound to the mode it was opened in: recording sessions start
/// from an empty interaction, replay sessions from the stored one.
#[derive(Debug)]
pub struct CassetteSession {
    mode: Mode,
    interaction: Interaction,
    consumption: ConsumptionState,
}

impl CassetteSession {
    /// Fresh recording session; the stored cassette will be overwritten
    pub fn recording(name: &str) -> Self {
        Self {
            mode: Mode::Record,
            interaction: Interaction::new(name),
            consumption: ConsumptionState::new(),
        }
    }

    /// Replay session over a loaded interaction
    pub fn replaying(interaction: Interaction) -> Self {
        Self {
            mode: Mode::Replay,
            interaction,
            consumption: ConsumptionState::new(),
        }
    }

    /// Mode this session was opened in
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Current interaction
    pub fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    /// Find the next matching recorded response and mark it consumed
    pub fn take_match(&mut self, live: &Request, rules: &RuleSet) -> Option<(usize, Response)> {
        let index = rules.find(live, &self.interaction, &self.consumption)?;
        self.consumption.consume(index);
        let response = self.interaction.messages()[index].response.clone();
        Some((index, response))
    }

    /// Append a captured exchange
    pub fn append(&mut self, message: InteractionMessage) {
        self.interaction.push(message);
    }

    /// Number of messages already used for replay
    pub fn consumed(&self) -> usize {
        self.consumption.len()
    }
}
