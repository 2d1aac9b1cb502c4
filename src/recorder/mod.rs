//! Interception engine: mode resolution, replay and recording per call

mod engine;
mod session;

pub use engine::{Recorder, RecorderBuilder, RecorderStats};
pub use session::CassetteSession;
