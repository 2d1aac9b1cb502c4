//! Reel - in-process HTTP record/replay for deterministic tests
//!
//! A [`Recorder`] sits in an outbound HTTP call pipeline. The first run
//! forwards requests to the real endpoint and persists every exchange to a
//! HAR cassette; later runs serve the same logical requests from the cassette
//! without touching the network.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_wrap,
    clippy::multiple_crate_versions
)]

pub mod anonymizer;
pub mod config;
pub mod context;
pub mod error;
pub mod matcher;
pub mod message;
pub mod mode;
pub mod recorder;
pub mod repository;
pub mod transport;

pub use error::{RecorderError, Result};
pub use mode::Mode;
pub use recorder::{Recorder, RecorderBuilder};
