pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod poll;
pub mod render;
pub mod simulator;
pub mod state;
pub mod telemetry;
pub mod types;

pub use engine::AdvisoryEngine;
pub use error::{AdvisorError, Result};
pub use types::{AdvisoryMode, Decision, DecisionSource, TelemetrySnapshot};
