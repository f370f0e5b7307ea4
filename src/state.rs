use crate::types::{AdvisoryMode, TelemetrySnapshot};

pub const WAITING_ADVICE: &str = "Waiting for data...";
pub const DISCONNECTED: &str = "Simulator not connected";

/// Everything the display needs. Never mutated in place; see [`reduce`].
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayState {
    pub snapshot: TelemetrySnapshot,
    pub mode: AdvisoryMode,
    pub advice: String,
    pub error: Option<String>,
    pub running: bool,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            snapshot: TelemetrySnapshot::default(),
            mode: AdvisoryMode::Normal,
            advice: WAITING_ADVICE.to_string(),
            error: None,
            running: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A snapshot was fetched and classified.
    Decided {
        snapshot: TelemetrySnapshot,
        mode: AdvisoryMode,
    },
    /// The poll failed; `reason` is the underlying error text.
    FetchFailed { reason: String },
    /// Start/stop button.
    Toggle,
}

pub fn reduce(prev: &DisplayState, event: Event) -> DisplayState {
    match event {
        Event::Decided { snapshot, mode } => DisplayState {
            snapshot,
            mode,
            advice: mode.advice().to_string(),
            error: None,
            running: prev.running,
        },
        // mode, advice and the last good snapshot stay on screen
        Event::FetchFailed { reason } => DisplayState {
            error: Some(format!("{}: {}", DISCONNECTED, reason)),
            ..prev.clone()
        },
        Event::Toggle => DisplayState {
            running: !prev.running,
            ..prev.clone()
        },
    }
}
