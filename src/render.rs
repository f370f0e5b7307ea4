use std::io::Write;

use crate::state::DisplayState;

/// One rendered screen. Pure data, so tests can inspect it.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub lines: Vec<String>,
    /// `#RRGGBB` for the mode and advice lines
    pub accent: &'static str,
    pub button: &'static str,
}

impl Frame {
    pub fn text(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push_str("\n[");
        out.push_str(self.button);
        out.push(']');
        out
    }
}

pub fn render(state: &DisplayState) -> Frame {
    let s = &state.snapshot;
    let mut lines = vec![
        format!("Mode: {}", state.mode),
        format!("Speed: {} km/h", s.speed_kmh),
        format!("Outside temp: {} °C", s.outside_temp_c),
        format!("Cabin temp: {} °C", s.cabin_temp_c),
        format!("Battery: {} %", s.battery_level_percent),
        format!("Advice:\n{}", state.advice),
    ];
    if let Some(err) = &state.error {
        lines.push(err.clone());
    }

    Frame {
        lines,
        accent: state.mode.color(),
        button: if state.running { "Stop simulation" } else { "Start simulation" },
    }
}

/// Where frames go.
pub trait Display: Send {
    fn show(&mut self, frame: &Frame);
}

/// Prints each frame to a writer (stdout in the binary).
pub struct TerminalDisplay<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> TerminalDisplay<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write + Send> Display for TerminalDisplay<W> {
    fn show(&mut self, frame: &Frame) {
        if let Err(e) = writeln!(self.out, "{}\n", frame.text()) {
            tracing::warn!("display write failed: {}", e);
        }
    }
}
