use serde::{Deserialize, Serialize};

use crate::error::{AdvisorError, Result};

/// One telemetry reading as served by `/signals`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub speed_kmh: f32,
    pub outside_temp_c: f32,
    pub cabin_temp_c: f32,
    pub battery_level_percent: f32,
}

impl TelemetrySnapshot {
    pub fn new(speed_kmh: f32, outside_temp_c: f32, cabin_temp_c: f32, battery_level_percent: f32) -> Self {
        Self {
            speed_kmh,
            outside_temp_c,
            cabin_temp_c,
            battery_level_percent,
        }
    }

    /// Classifier input, in the order the model was trained on.
    pub fn as_features(&self) -> [f32; 4] {
        [
            self.speed_kmh,
            self.outside_temp_c,
            self.cabin_temp_c,
            self.battery_level_percent,
        ]
    }

    /// JSON numbers past `f32::MAX` decode to infinity; such a reading is
    /// rejected like any other malformed payload.
    pub fn check_finite(self) -> Result<Self> {
        match self.as_features().iter().position(|v| !v.is_finite()) {
            None => Ok(self),
            Some(i) => Err(AdvisorError::Fetch(format!(
                "non-finite {} in telemetry payload",
                FIELD_NAMES[i]
            ))),
        }
    }
}

const FIELD_NAMES: [&str; 4] = ["speed_kmh", "outside_temp_c", "cabin_temp_c", "battery_level_percent"];

impl Default for TelemetrySnapshot {
    // what the display shows before the first successful poll
    fn default() -> Self {
        Self::new(0.0, 25.0, 24.0, 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdvisoryMode {
    Normal,
    Comfort,
    Safety,
    Energy,
}

struct ModeEntry {
    mode: AdvisoryMode,
    name: &'static str,
    advice: &'static str,
    color: &'static str,
}

// Indexed by class label. Both the override rules and the classifier resolve
// through this table.
const MODE_TABLE: [ModeEntry; 4] = [
    ModeEntry {
        mode: AdvisoryMode::Normal,
        name: "Normal",
        advice: "Conditions are normal.",
        color: "#43A047",
    },
    ModeEntry {
        mode: AdvisoryMode::Comfort,
        name: "Comfort",
        advice: "Comfort tip: Cabin temperature not optimal.",
        color: "#FFA726",
    },
    ModeEntry {
        mode: AdvisoryMode::Safety,
        name: "Safety",
        advice: "Safety tip: Speed is high, consider slowing down.",
        color: "#E53935",
    },
    ModeEntry {
        mode: AdvisoryMode::Energy,
        name: "Energy",
        advice: "Energy tip: Battery is low, drive in eco style.",
        color: "#1E88E5",
    },
];

impl AdvisoryMode {
    pub const COUNT: usize = MODE_TABLE.len();

    pub fn from_index(idx: usize) -> Result<Self> {
        MODE_TABLE
            .get(idx)
            .map(|e| e.mode)
            .ok_or(AdvisorError::ClassOutOfRange(idx))
    }

    pub fn index(self) -> usize {
        self as usize
    }

    fn entry(self) -> &'static ModeEntry {
        &MODE_TABLE[self.index()]
    }

    pub fn name(self) -> &'static str {
        self.entry().name
    }

    pub fn advice(self) -> &'static str {
        self.entry().advice
    }

    /// Display color as `#RRGGBB`.
    pub fn color(self) -> &'static str {
        self.entry().color
    }
}

impl std::fmt::Display for AdvisoryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which stage of the cascade produced the mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DecisionSource {
    BatteryOverride,
    SpeedOverride,
    Model { probabilities: Vec<f32> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub mode: AdvisoryMode,
    pub source: DecisionSource,
}
