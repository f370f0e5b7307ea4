use serde::Deserialize;
use std::{fs, path::PathBuf, str::FromStr};

use crate::error::{AdvisorError, Result};

pub const BUNDLED_MODEL: &str = "models/ev_assistant_model.json";

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    pub base_url: String,
    pub signals_path: String,
    pub timeout_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            signals_path: "/signals".to_string(),
            timeout_ms: 2000,
        }
    }
}

impl TelemetryConfig {
    pub fn url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.signals_path.trim_start_matches('/')
        )
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    #[default]
    Dense,
    Rules,
    Torch,
}

impl FromStr for ModelKind {
    type Err = AdvisorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dense" => Ok(Self::Dense),
            "rules" => Ok(Self::Rules),
            "torch" => Ok(Self::Torch),
            other => Err(AdvisorError::Config(format!("unknown model kind {:?}", other))),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct ModelConfig {
    pub kind: ModelKind,
    /// Falls back to the bundled artifact when unset.
    pub path: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SimulatorConfig {
    pub bind_addr: String,
    pub step_ms: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            step_ms: 500,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AdvisorConfig {
    pub telemetry: TelemetryConfig,
    pub poll_interval_ms: u64,
    pub model: ModelConfig,
    pub simulator: SimulatorConfig,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            telemetry: TelemetryConfig::default(),
            poll_interval_ms: 1000,
            model: ModelConfig::default(),
            simulator: SimulatorConfig::default(),
        }
    }
}

impl AdvisorConfig {
    pub fn load(path: &str) -> Result<Self> {
        let data = fs::read_to_string(path)
            .map_err(|e| AdvisorError::Config(format!("config file {}: {}", path, e)))?;
        serde_json::from_str(&data).map_err(|e| AdvisorError::Config(format!("config file {}: {}", path, e)))
    }

    /// `ADVISOR_CONFIG` file if set, then individual environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut cfg = match std::env::var("ADVISOR_CONFIG") {
            Ok(path) => Self::load(&path)?,
            Err(_) => Self::default(),
        };
        cfg.apply_overrides(|k| std::env::var(k).ok())?;
        Ok(cfg)
    }

    pub fn apply_overrides<F>(&mut self, get: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = get("TELEMETRY_URL") {
            self.telemetry.base_url = v;
        }
        if let Some(v) = get("SIGNALS_PATH") {
            self.telemetry.signals_path = v;
        }
        if let Some(v) = get("POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse_num("POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = get("MODEL_PATH") {
            self.model.path = Some(v);
        }
        if let Some(v) = get("MODEL_KIND") {
            self.model.kind = v.parse()?;
        }
        if let Some(v) = get("BIND_ADDR") {
            self.simulator.bind_addr = v;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(AdvisorError::Config("poll_interval_ms must be > 0".into()));
        }
        if self.simulator.step_ms == 0 {
            return Err(AdvisorError::Config("simulator.step_ms must be > 0".into()));
        }
        if !self.telemetry.base_url.starts_with("http://") && !self.telemetry.base_url.starts_with("https://") {
            return Err(AdvisorError::Config(format!(
                "telemetry base_url {:?} is not an http(s) URL",
                self.telemetry.base_url
            )));
        }
        Ok(())
    }

    /// Configured model path, or the first existing bundled-artifact location.
    pub fn model_path(&self) -> PathBuf {
        match &self.model.path {
            Some(p) => PathBuf::from(p),
            None => resolve_bundled_model(),
        }
    }
}

fn parse_num(key: &str, v: &str) -> Result<u64> {
    v.trim()
        .parse()
        .map_err(|_| AdvisorError::Config(format!("{} is not a number: {:?}", key, v)))
}

/// Working directory first, then the crate root, then next to the binary.
/// A missing artifact is left for the model loader to report.
fn resolve_bundled_model() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|d| d.join(BUNDLED_MODEL)));

    [
        Some(PathBuf::from(BUNDLED_MODEL)),
        Some(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(BUNDLED_MODEL)),
        exe_dir,
    ]
    .into_iter()
    .flatten()
    .find(|p| p.exists())
    .unwrap_or_else(|| PathBuf::from(BUNDLED_MODEL))
}
