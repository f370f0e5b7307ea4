//! Stand-in vehicle for local runs.
//!
//! The simulated car cycles through four driving scenarios (normal, hot
//! cabin, high speed, low battery), easing each signal toward the scenario's
//! target every step. [`router`] exposes the latest reading on `GET /signals`
//! in the same JSON shape the advisor polls.

use axum::{extract::State, routing::get, Json, Router};
use parking_lot::RwLock;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;

use crate::types::{AdvisoryMode, TelemetrySnapshot};

/// Steps spent in each scenario before moving to the next (~100 s at 500 ms).
pub const STEPS_PER_SCENARIO: u32 = 200;

pub type SharedSnapshot = Arc<RwLock<TelemetrySnapshot>>;

#[derive(Debug, Clone, Copy)]
struct Targets {
    speed_kmh: f32,
    outside_temp_c: f32,
    cabin_temp_c: f32,
    battery_level_percent: f32,
}

fn targets(scenario: AdvisoryMode) -> Targets {
    match scenario {
        AdvisoryMode::Normal => Targets {
            speed_kmh: 60.0,
            outside_temp_c: 25.0,
            cabin_temp_c: 24.0,
            battery_level_percent: 90.0,
        },
        AdvisoryMode::Comfort => Targets {
            speed_kmh: 70.0,
            outside_temp_c: 33.0,
            cabin_temp_c: 34.0,
            battery_level_percent: 80.0,
        },
        AdvisoryMode::Safety => Targets {
            speed_kmh: 140.0,
            outside_temp_c: 26.0,
            cabin_temp_c: 24.0,
            battery_level_percent: 70.0,
        },
        AdvisoryMode::Energy => Targets {
            speed_kmh: 50.0,
            outside_temp_c: 25.0,
            cabin_temp_c: 24.0,
            battery_level_percent: 10.0,
        },
    }
}

/// Move `value` toward `target` by at most `step`, without overshooting.
fn move_towards(value: f32, target: f32, step: f32) -> f32 {
    if value < target {
        (value + step).min(target)
    } else if value > target {
        (value - step).max(target)
    } else {
        value
    }
}

pub struct VehicleSimulator {
    state: TelemetrySnapshot,
    scenario: AdvisoryMode,
    steps_in_scenario: u32,
}

impl Default for VehicleSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl VehicleSimulator {
    pub fn new() -> Self {
        Self {
            state: TelemetrySnapshot::new(0.0, 25.0, 24.0, 100.0),
            scenario: AdvisoryMode::Normal,
            steps_in_scenario: 0,
        }
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.state
    }

    /// Scenario currently being driven.
    pub fn scenario(&self) -> AdvisoryMode {
        self.scenario
    }

    /// Advance one tick and return the new reading.
    pub fn step(&mut self) -> TelemetrySnapshot {
        if self.steps_in_scenario >= STEPS_PER_SCENARIO {
            let next = (self.scenario.index() + 1) % AdvisoryMode::COUNT;
            // index is always in range after the modulo
            self.scenario = AdvisoryMode::from_index(next).unwrap_or(AdvisoryMode::Normal);
            self.steps_in_scenario = 0;
            tracing::info!(scenario = %self.scenario, "simulator switching scenario");
        }
        self.steps_in_scenario += 1;

        let t = targets(self.scenario);
        let s = &mut self.state;

        s.speed_kmh = move_towards(s.speed_kmh, t.speed_kmh, 5.0).clamp(0.0, 160.0);
        s.outside_temp_c = move_towards(s.outside_temp_c, t.outside_temp_c, 0.2).clamp(-10.0, 45.0);
        s.cabin_temp_c = move_towards(s.cabin_temp_c, t.cabin_temp_c, 0.3).clamp(15.0, 45.0);

        // drains a little with speed on top of easing toward the target
        let drain = if s.speed_kmh > 0.0 { 0.02 } else { 0.005 };
        let mut battery = move_towards(s.battery_level_percent - drain, t.battery_level_percent, 0.5);
        if battery < 3.0 {
            battery = 100.0;
        }
        s.battery_level_percent = battery.clamp(0.0, 100.0);

        self.state
    }
}

async fn signals(State(shared): State<SharedSnapshot>) -> Json<TelemetrySnapshot> {
    Json(*shared.read())
}

pub fn router(shared: SharedSnapshot) -> Router {
    Router::new().route("/signals", get(signals)).with_state(shared)
}

/// Step the simulator every `step` and serve readings on `listener` until the
/// server fails.
pub async fn run(listener: TcpListener, step: Duration) -> std::io::Result<()> {
    let mut sim = VehicleSimulator::new();
    let shared: SharedSnapshot = Arc::new(RwLock::new(sim.snapshot()));

    let writer = Arc::clone(&shared);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(step);
        loop {
            ticker.tick().await;
            let snap = sim.step();
            *writer.write() = snap;
            tracing::trace!(?snap, "simulator step");
        }
    });

    tracing::info!("simulator serving http://{}/signals", listener.local_addr()?);
    axum::serve(listener, router(shared)).await
}
