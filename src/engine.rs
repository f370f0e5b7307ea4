use crate::error::{AdvisorError, Result};
use crate::model::{argmax, ClassifierModel};
use crate::types::{AdvisoryMode, Decision, DecisionSource, TelemetrySnapshot};

/// Below this charge the driver is told to save energy, whatever else is going on.
pub const BATTERY_CRITICAL_PERCENT: f32 = 5.0;
/// Above this speed the safety advice bypasses the classifier.
pub const SPEED_LIMIT_KMH: f32 = 130.0;

/// Override rules first, classifier second, then the mode table.
pub struct AdvisoryEngine {
    model: Box<dyn ClassifierModel>,
}

impl AdvisoryEngine {
    pub fn new(model: Box<dyn ClassifierModel>) -> Self {
        Self { model }
    }

    pub fn decide(&self, snap: &TelemetrySnapshot) -> Result<AdvisoryMode> {
        self.evaluate(snap).map(|d| d.mode)
    }

    /// Same cascade as [`decide`](Self::decide), keeping track of which stage fired.
    pub fn evaluate(&self, snap: &TelemetrySnapshot) -> Result<Decision> {
        if snap.battery_level_percent < BATTERY_CRITICAL_PERCENT {
            return Ok(Decision {
                mode: AdvisoryMode::Energy,
                source: DecisionSource::BatteryOverride,
            });
        }
        if snap.speed_kmh > SPEED_LIMIT_KMH {
            return Ok(Decision {
                mode: AdvisoryMode::Safety,
                source: DecisionSource::SpeedOverride,
            });
        }

        let probs = self.model.infer(&snap.as_features())?;
        if probs.len() != AdvisoryMode::COUNT {
            return Err(AdvisorError::ModelOutput(format!(
                "expected {} class scores, got {}",
                AdvisoryMode::COUNT,
                probs.len()
            )));
        }
        if let Some(bad) = probs.iter().find(|p| !p.is_finite()) {
            return Err(AdvisorError::ModelOutput(format!("non-finite class score {}", bad)));
        }

        let idx = argmax(&probs).ok_or_else(|| AdvisorError::ModelOutput("empty output".into()))?;
        let mode = AdvisoryMode::from_index(idx)?;
        tracing::debug!(?probs, %mode, "classifier decision");

        Ok(Decision {
            mode,
            source: DecisionSource::Model { probabilities: probs },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixed(Vec<f32>);

    impl ClassifierModel for Fixed {
        fn infer(&self, _x: &[f32]) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    struct Counting {
        calls: Arc<AtomicUsize>,
    }

    impl ClassifierModel for Counting {
        fn infer(&self, _x: &[f32]) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0, 0.0, 0.0, 0.0])
        }
    }

    fn engine(out: &[f32]) -> AdvisoryEngine {
        AdvisoryEngine::new(Box::new(Fixed(out.to_vec())))
    }

    fn snap(speed: f32, outside: f32, cabin: f32, battery: f32) -> TelemetrySnapshot {
        TelemetrySnapshot::new(speed, outside, cabin, battery)
    }

    #[test]
    fn high_speed_overrides_model() {
        let calls = Arc::new(AtomicUsize::new(0));
        let eng = AdvisoryEngine::new(Box::new(Counting { calls: calls.clone() }));
        let d = eng.evaluate(&snap(140.0, 20.0, 22.0, 50.0)).unwrap();
        assert_eq!(d.mode, AdvisoryMode::Safety);
        assert_eq!(d.source, DecisionSource::SpeedOverride);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn low_battery_overrides_everything() {
        let eng = engine(&[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(eng.decide(&snap(60.0, 20.0, 22.0, 3.0)).unwrap(), AdvisoryMode::Energy);
        // beats the speed rule too
        let d = eng.evaluate(&snap(180.0, 20.0, 22.0, 4.9)).unwrap();
        assert_eq!(d.mode, AdvisoryMode::Energy);
        assert_eq!(d.source, DecisionSource::BatteryOverride);
    }

    #[test]
    fn thresholds_are_strict() {
        let eng = engine(&[1.0, 0.0, 0.0, 0.0]);
        // exactly 5% and exactly 130 km/h fall through to the model
        assert_eq!(eng.decide(&snap(130.0, 20.0, 22.0, 5.0)).unwrap(), AdvisoryMode::Normal);
        assert_eq!(eng.decide(&snap(130.1, 20.0, 22.0, 5.0)).unwrap(), AdvisoryMode::Safety);
    }

    #[test]
    fn model_argmax_selects_mode() {
        let eng = engine(&[0.1, 0.2, 0.3, 0.4]);
        let d = eng.evaluate(&snap(60.0, 20.0, 22.0, 50.0)).unwrap();
        assert_eq!(d.mode, AdvisoryMode::Energy);
        assert_eq!(d.source, DecisionSource::Model { probabilities: vec![0.1, 0.2, 0.3, 0.4] });

        let eng = engine(&[0.1, 0.7, 0.1, 0.1]);
        assert_eq!(eng.decide(&snap(60.0, 20.0, 22.0, 50.0)).unwrap(), AdvisoryMode::Comfort);
    }

    #[test]
    fn tie_resolves_to_lowest_index() {
        let eng = engine(&[0.25, 0.25, 0.25, 0.25]);
        assert_eq!(eng.decide(&snap(60.0, 20.0, 22.0, 50.0)).unwrap(), AdvisoryMode::Normal);
    }

    #[test]
    fn wrong_length_output_fails() {
        let eng = engine(&[0.1, 0.2, 0.3, 0.2, 0.2]);
        let err = eng.decide(&snap(60.0, 20.0, 22.0, 50.0)).unwrap_err();
        assert!(matches!(err, AdvisorError::ModelOutput(_)));
    }

    #[test]
    fn nan_output_fails() {
        let eng = engine(&[f32::NAN, 0.2, 0.3, 0.2]);
        assert!(eng.decide(&snap(60.0, 20.0, 22.0, 50.0)).is_err());
    }
}
