use serde::Deserialize;
use std::{fs, path::Path};

use crate::config::{AdvisorConfig, ModelKind};
use crate::error::{AdvisorError, Result};
use crate::types::AdvisoryMode;

/// Number of telemetry features the classifier consumes.
pub const IN_DIM: usize = 4;

/// A pre-trained 4-feature -> 4-class probability model, loaded once and
/// read-only afterwards.
pub trait ClassifierModel: Send + Sync {
    fn infer(&self, x: &[f32]) -> Result<Vec<f32>>;
}

/// Index of the largest value. Ties go to the lowest index.
pub fn argmax(probs: &[f32]) -> Option<usize> {
    let (&first, rest) = probs.split_first()?;
    let mut max_idx = 0;
    let mut max_val = first;
    for (i, &p) in rest.iter().enumerate() {
        if p > max_val {
            max_val = p;
            max_idx = i + 1;
        }
    }
    Some(max_idx)
}

// ---------- Dense network ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Softmax,
    Linear,
}

#[derive(Debug, Deserialize)]
struct LayerJson {
    weights: Vec<Vec<f32>>, // [out][in]
    bias: Vec<f32>,
    activation: Activation,
}

#[derive(Debug, Deserialize)]
struct DenseJson {
    input_dim: usize,
    layers: Vec<LayerJson>,
}

#[derive(Debug)]
struct Layer {
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
    activation: Activation,
}

impl Layer {
    fn forward(&self, x: &[f32]) -> Vec<f32> {
        let mut out: Vec<f32> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(x).map(|(w, v)| w * v).sum::<f32>() + b)
            .collect();

        match self.activation {
            Activation::Relu => out.iter_mut().for_each(|v| *v = v.max(0.0)),
            Activation::Softmax => softmax_in_place(&mut out),
            Activation::Linear => {}
        }
        out
    }
}

fn softmax_in_place(v: &mut [f32]) {
    let m = v.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for x in v.iter_mut() {
        *x = (*x - m).exp();
        sum += *x;
    }
    if sum > 0.0 {
        v.iter_mut().for_each(|x| *x /= sum);
    }
}

/// Feed-forward classifier read from a JSON weight artifact.
#[derive(Debug)]
pub struct DenseModel {
    input_dim: usize,
    layers: Vec<Layer>,
}

impl DenseModel {
    pub fn load(path: &str) -> Result<Self> {
        let txt = fs::read_to_string(Path::new(path)).map_err(|e| AdvisorError::ModelLoad {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        let mdl = Self::from_json(&txt).map_err(|e| match e {
            AdvisorError::Decode(e) => AdvisorError::ModelLoad {
                path: path.to_string(),
                reason: e.to_string(),
            },
            other => other,
        })?;
        tracing::info!(path, layers = mdl.layers.len(), "loaded dense classifier");
        Ok(mdl)
    }

    pub fn from_json(txt: &str) -> Result<Self> {
        let raw: DenseJson = serde_json::from_str(txt)?;
        if raw.input_dim != IN_DIM {
            return Err(AdvisorError::ModelShape(format!(
                "input_dim is {}, expected {}",
                raw.input_dim, IN_DIM
            )));
        }
        if raw.layers.is_empty() {
            return Err(AdvisorError::ModelShape("model has no layers".into()));
        }

        // Layer dimensions must chain from input_dim to the class count
        let mut dim = raw.input_dim;
        let mut layers = Vec::with_capacity(raw.layers.len());
        for (i, l) in raw.layers.into_iter().enumerate() {
            if l.weights.is_empty() || l.weights.len() != l.bias.len() {
                return Err(AdvisorError::ModelShape(format!(
                    "layer {}: {} weight rows but {} biases",
                    i,
                    l.weights.len(),
                    l.bias.len()
                )));
            }
            if let Some(row) = l.weights.iter().find(|r| r.len() != dim) {
                return Err(AdvisorError::ModelShape(format!(
                    "layer {}: row width {} does not match incoming dim {}",
                    i,
                    row.len(),
                    dim
                )));
            }
            dim = l.weights.len();
            layers.push(Layer {
                weights: l.weights,
                bias: l.bias,
                activation: l.activation,
            });
        }
        if dim != AdvisoryMode::COUNT {
            return Err(AdvisorError::ModelShape(format!(
                "output dim is {}, expected {}",
                dim,
                AdvisoryMode::COUNT
            )));
        }

        Ok(Self {
            input_dim: raw.input_dim,
            layers,
        })
    }
}

impl ClassifierModel for DenseModel {
    fn infer(&self, x: &[f32]) -> Result<Vec<f32>> {
        if x.len() != self.input_dim {
            return Err(AdvisorError::ModelShape(format!(
                "feature length mismatch: got {}, expected {}",
                x.len(),
                self.input_dim
            )));
        }
        let mut act = x.to_vec();
        for layer in &self.layers {
            act = layer.forward(&act);
        }
        Ok(act)
    }
}

// ---------- Labelling rules ----------

/// The hand-written labelling rules the classifier was trained to imitate,
/// emitted as a one-hot vector. Priority: safety > energy > comfort > normal.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleModel;

impl RuleModel {
    pub const SPEED_HIGH_KMH: f32 = 120.0;
    pub const BATTERY_LOW_PERCENT: f32 = 20.0;
    pub const CABIN_HOT_C: f32 = 30.0;
    pub const CABIN_COLD_C: f32 = 18.0;

    pub fn label(x: &[f32; IN_DIM]) -> AdvisoryMode {
        let [speed, _outside, cabin, battery] = *x;
        if speed > Self::SPEED_HIGH_KMH {
            AdvisoryMode::Safety
        } else if battery < Self::BATTERY_LOW_PERCENT {
            AdvisoryMode::Energy
        } else if cabin > Self::CABIN_HOT_C || cabin < Self::CABIN_COLD_C {
            AdvisoryMode::Comfort
        } else {
            AdvisoryMode::Normal
        }
    }
}

impl ClassifierModel for RuleModel {
    fn infer(&self, x: &[f32]) -> Result<Vec<f32>> {
        let x: &[f32; IN_DIM] = x.try_into().map_err(|_| {
            AdvisorError::ModelShape(format!("feature length mismatch: got {}, expected {}", x.len(), IN_DIM))
        })?;
        let mut out = vec![0.0; AdvisoryMode::COUNT];
        out[Self::label(x).index()] = 1.0;
        Ok(out)
    }
}

// ---------- Startup loading ----------

/// Load the configured classifier and run one warmup forward. Any failure
/// here is fatal for the caller.
pub fn load_classifier(cfg: &AdvisorConfig) -> Result<Box<dyn ClassifierModel>> {
    let path = cfg.model_path();
    let path = path.to_string_lossy();

    let mdl: Box<dyn ClassifierModel> = match cfg.model.kind {
        ModelKind::Dense => Box::new(DenseModel::load(&path)?),
        ModelKind::Rules => Box::new(RuleModel),
        #[cfg(feature = "torch")]
        ModelKind::Torch => Box::new(TorchModel::load(&path)?),
        #[cfg(not(feature = "torch"))]
        ModelKind::Torch => {
            return Err(AdvisorError::Config(
                "model kind \"torch\" needs a build with the `torch` feature".into(),
            ))
        }
    };

    let warm = mdl.infer(&[0.0; IN_DIM])?;
    if warm.len() != AdvisoryMode::COUNT {
        return Err(AdvisorError::ModelShape(format!(
            "warmup produced {} outputs, expected {}",
            warm.len(),
            AdvisoryMode::COUNT
        )));
    }
    tracing::info!(kind = ?cfg.model.kind, "warmup forward ok");
    Ok(mdl)
}

// ---------- TorchScript ----------

#[cfg(feature = "torch")]
pub use torch::TorchModel;

#[cfg(feature = "torch")]
mod torch {
    use tch::{kind::Kind, CModule, Device, Tensor};

    use super::{ClassifierModel, IN_DIM};
    use crate::error::{AdvisorError, Result};
    use crate::types::AdvisoryMode;

    pub struct TorchModel {
        model: CModule,
        device: Device,
    }

    impl TorchModel {
        pub fn load(path: &str) -> Result<Self> {
            let device = Device::Cpu;
            let model = CModule::load_on_device(path, device).map_err(|e| AdvisorError::ModelLoad {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

            // Probe output shape with a dummy forward, expect [1, 4]
            let dummy = Tensor::zeros([1, IN_DIM as i64], (Kind::Float, device));
            let t = model
                .forward_ts(&[dummy])
                .map_err(|e| AdvisorError::ModelShape(e.to_string()))?;
            let sz = t.size();
            if sz != [1, AdvisoryMode::COUNT as i64] {
                return Err(AdvisorError::ModelShape(format!("unexpected model output size: {:?}", sz)));
            }
            tracing::info!(path, "loaded TorchScript classifier");
            Ok(Self { model, device })
        }
    }

    impl ClassifierModel for TorchModel {
        fn infer(&self, x: &[f32]) -> Result<Vec<f32>> {
            let input = Tensor::from_slice(x)
                .reshape([1, x.len() as i64])
                .to_device(self.device);
            let t = self
                .model
                .forward_ts(&[input])
                .map_err(|e| AdvisorError::ModelOutput(e.to_string()))?;
            let flat = t.reshape([-1]).to_kind(Kind::Float);
            Vec::<f32>::try_from(&flat).map_err(|e| AdvisorError::ModelOutput(e.to_string()))
        }
    }
}
