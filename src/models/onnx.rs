//! ONNX Runtime backend for gradient-boosted models exported to ONNX

use crate::models::inference::FraudModel;
use anyhow::{anyhow, Context, Result};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Once;
use tracing::{debug, info};

static ORT_INIT: Once = Once::new();

/// Loaded ONNX session with its input/output names
pub struct OnnxModel {
    /// Sessions need exclusive access to run
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    num_features: usize,
}

impl OnnxModel {
    /// Load an ONNX model from file
    pub fn load(path: &Path, num_features: usize, onnx_threads: usize) -> Result<Self> {
        ORT_INIT.call_once(|| {
            let _ = ort::init().commit();
            info!("ONNX Runtime initialized");
        });

        info!(path = %path.display(), threads = onnx_threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(onnx_threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {:?}", path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "probabilities".to_string());

        info!(input = %input_name, output = %output_name, "ONNX model loaded");

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            num_features,
        })
    }

    /// Extract fraud probability from model output.
    ///
    /// Handles tensor outputs (XGBoost, sklearn forests) and `seq(map)`
    /// outputs (LightGBM, CatBoost converters).
    fn extract_probability(&self, outputs: &SessionOutputs) -> Result<f64> {
        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| anyhow!("output `{}` missing", self.output_name))?;

        if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let dims: Vec<i64> = shape.iter().copied().collect();
            let classes = dims.last().copied().unwrap_or(1);
            let prob = match (classes, data) {
                (c, [_, fraud, ..]) if c >= 2 => *fraud,
                (_, [single, ..]) => *single,
                _ => return Err(anyhow!("empty probability tensor")),
            };
            debug!(prob = prob, "Extracted from tensor");
            return Ok(prob as f64);
        }

        if DynSequenceValueType::can_downcast(&output.dtype()) {
            return extract_from_sequence_map(output);
        }

        Err(anyhow!(
            "output `{}` is neither a tensor nor seq(map)",
            self.output_name
        ))
    }
}

/// Probability of class 1 from `seq(map(int64, float))`
fn extract_from_sequence_map(output: &DynValue) -> Result<f64> {
    let allocator = Allocator::default();

    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| anyhow!("Failed to downcast to sequence: {}", e))?;
    let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;
    let first = maps.first().ok_or_else(|| anyhow!("Empty sequence"))?;

    let pairs = first.try_extract_key_values::<i64, f32>()?;
    pairs
        .iter()
        .find(|(class_id, _)| *class_id == 1)
        .map(|(_, prob)| *prob as f64)
        .ok_or_else(|| anyhow!("No fraud-class probability in map"))
}

impl FraudModel for OnnxModel {
    fn predict_proba(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.num_features {
            return Err(anyhow!(
                "expected {} features, got {}",
                self.num_features,
                features.len()
            ));
        }

        let input: Vec<f32> = features.iter().map(|&v| v as f32).collect();
        let shape = vec![1_i64, input.len() as i64];
        let tensor = Tensor::from_array((shape, input)).context("Failed to create input tensor")?;

        let mut session = self.session.lock();
        let outputs = session.run(ort::inputs![self.input_name.as_str() => tensor])?;
        self.extract_probability(&outputs)
    }

    fn feature_count(&self) -> usize {
        self.num_features
    }

    fn backend(&self) -> &'static str {
        "onnx"
    }
}
