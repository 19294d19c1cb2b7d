use crate::image::ImageTensor;
use crate::models::Model;
use crate::utils::error::ClassifierError;
use crate::{Config, Result};
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use parking_lot::Mutex;

/// 基于 ONNX Runtime 的分类模型
///
/// `Session::run` 需要 `&mut self`，因此推理经过独立的会话锁串行执行，
/// 与 `ModelHandle` 的加载锁互不相关。
pub struct OnnxModel {
    session: Mutex<Session>,
    input_name: String,
    output_name: String, // 动态发现的输出名称
}

impl OnnxModel {
    pub fn load(config: &Config) -> Result<Self> {
        let model_path = config.model_path.as_path();

        if !model_path.exists() {
            return Err(ClassifierError::ModelLoad(format!(
                "Model file not found: {}",
                model_path.display()
            )));
        }

        tracing::info!("Loading classification model from: {}", model_path.display());

        let session = Session::builder()?
            .with_optimization_level(optimization_level(config.onnx_config.optimization_level))?
            .with_intra_threads(config.onnx_config.intra_threads)?
            .with_inter_threads(config.onnx_config.inter_threads)?
            .commit_from_file(model_path)
            .map_err(|e| {
                ClassifierError::ModelLoad(format!(
                    "Failed to create ONNX session from {}: {}",
                    model_path.display(),
                    e
                ))
            })?;

        let input_name = match session.inputs.first() {
            Some(input) => input.name.clone(),
            None => {
                return Err(ClassifierError::ModelLoad(
                    "Classification model has no inputs".to_string(),
                ))
            }
        };

        let output_name = match session.outputs.first() {
            Some(output) => output.name.clone(),
            None => {
                return Err(ClassifierError::ModelLoad(
                    "Classification model has no outputs".to_string(),
                ))
            }
        };

        tracing::info!(
            "Classification model io: input='{}', output='{}'",
            input_name,
            output_name
        );
        for (i, output) in session.outputs.iter().enumerate() {
            tracing::debug!("Classification output[{}]: '{}'", i, output.name);
        }

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }
}

impl Model for OnnxModel {
    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>> {
        let input_tensor = Tensor::from_array(input.view().to_owned())?;

        let mut session = self.session.lock();
        let outputs = session.run(inputs![self.input_name.as_str() => input_tensor])?;

        let output = match outputs.get(&self.output_name) {
            Some(output) => output,
            None => {
                let available: Vec<String> = outputs.keys().map(|s| s.to_string()).collect();
                return Err(ClassifierError::Inference(format!(
                    "Classification output '{}' not found. Available outputs: {:?}",
                    self.output_name, available
                )));
            }
        };

        let predictions = output.try_extract_array::<f32>()?;
        let shape = predictions.shape();
        // 期望 (1, num_classes) 或 (num_classes,)
        if shape.len() > 2 || (shape.len() == 2 && shape[0] != 1) {
            return Err(ClassifierError::Inference(format!(
                "Expected a single probability vector, got output shape {:?}",
                shape
            )));
        }

        Ok(predictions.iter().copied().collect())
    }
}

fn optimization_level(level: u8) -> GraphOptimizationLevel {
    match level {
        0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    }
}
