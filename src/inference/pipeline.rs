use crate::{
    image::ImagePreprocessor,
    inference::{ClassProbability, PredictionResult},
    models::ModelHandle,
    utils::error::ClassifierError,
    ClassLabels, Result,
};
use std::sync::Arc;
use std::time::Instant;

/// 分类流水线：预处理 → 模型推理 → 标签映射
pub struct Classifier {
    preprocessor: ImagePreprocessor,
    model: Arc<ModelHandle>,
    labels: ClassLabels,
}

impl Classifier {
    pub fn new(preprocessor: ImagePreprocessor, model: Arc<ModelHandle>, labels: ClassLabels) -> Self {
        Self {
            preprocessor,
            model,
            labels,
        }
    }

    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    pub fn model(&self) -> &Arc<ModelHandle> {
        &self.model
    }

    pub fn preprocessor(&self) -> &ImagePreprocessor {
        &self.preprocessor
    }

    /// 对单张图像分类
    ///
    /// 解码失败返回 `Decode`，不会触发模型加载。
    pub fn classify(&self, image_bytes: &[u8]) -> Result<PredictionResult> {
        let start = Instant::now();

        let tensor = self.preprocessor.preprocess(image_bytes)?;
        let preprocess_time = start.elapsed();

        let inference_start = Instant::now();
        let raw = self.model.predict(&tensor)?;
        let inference_time = inference_start.elapsed();

        let result = self.interpret(&raw)?;

        tracing::info!(
            "Classification completed: label={}, confidence={:.4}, preprocess={:.3}s, inference={:.3}s",
            result.predicted_label,
            result.confidence,
            preprocess_time.as_secs_f32(),
            inference_time.as_secs_f32()
        );

        Ok(result)
    }

    /// 将模型原始输出映射为带标签的概率分布
    ///
    /// 输出长度必须等于标签数；不做重新归一化。最大值并列时取下标最小者。
    pub fn interpret(&self, raw: &[f32]) -> Result<PredictionResult> {
        if raw.len() != self.labels.len() {
            return Err(ClassifierError::ShapeMismatch {
                expected: self.labels.len(),
                actual: raw.len(),
            });
        }

        let mut best_idx = 0;
        for (idx, &prob) in raw.iter().enumerate().skip(1) {
            let best = raw[best_idx];
            // NaN 不参与比较
            if prob > best || (best.is_nan() && !prob.is_nan()) {
                best_idx = idx;
            }
        }

        let distribution = self
            .labels
            .iter()
            .zip(raw)
            .map(|(label, &probability)| ClassProbability {
                label: label.clone(),
                probability,
            })
            .collect();

        Ok(PredictionResult {
            predicted_label: self.labels[best_idx].clone(),
            confidence: raw[best_idx],
            distribution,
        })
    }
}
