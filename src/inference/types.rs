use serde::Serialize;

/// 单个类别的概率
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassProbability {
    pub label: String,
    pub probability: f32,
}

/// 单次分类结果
///
/// `distribution` 按配置的标签顺序排列，长度与标签数一致。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub predicted_label: String,
    pub confidence: f32,
    pub distribution: Vec<ClassProbability>,
}

impl PredictionResult {
    /// 查询某个类别的概率
    pub fn probability(&self, label: &str) -> Option<f32> {
        self.distribution
            .iter()
            .find(|p| p.label == label)
            .map(|p| p.probability)
    }

    /// 按概率降序排列的分布（用于展示），概率相同时保持标签顺序
    pub fn ranked(&self) -> Vec<ClassProbability> {
        let mut ranked = self.distribution.clone();
        ranked.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        ranked
    }

    pub fn total_probability(&self) -> f32 {
        self.distribution.iter().map(|p| p.probability).sum()
    }
}

/// HTTP 层返回的分类结果
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    #[serde(flatten)]
    pub prediction: PredictionResult,
    /// 降序排列的分布
    pub ranked: Vec<ClassProbability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
    /// 预览用 data URI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    pub processing_time: f32,
}

impl PredictionResponse {
    pub fn new(prediction: PredictionResult, processing_time: f32) -> Self {
        Self {
            ranked: prediction.ranked(),
            prediction,
            image_name: None,
            image_data: None,
            processing_time,
        }
    }

    pub fn with_image(mut self, name: Option<String>, data_uri: String) -> Self {
        self.image_name = name;
        self.image_data = Some(data_uri);
        self
    }
}
