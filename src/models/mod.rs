pub mod handle;
pub mod onnx;

pub use handle::{LoadState, ModelHandle};
pub use onnx::OnnxModel;

use crate::image::ImageTensor;
use crate::{Config, Result};

/// 已加载、可推理的分类模型
///
/// 输出为按训练类别顺序排列的概率向量（模型末层已做 softmax）。
pub trait Model: Send + Sync {
    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>>;
}

/// 基于配置构造 ONNX 模型句柄（尚未加载）
pub fn onnx_handle(config: &Config) -> ModelHandle {
    let load_config = config.clone();
    let side = config.input_size as usize;
    ModelHandle::new(move || OnnxModel::load(&load_config), (side, side))
}
