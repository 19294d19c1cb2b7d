pub mod config;
pub mod models;
pub mod image;
pub mod inference;
pub mod web;
pub mod utils;

// 重新导出主要类型
pub use config::{ClassLabels, Config};
pub use inference::{Classifier, PredictionResult};
pub use models::{Model, ModelHandle};
pub use utils::error::ClassifierError;

pub type Result<T> = std::result::Result<T, ClassifierError>;
