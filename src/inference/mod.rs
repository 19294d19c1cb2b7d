pub mod pipeline;
pub mod types;

pub use pipeline::Classifier;
pub use types::{ClassProbability, PredictionResponse, PredictionResult};
