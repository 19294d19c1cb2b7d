use anyhow::{bail, Result};
use std::collections::HashSet;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;

/// 训练时的类别顺序（与模型输出下标一一对应）
pub const DEFAULT_LABELS: [&str; 4] = ["glioma", "meningioma", "notumor", "pituitary"];

/// 模型输入边长（VGG16: 224x224）
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// 有序、不可变的类别标签序列
///
/// 位置 `i` 永远对应模型输出向量的第 `i` 个值。进程启动时构造一次，之后只读共享。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLabels(Arc<[String]>);

impl ClassLabels {
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels
            .into_iter()
            .map(|s| s.into().trim().to_string())
            .collect();

        if labels.is_empty() {
            bail!("Label sequence must not be empty");
        }
        if let Some(blank) = labels.iter().position(|l| l.is_empty()) {
            bail!("Label at position {} is empty", blank);
        }

        let mut seen = HashSet::with_capacity(labels.len());
        for label in &labels {
            if !seen.insert(label.as_str()) {
                bail!("Duplicate label '{}' in label sequence", label);
            }
        }

        Ok(Self(labels.into()))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl Default for ClassLabels {
    fn default() -> Self {
        Self(DEFAULT_LABELS.iter().map(|s| s.to_string()).collect())
    }
}

impl Deref for ClassLabels {
    type Target = [String];

    fn deref(&self) -> &[String] {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// 服务器绑定地址
    pub bind_addr: String,

    /// ONNX模型文件路径
    pub model_path: PathBuf,

    /// 类别标签（顺序即训练顺序）
    pub labels: ClassLabels,

    /// 模型输入尺寸（正方形边长）
    pub input_size: u32,

    /// 工作线程数量
    pub workers: usize,

    /// 开发模式
    pub dev_mode: bool,

    /// ONNX Runtime配置
    pub onnx_config: OnnxConfig,

    /// 服务器配置
    pub server_config: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// 算子内线程数
    pub intra_threads: usize,

    /// 算子间线程数
    pub inter_threads: usize,

    /// 图优化级别 (0-3)
    pub optimization_level: u8,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 请求超时时间（秒）
    pub request_timeout: u64,

    /// 最大上传文件大小（字节）
    pub max_request_size: usize,

    /// 允许上传的文件扩展名
    pub allowed_extensions: Vec<String>,
}

impl Config {
    pub fn new(
        bind_addr: String,
        model_path: String,
        labels: ClassLabels,
        workers: Option<usize>,
        intra_threads: Option<usize>,
        dev_mode: bool,
    ) -> Result<Self> {
        let cpu_cores = num_cpus::get();
        let workers = workers.unwrap_or(cpu_cores);
        if workers == 0 {
            bail!("Worker count must be at least 1");
        }

        let onnx_config = OnnxConfig {
            intra_threads: intra_threads.unwrap_or((cpu_cores * 3 / 4).max(1)), // 默认使用75%的CPU核心
            inter_threads: 1,
            optimization_level: 3,
        };

        let server_config = ServerConfig {
            request_timeout: if dev_mode { 300 } else { 60 }, // 首次加载模型可能较慢
            max_request_size: 10 * 1024 * 1024, // 10MB
            allowed_extensions: [".jpg", ".jpeg", ".png", ".bmp", ".gif"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };

        Ok(Self {
            bind_addr,
            model_path: PathBuf::from(model_path),
            labels,
            input_size: DEFAULT_INPUT_SIZE,
            workers,
            dev_mode,
            onnx_config,
            server_config,
        })
    }

    /// 检查文件名扩展名是否在允许列表中（大小写不敏感）
    pub fn is_allowed_extension(&self, file_name: &str) -> bool {
        let ext = match file_name.rfind('.') {
            Some(idx) => file_name[idx..].to_lowercase(),
            None => return false,
        };
        self.server_config
            .allowed_extensions
            .iter()
            .any(|allowed| *allowed == ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config::new(
            "127.0.0.1:0".to_string(),
            "models/model.onnx".to_string(),
            ClassLabels::default(),
            Some(2),
            Some(1),
            false,
        )
        .unwrap()
    }

    #[test]
    fn test_default_labels_keep_training_order() {
        let labels = ClassLabels::default();
        assert_eq!(
            labels.as_slice(),
            &["glioma", "meningioma", "notumor", "pituitary"]
        );
        assert_eq!(labels.len(), 4);
    }

    #[test]
    fn test_labels_reject_empty_and_duplicates() {
        assert!(ClassLabels::new(Vec::<String>::new()).is_err());
        assert!(ClassLabels::new(["glioma", "glioma"]).is_err());
        assert!(ClassLabels::new(["glioma", " "]).is_err());
        assert!(ClassLabels::new(["a", "b", "c"]).is_ok());
    }

    #[test]
    fn test_config_defaults() {
        let config = test_config();
        assert_eq!(config.input_size, 224);
        assert_eq!(config.workers, 2);
        assert_eq!(config.onnx_config.intra_threads, 1);
        assert_eq!(config.server_config.max_request_size, 10 * 1024 * 1024);
    }

    #[test]
    fn test_allowed_extensions() {
        let config = test_config();
        assert!(config.is_allowed_extension("scan.JPG"));
        assert!(config.is_allowed_extension("brain.mri.png"));
        assert!(!config.is_allowed_extension("notes.txt"));
        assert!(!config.is_allowed_extension("no_extension"));
    }
}
