use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    /// 输入字节无法解码为图像
    #[error("Invalid image: {0}")]
    Decode(#[from] image::ImageError),

    /// 模型文件缺失/损坏/格式不兼容，或预热推理失败
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    /// 标签数量与模型输出维度不一致（配置错误，而非输入错误）
    #[error("Model output has {actual} classes but {expected} labels are configured")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File too large: {0} bytes, max allowed: {1} bytes")]
    FileTooLarge(usize, usize),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ClassifierError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ClassifierError::Decode(_) => StatusCode::BAD_REQUEST,
            ClassifierError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ClassifierError::Base64(_) => StatusCode::BAD_REQUEST,
            ClassifierError::FileTooLarge(_, _) => StatusCode::PAYLOAD_TOO_LARGE,
            ClassifierError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ClassifierError::ModelLoad(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ClassifierError::Decode(_) => "INVALID_IMAGE",
            ClassifierError::ModelLoad(_) => "MODEL_LOAD_ERROR",
            ClassifierError::ShapeMismatch { .. } => "SHAPE_MISMATCH",
            ClassifierError::Inference(_) => "INFERENCE_ERROR",
            ClassifierError::InvalidInput(_) => "INVALID_INPUT",
            ClassifierError::FileTooLarge(_, _) => "FILE_TOO_LARGE",
            ClassifierError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            ClassifierError::Config(_) => "CONFIG_ERROR",
            ClassifierError::Io(_) => "IO_ERROR",
            ClassifierError::Json(_) => "JSON_ERROR",
            ClassifierError::Base64(_) => "BASE64_DECODE_ERROR",
            ClassifierError::Ort(_) => "ORT_ERROR",
            ClassifierError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为用户输入问题（与服务端配置/模型问题区分）
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// 将加载阶段的任意错误统一归类为 `ModelLoad`
    pub(crate) fn into_model_load(self) -> Self {
        match self {
            ClassifierError::ModelLoad(_) => self,
            other => ClassifierError::ModelLoad(other.to_string()),
        }
    }
}

impl ClassifierError {
    /// 附带请求ID，用于生成带 `request_id` 的错误响应
    pub fn with_request_id(self, request_id: impl Into<String>) -> RequestError {
        RequestError {
            error: self,
            request_id: Some(request_id.into()),
        }
    }

    fn into_error_response(self, request_id: Option<String>) -> Response {
        let status = self.status_code();
        let error_response = serde_json::json!({
            "success": false,
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            },
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "request_id": request_id.as_deref(),
        });

        if self.is_client_error() {
            tracing::warn!("Request rejected: {} ({}), request_id={:?}", self, status, request_id);
        } else {
            tracing::error!("Request failed: {} ({}), request_id={:?}", self, status, request_id);
        }

        (status, axum::Json(error_response)).into_response()
    }
}

/// 处理器返回的错误：`ClassifierError` + 请求ID
#[derive(Debug)]
pub struct RequestError {
    pub error: ClassifierError,
    pub request_id: Option<String>,
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        self.error.into_error_response(self.request_id)
    }
}

impl IntoResponse for ClassifierError {
    fn into_response(self) -> Response {
        self.into_error_response(None)
    }
}
