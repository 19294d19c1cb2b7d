use crate::{
    image::ImageLoader,
    inference::{Classifier, PredictionResponse, PredictionResult},
    utils::error::{ClassifierError, RequestError},
    web::{extractors::RequestId, AppState},
    Result,
};
use axum::{
    body::Bytes,
    extract::{Multipart, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// JSON请求体（base64模式）
#[derive(Debug, Deserialize)]
pub struct PredictJsonRequest {
    /// Base64编码的图像数据（可带 data URI 前缀）
    pub image: String,

    /// 原始文件名，仅用于回显
    #[serde(default)]
    pub image_name: Option<String>,

    /// 是否在响应中回传预览图
    #[serde(default)]
    pub include_preview: bool,
}

/// 成功响应格式（失败响应由 `ClassifierError` 的 `IntoResponse` 生成）
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: String,
    pub request_id: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T, request_id: String) -> Self {
        Self {
            success: true,
            data,
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id,
        }
    }
}

/// 在阻塞线程池中执行分类，避免首次加载模型或推理阻塞异步运行时
async fn classify_blocking(classifier: Arc<Classifier>, bytes: Bytes) -> Result<PredictionResult> {
    tokio::task::spawn_blocking(move || classifier.classify(&bytes))
        .await
        .map_err(|e| ClassifierError::Internal(format!("Classification task failed: {}", e)))?
}

/// Multipart文件上传处理器（表单字段 `image`）
pub async fn predict_upload_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    multipart: Multipart,
) -> std::result::Result<Json<ApiResponse<PredictionResponse>>, RequestError> {
    match predict_upload(&state, &request_id, multipart).await {
        Ok(response) => Ok(Json(ApiResponse::success(response, request_id))),
        Err(e) => Err(e.with_request_id(request_id)),
    }
}

async fn predict_upload(
    state: &AppState,
    request_id: &str,
    mut multipart: Multipart,
) -> Result<PredictionResponse> {
    let start_time = Instant::now();
    let max_size = state.config.server_config.max_request_size;

    tracing::info!("Processing upload request: request_id={}", request_id);

    let mut upload: Option<(Option<String>, Bytes)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ClassifierError::InvalidInput(format!("Failed to read multipart field: {}", e))
    })? {
        let field_name = field.name().unwrap_or("unknown").to_string();

        if field_name != "image" {
            tracing::debug!("Ignoring unknown field: {}", field_name);
            continue;
        }

        let file_name = field.file_name().map(|s| s.to_string());

        if let Some(ref name) = file_name {
            if !state.config.is_allowed_extension(name) {
                return Err(ClassifierError::UnsupportedFormat(format!(
                    "Invalid file type '{}'. Allowed types: {}",
                    name,
                    state.config.server_config.allowed_extensions.join(", ")
                )));
            }
        }

        if let Some(content_type) = field.content_type() {
            if !content_type.starts_with("image/") {
                return Err(ClassifierError::UnsupportedFormat(content_type.to_string()));
            }
        }

        let data = field.bytes().await.map_err(|e| {
            ClassifierError::InvalidInput(format!("Failed to read file data: {}", e))
        })?;
        ImageLoader::check_size(&data, max_size)?;

        // 扩展名可以伪造，按文件头再校验一次；无法识别的交给解码阶段报 Decode
        if let Some(format) = ImageLoader::detect_format(&data) {
            if !ImageLoader::is_supported_format(format) {
                return Err(ClassifierError::UnsupportedFormat(format!("{:?}", format)));
            }
        }

        tracing::debug!("Received file: {:?}, {} bytes", file_name, data.len());
        upload = Some((file_name, data));
    }

    let (file_name, image_data) = upload
        .ok_or_else(|| ClassifierError::InvalidInput("Please select an image file".to_string()))?;

    let preview = ImageLoader::to_data_uri(&image_data);
    let prediction = classify_blocking(Arc::clone(&state.classifier), image_data).await?;

    let processing_time = start_time.elapsed();
    tracing::info!(
        "Upload classification completed: request_id={}, label={}, time={:.3}s",
        request_id,
        prediction.predicted_label,
        processing_time.as_secs_f32()
    );

    Ok(PredictionResponse::new(prediction, processing_time.as_secs_f32())
        .with_image(file_name, preview))
}

/// JSON base64上传处理器
pub async fn predict_json_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    Json(request): Json<PredictJsonRequest>,
) -> std::result::Result<Json<ApiResponse<PredictionResponse>>, RequestError> {
    match predict_json(&state, &request_id, request).await {
        Ok(response) => Ok(Json(ApiResponse::success(response, request_id))),
        Err(e) => Err(e.with_request_id(request_id)),
    }
}

async fn predict_json(
    state: &AppState,
    request_id: &str,
    request: PredictJsonRequest,
) -> Result<PredictionResponse> {
    let start_time = Instant::now();

    tracing::info!(
        "Processing JSON request: request_id={}, image_name={:?}",
        request_id,
        request.image_name
    );

    if request.image.trim().is_empty() {
        return Err(ClassifierError::InvalidInput("Empty image data".to_string()));
    }

    let image_data = Bytes::from(ImageLoader::from_base64(
        &request.image,
        state.config.server_config.max_request_size,
    )?);

    let preview = request
        .include_preview
        .then(|| ImageLoader::to_data_uri(&image_data));
    let prediction = classify_blocking(Arc::clone(&state.classifier), image_data).await?;

    let processing_time = start_time.elapsed();
    tracing::info!(
        "JSON classification completed: request_id={}, label={}, time={:.3}s",
        request_id,
        prediction.predicted_label,
        processing_time.as_secs_f32()
    );

    let mut response = PredictionResponse::new(prediction, processing_time.as_secs_f32());
    if let Some(preview) = preview {
        response = response.with_image(request.image_name, preview);
    }
    Ok(response)
}
