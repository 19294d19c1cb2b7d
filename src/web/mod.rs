pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod ui;

use crate::{
    image::ImagePreprocessor,
    inference::Classifier,
    models::{self, ModelHandle},
    utils::error::ClassifierError,
    Config, Result,
};
use axum::{
    extract::{DefaultBodyLimit, State},
    middleware::from_fn,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer};

/// multipart 边界、表单字段等额外开销
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub classifier: Arc<Classifier>,
}

impl AppState {
    /// 构造状态；模型此时不加载，首个请求时懒加载
    pub fn new(config: Config) -> Self {
        let handle = Arc::new(models::onnx_handle(&config));
        Self::with_model(config, handle)
    }

    pub fn with_model(config: Config, model: Arc<ModelHandle>) -> Self {
        let classifier = Classifier::new(
            ImagePreprocessor::new(config.input_size),
            model,
            config.labels.clone(),
        );
        Self {
            config,
            classifier: Arc::new(classifier),
        }
    }
}

pub async fn serve(config: Config) -> Result<()> {
    let state = AppState::new(config.clone());
    let app = create_app(state);

    // 解析绑定地址
    let addr: SocketAddr = config.bind_addr.parse().map_err(|e| {
        ClassifierError::Config(format!("Invalid bind address {}: {}", config.bind_addr, e))
    })?;

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("Model will be loaded on first request: {}", config.model_path.display());
    tracing::info!("Labels: {:?}", config.labels.as_slice());
    tracing::info!("API endpoints:");
    tracing::info!("  POST /predict     - Multipart file upload");
    tracing::info!("  POST /api/predict - JSON base64 upload");
    tracing::info!("  GET  /            - Web UI");
    tracing::info!("  GET  /health      - Health check");
    tracing::info!("  GET  /api/info    - Service information");

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        ClassifierError::Internal(format!("Failed to bind to address {}: {}", addr, e))
    })?;

    axum::serve(listener, app)
        .await
        .map_err(|e| ClassifierError::Internal(format!("Server failed to start: {}", e)))?;

    Ok(())
}

pub fn create_app(state: AppState) -> Router {
    let server_config = state.config.server_config.clone();

    Router::new()
        // 分类API路由
        .route("/predict", post(handlers::predict_upload_handler))
        .route("/api/predict", post(handlers::predict_json_handler))
        // Web UI路由
        .route("/", get(ui::index_handler))
        // 系统路由
        .route("/health", get(health_handler))
        .route("/api/info", get(info_handler))
        .layer(from_fn(middleware::request_logging))
        .layer(from_fn(middleware::security_headers))
        // 上传大小由 RequestBodyLimitLayer 统一限制
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(
            server_config.max_request_size * 4 / 3 + MULTIPART_OVERHEAD, // base64 膨胀
        ))
        .layer(TimeoutLayer::new(Duration::from_secs(server_config.request_timeout)))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// 健康检查端点
async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "model_state": state.classifier.model().state(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// 服务信息端点
async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let config = &state.config;
    let classifier = &state.classifier;
    let model = classifier.model();
    let (height, width) = classifier.preprocessor().input_shape();

    Json(json!({
        "service": "Brain Tumor Classifier",
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "labels": classifier.labels().as_slice(),
        "input_size": [height, width],
        "model": {
            "path": config.model_path.display().to_string(),
            "state": model.state(),
            "load_attempts": model.load_attempts(),
            "intra_threads": config.onnx_config.intra_threads,
            "optimization_level": config.onnx_config.optimization_level,
        },
        "upload": {
            "max_size": config.server_config.max_request_size,
            "allowed_extensions": config.server_config.allowed_extensions,
        }
    }))
}
