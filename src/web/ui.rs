use axum::response::{Html, IntoResponse};

/// 首页处理器：上传表单，结果由页面脚本调用 `/predict` 后渲染
pub async fn index_handler() -> impl IntoResponse {
    Html(include_str!("../../templates/index.html"))
}
