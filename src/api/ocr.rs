//! OCR 端点

use axum::{extract::State, routing::post, Json, Router};
use std::sync::Arc;
use tracing::{info, warn};

use super::new_rid;
use crate::error::AppResult;
use crate::models::{OcrRequest, OcrResponse};
use crate::state::AppState;

/// 识别截图中的聊天文字
async fn ocr(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OcrRequest>,
) -> AppResult<Json<OcrResponse>> {
    let rid = new_rid();
    let language = state.replies.resolve_language(req.language.as_deref());
    info!("[ocr:{}] request: language={}", rid, language.code);

    let outcome = state
        .ocr
        .resolve(&req.image_field(), &language)
        .await
        .map_err(|e| {
            warn!("[ocr:{}] failed: {}", rid, e);
            e
        })?;

    info!("[ocr:{}] done: provider={:?}", rid, outcome.provider);
    Ok(Json(OcrResponse::new(outcome, req.debug)))
}

/// 创建 OCR 路由
pub fn ocr_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/ocr", post(ocr))
}
