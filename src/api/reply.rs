//! 回复端点：文本或截图 → 最后一个问题的回复选项

use axum::{extract::State, routing::post, Json, Router};
use std::sync::Arc;
use tracing::{info, warn};

use super::new_rid;
use crate::error::{AppError, AppResult};
use crate::models::{OcrResponse, ReplyApiRequest, ReplyResponse};
use crate::services::{ReplyBundle, ReplyRequest};
use crate::state::AppState;

/// OCR 没有识别出文字时使用的模型标识
const NO_TEXT_MODEL: &str = "none";

async fn reply(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReplyApiRequest>,
) -> AppResult<Json<ReplyResponse>> {
    let rid = new_rid();
    let text = req.text.as_deref().map(str::trim).unwrap_or_default().to_string();
    let image = req.image_field();

    let (ocr, text) = if !text.is_empty() {
        (None, text)
    } else if !image.is_empty() {
        let language = state.replies.resolve_language(req.language.as_deref());
        info!("[reply:{}] running OCR first", rid);
        let outcome = state.ocr.resolve(&image, &language).await.map_err(|e| {
            warn!("[reply:{}] OCR failed: {}", rid, e);
            e
        })?;
        let text = outcome.text.clone();
        (Some(OcrResponse::new(outcome, req.debug)), text)
    } else {
        return Err(AppError::MissingInput(
            "Provide 'text' or 'imageBase64' (or 'image')".to_string(),
        ));
    };

    if text.is_empty() {
        info!("[reply:{}] no text recognised, returning OCR result only", rid);
        return Ok(Json(ReplyResponse {
            ocr,
            bundle: ReplyBundle::default(),
            model: NO_TEXT_MODEL.to_string(),
        }));
    }

    let outcome = state
        .replies
        .generate(ReplyRequest {
            text,
            tone: req.tone,
            persona: req.persona,
            language: req.language,
            model: req.model,
        })
        .await
        .map_err(|e| {
            warn!("[reply:{}] failed: {}", rid, e);
            e
        })?;

    info!("[reply:{}] done: model={}", rid, outcome.model);
    Ok(Json(ReplyResponse {
        ocr,
        bundle: outcome.bundle,
        model: outcome.model,
    }))
}

/// 创建回复路由
pub fn reply_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/reply", post(reply))
}
