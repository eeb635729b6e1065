//! 健康检查端点

use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;

use crate::models::HealthResponse;
use crate::services::LangKey;
use crate::state::AppState;

/// 健康检查处理器（只报告凭据是否存在，不暴露取值）
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let config = &state.config;
    let suggest_provider = if config.has_backend() {
        format!("openai:{}", config.model)
    } else {
        "dummy".to_string()
    };

    Json(HealthResponse {
        ok: true,
        has_openai_key: config.has_backend(),
        has_ocr_key: config.has_ocr_engine(),
        model: config.model.clone(),
        vision_model: config.vision_model.clone(),
        suggest_provider,
        ocr_provider: state.ocr.routing(),
        default_language: state.pipeline.languages().default_language().code.clone(),
        supported_languages: LangKey::supported_codes(),
    })
}

/// 创建健康检查路由
pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/health", get(health_check))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{app, get_json};
    use crate::llm::backend::testing::ScriptedBackend;
    use axum::http::StatusCode;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_health_without_credentials() {
        let (status, body) = get_json(app(None, None, 10), "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["hasOpenaiKey"], false);
        assert_eq!(body["suggestProvider"], "dummy");
        assert_eq!(body["ocrProvider"], "none");
        assert_eq!(body["defaultLanguage"], "en");
        assert_eq!(body["supportedLanguages"].as_array().unwrap().len(), 15);
    }

    #[tokio::test]
    async fn test_health_with_backend() {
        let backend = Arc::new(ScriptedBackend::new());
        let (_, body) = get_json(app(Some(backend), None, 10), "/api/health").await;
        assert_eq!(body["hasOpenaiKey"], true);
        assert_eq!(body["suggestProvider"], "openai:gpt-4o-mini");
        assert_eq!(body["ocrProvider"], "openai-vision:gpt-4o-mini");
    }
}
