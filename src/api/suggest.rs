//! 建议相关端点：聊天建议、开场白、聊天分析

use axum::{extract::State, routing::post, Json, Router};
use std::sync::Arc;
use tracing::{info, warn};

use super::new_rid;
use crate::error::AppResult;
use crate::models::{AnalyzeChatRequest, OpenersRequest, SuggestRequest, SuggestResponse};
use crate::services::{PromptKind, SuggestionRequest};
use crate::state::AppState;

/// 聊天分析固定返回的跟进句数量
const FOLLOW_UP_COUNT: usize = 3;

async fn run_pipeline(
    state: &AppState,
    route: &str,
    request: SuggestionRequest,
    debug: bool,
) -> AppResult<Json<SuggestResponse>> {
    let rid = new_rid();
    info!(
        "[{}:{}] request: language={:?}, tone={:?}, count={}",
        route, rid, request.language, request.tone, request.count
    );

    match state.pipeline.run(request).await {
        Ok(outcome) => {
            info!(
                "[{}:{}] done: model={}, suggestions={}",
                route,
                rid,
                outcome.model,
                outcome.suggestions.len()
            );
            Ok(Json(SuggestResponse::new(rid, outcome, debug)))
        }
        Err(e) => {
            warn!("[{}:{}] failed: {}", route, rid, e);
            Err(e)
        }
    }
}

/// 针对聊天文本生成建议
async fn suggest(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SuggestRequest>,
) -> AppResult<Json<SuggestResponse>> {
    let request = SuggestionRequest {
        kind: PromptKind::Chat {
            input: req.input_text(),
        },
        tone: req.tone(),
        persona: req.persona.clone(),
        language: req.language.clone(),
        count: req.count,
        model: req.model.clone(),
    };
    run_pipeline(&state, "suggest", request, req.debug).await
}

/// 基于资料生成开场白
async fn openers(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OpenersRequest>,
) -> AppResult<Json<SuggestResponse>> {
    let request = SuggestionRequest {
        kind: PromptKind::Opener {
            name: req.name,
            interests: req.interests,
        },
        tone: req.tone,
        persona: req.persona.or_else(|| Some("classy".to_string())),
        language: req.language,
        count: req.count,
        model: req.model,
    };
    run_pipeline(&state, "openers", request, req.debug).await
}

/// 分析整段聊天，给出跟进句和教练提示
async fn analyze_chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnalyzeChatRequest>,
) -> AppResult<Json<SuggestResponse>> {
    let request = SuggestionRequest {
        kind: PromptKind::FollowUp {
            pasted_text: req.pasted_text,
        },
        tone: req.tone.or_else(|| Some("playful".to_string())),
        persona: req.coach_persona.or_else(|| Some("wing".to_string())),
        language: req.language,
        count: FOLLOW_UP_COUNT,
        model: req.model,
    };
    run_pipeline(&state, "analyze-chat", request, req.debug).await
}

/// 创建建议路由
pub fn suggest_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/suggest", post(suggest))
        .route("/api/openers", post(openers))
        .route("/api/analyze-chat", post(analyze_chat))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{app, post_json};
    use crate::llm::backend::testing::ScriptedBackend;
    use axum::http::StatusCode;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_suggest_without_credentials() {
        let (status, body) = post_json(
            app(None, None, 10),
            "/api/suggest",
            json!({"text": "hi", "flirtLevel": "flirt", "language": "pt-BR"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["model"], "dummy");
        assert_eq!(body["rid"].as_str().unwrap().len(), 8);
        assert_eq!(body["language"], "pt-br");
        assert_eq!(body["languageName"], "Portuguese (Brazil)");
        let suggestions = body["suggestions"].as_array().unwrap();
        assert_eq!(suggestions.len(), 5);
        assert!(suggestions.iter().all(|s| s["style"] == "flirty"));
        assert!(body.get("debug").is_none());
    }

    #[tokio::test]
    async fn test_suggest_missing_input() {
        let (status, body) =
            post_json(app(None, None, 10), "/api/suggest", json!({"input": "   "})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing_input");
    }

    #[tokio::test]
    async fn test_suggest_with_backend_and_debug() {
        let backend = Arc::new(ScriptedBackend::new().reply(
            r#"{"suggestions":[{"text":"Coffee or tea person?","style":"safe","why":"easy"},{"text":"Best concert you ever went to?","style":"safe"}]}"#,
        ));
        let (status, body) = post_json(
            app(Some(backend.clone()), None, 10),
            "/api/suggest",
            json!({"input": "hey", "count": 2, "debug": true}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["suggestions"][0]["why"], "easy");
        assert!(body["suggestions"][1].get("why").is_none());
        assert_eq!(body["debug"]["structured"], true);
        assert_eq!(body["debug"]["unique"], 2);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_backend_error_status_is_forwarded() {
        let backend = Arc::new(ScriptedBackend::new().fail(401, "bad key"));
        let (status, body) =
            post_json(app(Some(backend), None, 10), "/api/suggest", json!({"input": "hey"})).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "backend_error");
        assert_eq!(body["detail"], "bad key");
    }

    #[tokio::test]
    async fn test_openers_accept_empty_profile() {
        let (status, body) =
            post_json(app(None, None, 10), "/api/openers", json!({"language": "nl"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["suggestions"].as_array().unwrap().len(), 5);
        assert_eq!(body["languageName"], "Dutch");
    }

    #[tokio::test]
    async fn test_analyze_chat_returns_follow_ups_and_coach() {
        let (status, body) = post_json(
            app(None, None, 10),
            "/api/analyze-chat",
            json!({"pastedText": "A: hoi\nB: hey!", "language": "nl"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["suggestions"].as_array().unwrap().len(), 3);
        assert_eq!(body["coach"].as_array().unwrap().len(), 2);
        assert_eq!(body["suggestions"][0]["style"], "playful");

        let (status, body) =
            post_json(app(None, None, 10), "/api/analyze-chat", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing_input");
    }
}
