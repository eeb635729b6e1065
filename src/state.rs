//! 应用状态管理
//!
//! 定义在请求处理器之间共享的状态。所有服务都在启动时根据同一份配置构建一次。

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::llm::LlmClient;
use crate::services::{
    GenerationClient, OcrEngine, OcrResolver, OcrSpaceEngine, ReplyGenerator, SuggestionPipeline,
    VisionOcr,
};
use crate::utils::rate_limiter::RateLimiter;
use crate::utils::request_logger::RequestLogger;

/// 应用共享状态
///
/// 使用 Arc 包裹以便在多个处理器之间安全共享
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: SuggestionPipeline,
    pub replies: ReplyGenerator,
    pub ocr: OcrResolver,
    pub rate_limiter: Arc<dyn RateLimiter>,
}

impl AppState {
    /// 根据配置构建全部服务
    pub fn from_config(
        config: Arc<AppConfig>,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Result<Self, AppError> {
        let generation = build_generation(&config)?;

        let engine: Option<Arc<dyn OcrEngine>> = if config.has_ocr_engine() {
            let engine = OcrSpaceEngine::new(
                &config.ocr_api_key,
                &config.ocr_endpoint,
                Duration::from_secs(config.request_timeout_secs),
            )
            .map_err(|e| AppError::Config(format!("failed to build OCR client: {}", e)))?;
            Some(Arc::new(engine))
        } else {
            info!("OCR engine disabled (no key configured)");
            None
        };

        Ok(Self::with_services(config, generation, engine, rate_limiter))
    }

    /// 使用给定的后端组装状态
    pub fn with_services(
        config: Arc<AppConfig>,
        generation: Option<GenerationClient>,
        engine: Option<Arc<dyn OcrEngine>>,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        let vision = generation.clone().map(|g| {
            VisionOcr::new(g, config.vision_model.clone(), config.vision_fallback_model())
        });

        Self {
            pipeline: SuggestionPipeline::new(Arc::clone(&config), generation.clone()),
            replies: ReplyGenerator::new(Arc::clone(&config), generation),
            ocr: OcrResolver::new(vision, engine),
            rate_limiter,
            config,
        }
    }
}

/// 有凭据时构建生成客户端，否则返回 None（全部走离线兜底）
fn build_generation(config: &AppConfig) -> Result<Option<GenerationClient>, AppError> {
    if !config.has_backend() {
        info!("No API key configured, suggestions will use dummy content");
        return Ok(None);
    }

    let mut client = LlmClient::new(
        &config.api_key,
        &config.base_url,
        Duration::from_secs(config.request_timeout_secs),
    )
    .map_err(|e| AppError::Config(format!("failed to build LLM client: {}", e)))?;

    if config.request_log.enabled {
        let logger = RequestLogger::from_settings(&config.request_log);
        client = client.with_logger(Arc::new(logger));
    }

    info!("Generation backend ready: base_url={}, model={}", config.base_url, config.model);
    Ok(Some(GenerationClient::new(Arc::new(client), config.max_tokens)))
}

/// 创建可共享的应用状态
pub fn create_shared_state(
    config: Arc<AppConfig>,
    rate_limiter: Arc<dyn RateLimiter>,
) -> Result<Arc<AppState>, AppError> {
    Ok(Arc::new(AppState::from_config(config, rate_limiter)?))
}
