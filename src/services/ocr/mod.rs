//! 图片文字识别
//!
//! 级联顺序：主视觉模型 → 备用视觉模型 → OCR 引擎（engine 2）→ OCR 引擎（engine 1）。
//! 没有拿到文本时结果为 `none`（成功响应）；
//! 只有每一类已配置的提供方（视觉、OCR 引擎）都出过错时才返回 `ocr_failed`。

mod ocr_space;
mod vision;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};

use super::language::ResolvedLanguage;
use super::prompt_service::PromptService;

pub use ocr_space::OcrSpaceEngine;
pub use vision::VisionOcr;

/// base64 载荷的最小长度
pub const MIN_BASE64_LEN: usize = 1000;

const DEFAULT_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// OCR 引擎的尝试顺序
pub const ENGINE_ATTEMPTS: [EngineMode; 2] = [
    EngineMode {
        engine: 2,
        detect_orientation: true,
    },
    EngineMode {
        engine: 1,
        detect_orientation: true,
    },
];

/// OCR 引擎错误
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("engine returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("engine reported an error: {0}")]
    Api(String),

    #[error("failed to decode engine response: {0}")]
    Decode(String),
}

/// 引擎模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineMode {
    pub engine: u8,
    pub detect_orientation: bool,
}

/// 外部 OCR 引擎
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// 识别图片文字，返回规范化后的文本
    async fn recognize(
        &self,
        data_url: &str,
        language_code: &str,
        mode: EngineMode,
    ) -> Result<String, OcrError>;
}

/// 去掉零宽字符，把所有空白（含换行、制表符）压缩成单个空格
pub fn normalize_text(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '\u{200B}'..='\u{200D}' | '\u{FEFF}'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// 规范化后的图片载荷
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub data_url: String,
    /// base64 部分的长度（data URL 只计算逗号之后的部分）
    pub base64_len: usize,
}

impl ImagePayload {
    /// 接受裸 base64 或 data URL；空载荷和过小载荷在任何提供方调用前被拒绝
    pub fn parse(raw: &str) -> AppResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AppError::MissingInput(
                "Missing 'imageBase64' (or 'image') in body".to_string(),
            ));
        }

        let (data_url, base64_len) = if trimmed.starts_with("data:image/") {
            let len = trimmed.split_once(',').map(|(_, b)| b.len()).unwrap_or(0);
            (trimmed.to_string(), len)
        } else {
            (format!("{}{}", DEFAULT_DATA_URL_PREFIX, trimmed), trimmed.len())
        };

        if base64_len < MIN_BASE64_LEN {
            return Err(AppError::ImageTooSmall { base64_len });
        }
        Ok(Self {
            data_url,
            base64_len,
        })
    }
}

/// 识别结果的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OcrProvider {
    Vision,
    SecondaryOcr,
    None,
}

/// OCR 结果
#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutcome {
    pub provider: OcrProvider,
    /// 视觉模型名
    pub model: Option<String>,
    /// OCR 引擎编号
    pub engine: Option<u8>,
    pub text: String,
    pub base64_len: usize,
}

impl OcrOutcome {
    fn none(base64_len: usize) -> Self {
        Self {
            provider: OcrProvider::None,
            model: None,
            engine: None,
            text: String::new(),
            base64_len,
        }
    }
}

/// OCR 级联解析器
pub struct OcrResolver {
    vision: Option<VisionOcr>,
    engine: Option<Arc<dyn OcrEngine>>,
    prompts: PromptService,
}

impl OcrResolver {
    pub fn new(vision: Option<VisionOcr>, engine: Option<Arc<dyn OcrEngine>>) -> Self {
        Self {
            vision,
            engine,
            prompts: PromptService::new(),
        }
    }

    /// 路由说明（health 接口使用）
    pub fn routing(&self) -> String {
        match (&self.vision, &self.engine) {
            (Some(vision), _) => format!("openai-vision:{}", vision.primary_model()),
            (None, Some(_)) => "ocrspace".to_string(),
            (None, None) => "none".to_string(),
        }
    }

    /// 执行级联识别
    pub async fn resolve(&self, raw_image: &str, language: &ResolvedLanguage) -> AppResult<OcrOutcome> {
        let image = ImagePayload::parse(raw_image)?;
        let mut failures: Vec<String> = Vec::new();
        // 已配置的提供方类别数，以及其中出过错的类别数
        let mut classes = 0;
        let mut failed_classes = 0;

        if let Some(vision) = &self.vision {
            classes += 1;
            match vision.read(&self.prompts, language, &image.data_url).await {
                Ok(Some((model, text))) => {
                    info!("Vision OCR succeeded: model={}, chars={}", model, text.chars().count());
                    return Ok(OcrOutcome {
                        provider: OcrProvider::Vision,
                        model: Some(model),
                        engine: None,
                        text,
                        base64_len: image.base64_len,
                    });
                }
                Ok(None) => info!("Vision OCR found no text, trying OCR engine"),
                Err(e) => {
                    warn!("Vision OCR failed, trying OCR engine: {}", e);
                    failures.push(format!("vision: {}", e));
                    failed_classes += 1;
                }
            }
        }

        if let Some(engine) = &self.engine {
            classes += 1;
            let mut engine_failed = false;
            let code = language.ocr_engine_code();
            for mode in ENGINE_ATTEMPTS {
                match engine.recognize(&image.data_url, code, mode).await {
                    Ok(text) if !text.is_empty() => {
                        info!("OCR engine {} succeeded: chars={}", mode.engine, text.chars().count());
                        return Ok(OcrOutcome {
                            provider: OcrProvider::SecondaryOcr,
                            model: None,
                            engine: Some(mode.engine),
                            text,
                            base64_len: image.base64_len,
                        });
                    }
                    Ok(_) => info!("OCR engine {} found no text", mode.engine),
                    Err(e) => {
                        warn!("OCR engine {} failed: {}", mode.engine, e);
                        failures.push(format!("engine {}: {}", mode.engine, e));
                        engine_failed = true;
                    }
                }
            }
            if engine_failed {
                failed_classes += 1;
            }
        }

        if classes > 0 && failed_classes == classes {
            return Err(AppError::OcrFailed(failures.join("; ")));
        }
        info!("No text recognised by any OCR provider");
        Ok(OcrOutcome::none(image.base64_len))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedOcrEngine;
    use super::*;
    use crate::llm::backend::testing::ScriptedBackend;
    use crate::services::generation::GenerationClient;
    use crate::services::language::LanguageResolver;

    fn image(len: usize) -> String {
        "A".repeat(len)
    }

    fn vision(backend: Arc<ScriptedBackend>) -> VisionOcr {
        VisionOcr::new(GenerationClient::new(backend, 512), "gpt-4o-mini", "gpt-4o")
    }

    fn english() -> ResolvedLanguage {
        LanguageResolver::new("en").resolve("en")
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  a\u{200B}b\r\n\n c\t\td  "), "ab c d");
        assert_eq!(normalize_text("\u{FEFF}"), "");
    }

    #[test]
    fn test_image_payload() {
        let payload = ImagePayload::parse(&image(1200)).unwrap();
        assert!(payload.data_url.starts_with(DEFAULT_DATA_URL_PREFIX));
        assert_eq!(payload.base64_len, 1200);

        let data_url = format!("data:image/jpeg;base64,{}", image(1500));
        let payload = ImagePayload::parse(&data_url).unwrap();
        assert_eq!(payload.data_url, data_url);
        assert_eq!(payload.base64_len, 1500);

        // 前缀不计入长度
        let data_url = format!("data:image/jpeg;base64,{}", image(990));
        assert!(matches!(
            ImagePayload::parse(&data_url),
            Err(AppError::ImageTooSmall { base64_len: 990 })
        ));
        assert!(matches!(ImagePayload::parse("  "), Err(AppError::MissingInput(_))));
    }

    #[tokio::test]
    async fn test_small_image_rejected_before_any_call() {
        let backend = Arc::new(ScriptedBackend::new().reply("unused"));
        let engine = Arc::new(ScriptedOcrEngine::new().text("unused"));
        let resolver = OcrResolver::new(Some(vision(backend.clone())), Some(engine.clone()));

        let err = resolver.resolve(&image(500), &english()).await.unwrap_err();
        assert!(matches!(err, AppError::ImageTooSmall { base64_len: 500 }));
        assert_eq!(backend.calls(), 0);
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_short_vision_result_retries_fallback_model_first() {
        let backend = Arc::new(ScriptedBackend::new().reply("Hi!").reply("Hi! How are you doing?"));
        let engine = Arc::new(ScriptedOcrEngine::new().text("unused"));
        let resolver = OcrResolver::new(Some(vision(backend.clone())), Some(engine.clone()));

        let outcome = resolver.resolve(&image(2000), &english()).await.unwrap();

        assert_eq!(outcome.provider, OcrProvider::Vision);
        assert_eq!(outcome.model.as_deref(), Some("gpt-4o"));
        assert_eq!(outcome.text, "Hi! How are you doing?");
        let models: Vec<String> = backend.requests().into_iter().map(|r| r.model).collect();
        assert_eq!(models, vec!["gpt-4o-mini", "gpt-4o"]);
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_vision_failure_falls_through_to_engine() {
        let backend = Arc::new(ScriptedBackend::new().fail(500, "vision down"));
        let engine = Arc::new(ScriptedOcrEngine::new().text("Hallo daar"));
        let resolver = OcrResolver::new(Some(vision(backend)), Some(engine.clone()));
        let dutch = LanguageResolver::new("en").resolve("nl");

        let outcome = resolver.resolve(&image(2000), &dutch).await.unwrap();

        assert_eq!(outcome.provider, OcrProvider::SecondaryOcr);
        assert_eq!(outcome.engine, Some(2));
        assert_eq!(outcome.text, "Hallo daar");
        assert_eq!(engine.calls(), vec![("nld".to_string(), ENGINE_ATTEMPTS[0])]);
    }

    #[tokio::test]
    async fn test_engine_retries_alternate_mode() {
        let engine = Arc::new(ScriptedOcrEngine::new().text("").text("second try"));
        let resolver = OcrResolver::new(None, Some(engine.clone()));

        let outcome = resolver.resolve(&image(2000), &english()).await.unwrap();

        assert_eq!(outcome.engine, Some(1));
        assert_eq!(outcome.text, "second try");
        assert_eq!(engine.calls().len(), 2);
        assert_eq!(engine.calls()[1].1, ENGINE_ATTEMPTS[1]);
    }

    #[tokio::test]
    async fn test_all_empty_is_none() {
        let backend = Arc::new(ScriptedBackend::new().reply("").reply("   "));
        let engine = Arc::new(ScriptedOcrEngine::new().text("").text(""));
        let resolver = OcrResolver::new(Some(vision(backend)), Some(engine));

        let outcome = resolver.resolve(&image(2000), &english()).await.unwrap();
        assert_eq!(outcome.provider, OcrProvider::None);
        assert!(outcome.text.is_empty());
        assert_eq!(outcome.base64_len, 2000);
    }

    #[tokio::test]
    async fn test_provider_errors_are_ocr_failed() {
        let backend = Arc::new(ScriptedBackend::new().fail(502, "bad gateway"));
        let engine = Arc::new(ScriptedOcrEngine::new().fail("connection reset").text(""));
        let resolver = OcrResolver::new(Some(vision(backend)), Some(engine));

        let err = resolver.resolve(&image(2000), &english()).await.unwrap_err();
        assert!(matches!(err, AppError::OcrFailed(_)));
    }

    #[tokio::test]
    async fn test_vision_error_with_empty_engine_is_none() {
        let backend = Arc::new(ScriptedBackend::new().fail(500, "vision down"));
        let engine = Arc::new(ScriptedOcrEngine::new().text("").text(""));
        let resolver = OcrResolver::new(Some(vision(backend)), Some(engine.clone()));

        let outcome = resolver.resolve(&image(2000), &english()).await.unwrap();
        assert_eq!(outcome.provider, OcrProvider::None);
        assert!(outcome.text.is_empty());
        assert_eq!(engine.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_engine_errors_with_empty_vision_is_none() {
        let backend = Arc::new(ScriptedBackend::new().reply("").reply(""));
        let engine = Arc::new(ScriptedOcrEngine::new().fail("reset").fail("reset"));
        let resolver = OcrResolver::new(Some(vision(backend)), Some(engine));

        let outcome = resolver.resolve(&image(2000), &english()).await.unwrap();
        assert_eq!(outcome.provider, OcrProvider::None);
    }

    #[test]
    fn test_routing() {
        let backend = Arc::new(ScriptedBackend::new());
        assert_eq!(
            OcrResolver::new(Some(vision(backend)), None).routing(),
            "openai-vision:gpt-4o-mini"
        );
        let engine: Arc<dyn OcrEngine> = Arc::new(ScriptedOcrEngine::new());
        assert_eq!(OcrResolver::new(None, Some(engine)).routing(), "ocrspace");
        assert_eq!(OcrResolver::new(None, None).routing(), "none");
    }
}
