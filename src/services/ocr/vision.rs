//! 视觉模型 OCR

use tracing::{debug, info};

use super::normalize_text;
use crate::services::generation::{CallSpec, GenerationClient, GenerationError};
use crate::services::language::ResolvedLanguage;
use crate::services::prompt_service::PromptService;

/// 主模型结果短于该长度时改用备用模型
pub const MIN_VISION_TEXT_CHARS: usize = 6;

/// 通过生成后端的视觉模型识别图片文字
pub struct VisionOcr {
    generation: GenerationClient,
    primary_model: String,
    fallback_model: String,
}

impl VisionOcr {
    pub fn new(
        generation: GenerationClient,
        primary_model: impl Into<String>,
        fallback_model: impl Into<String>,
    ) -> Self {
        Self {
            generation,
            primary_model: primary_model.into(),
            fallback_model: fallback_model.into(),
        }
    }

    pub fn primary_model(&self) -> &str {
        &self.primary_model
    }

    async fn read_with(
        &self,
        prompts: &PromptService,
        model: &str,
        language: &ResolvedLanguage,
        data_url: &str,
    ) -> Result<String, GenerationError> {
        let messages = prompts.build_vision_messages(language, data_url);
        let text = self.generation.generate(model, messages, CallSpec::vision()).await?;
        Ok(normalize_text(&text))
    }

    /// 主模型 → 备用模型
    ///
    /// 返回 `Ok(Some((model, text)))` 表示识别成功；`Ok(None)` 表示两个模型都没有可用文本；
    /// 任意一次调用出错都返回 Err，由调用方转交 OCR 引擎。
    pub async fn read(
        &self,
        prompts: &PromptService,
        language: &ResolvedLanguage,
        data_url: &str,
    ) -> Result<Option<(String, String)>, GenerationError> {
        let text = self
            .read_with(prompts, &self.primary_model, language, data_url)
            .await?;
        if text.chars().count() >= MIN_VISION_TEXT_CHARS {
            return Ok(Some((self.primary_model.clone(), text)));
        }

        info!(
            "Vision model {} returned {} chars, retrying with {}",
            self.primary_model,
            text.chars().count(),
            self.fallback_model
        );
        let text = self
            .read_with(prompts, &self.fallback_model, language, data_url)
            .await?;
        if text.is_empty() {
            debug!("Fallback vision model returned no text");
            return Ok(None);
        }
        Ok(Some((self.fallback_model.clone(), text)))
    }
}
