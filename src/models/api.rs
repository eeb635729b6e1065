//! REST API 请求/响应模型

use serde::{Deserialize, Serialize};

use crate::services::{
    OcrOutcome, PipelineTrace, ReplyBundle, Suggestion, SuggestionOutcome, DEFAULT_COUNT,
};
use crate::services::ocr::OcrProvider;

fn default_count() -> usize {
    DEFAULT_COUNT
}

/// 建议请求
///
/// 输入字段兼容旧客户端的多个名字，按顺序取第一个非空值。
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestRequest {
    pub input: Option<String>,
    pub text: Option<String>,
    pub prompt: Option<String>,
    pub message: Option<String>,
    pub content: Option<String>,
    pub tone: Option<String>,
    pub flirt_level: Option<String>,
    pub persona: Option<String>,
    pub language: Option<String>,
    #[serde(default = "default_count")]
    pub count: usize,
    pub model: Option<String>,
    #[serde(default)]
    pub debug: bool,
}

impl SuggestRequest {
    pub fn input_text(&self) -> String {
        [&self.input, &self.text, &self.prompt, &self.message, &self.content]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .unwrap_or_default()
            .to_string()
    }

    pub fn tone(&self) -> Option<String> {
        self.tone.clone().or_else(|| self.flirt_level.clone())
    }
}

/// 开场白请求
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenersRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub interests: String,
    pub tone: Option<String>,
    pub persona: Option<String>,
    pub language: Option<String>,
    #[serde(default = "default_count")]
    pub count: usize,
    pub model: Option<String>,
    #[serde(default)]
    pub debug: bool,
}

/// 聊天分析请求
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeChatRequest {
    #[serde(default)]
    pub pasted_text: String,
    pub tone: Option<String>,
    pub coach_persona: Option<String>,
    pub language: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub debug: bool,
}

/// 建议响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestResponse {
    pub ok: bool,
    pub rid: String,
    pub model: String,
    pub language: String,
    pub language_name: String,
    pub suggestions: Vec<Suggestion>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub coach: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<PipelineTrace>,
}

impl SuggestResponse {
    pub fn new(rid: String, outcome: SuggestionOutcome, debug: bool) -> Self {
        Self {
            ok: true,
            rid,
            model: outcome.model,
            language: outcome.language.code,
            language_name: outcome.language.display_name,
            suggestions: outcome.suggestions,
            coach: outcome.coach,
            note: outcome.note,
            debug: debug.then_some(outcome.trace),
        }
    }
}

/// OCR 请求
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrRequest {
    pub image_base64: Option<String>,
    pub image: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub debug: bool,
}

impl OcrRequest {
    pub fn image_field(&self) -> String {
        image_field(&self.image_base64, &self.image)
    }
}

fn image_field(image_base64: &Option<String>, image: &Option<String>) -> String {
    image_base64
        .as_deref()
        .or(image.as_deref())
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// OCR 调试信息
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrDebug {
    pub base64_len: usize,
}

/// OCR 响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrResponse {
    pub provider: OcrProvider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<u8>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<OcrDebug>,
}

impl OcrResponse {
    pub fn new(outcome: OcrOutcome, debug: bool) -> Self {
        let message = (outcome.provider == OcrProvider::None)
            .then(|| "No text recognised by vision or OCR engine".to_string());
        Self {
            provider: outcome.provider,
            model: outcome.model,
            engine: outcome.engine,
            text: outcome.text,
            message,
            debug: debug.then_some(OcrDebug {
                base64_len: outcome.base64_len,
            }),
        }
    }
}

/// 回复请求
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyApiRequest {
    pub text: Option<String>,
    pub image_base64: Option<String>,
    pub image: Option<String>,
    pub tone: Option<String>,
    pub persona: Option<String>,
    pub language: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub debug: bool,
}

impl ReplyApiRequest {
    pub fn image_field(&self) -> String {
        image_field(&self.image_base64, &self.image)
    }
}

/// 回复响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr: Option<OcrResponse>,
    #[serde(flatten)]
    pub bundle: ReplyBundle,
    pub model: String,
}

/// 健康检查响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub ok: bool,
    pub has_openai_key: bool,
    pub has_ocr_key: bool,
    pub model: String,
    pub vision_model: String,
    pub suggest_provider: String,
    pub ocr_provider: String,
    pub default_language: String,
    pub supported_languages: Vec<&'static str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggest_request_aliases() {
        let req: SuggestRequest =
            serde_json::from_str(r#"{"prompt":"  ","message":" hey there ","flirtLevel":"flirt"}"#).unwrap();
        assert_eq!(req.input_text(), "hey there");
        assert_eq!(req.tone().as_deref(), Some("flirt"));
        assert_eq!(req.count, DEFAULT_COUNT);
        assert!(!req.debug);
    }

    #[test]
    fn test_image_field_prefers_image_base64() {
        let req: OcrRequest = serde_json::from_str(r#"{"imageBase64":" abc ","image":"def"}"#).unwrap();
        assert_eq!(req.image_field(), "abc");
        let req: OcrRequest = serde_json::from_str(r#"{"image":"def"}"#).unwrap();
        assert_eq!(req.image_field(), "def");
    }

    #[test]
    fn test_reply_response_is_flat() {
        let response = ReplyResponse {
            ocr: None,
            bundle: ReplyBundle {
                last_question: "How are you?".to_string(),
                direct: "Great!".to_string(),
                ..Default::default()
            },
            model: "dummy".to_string(),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["lastQuestion"], "How are you?");
        assert_eq!(value["direct"], "Great!");
        assert_eq!(value["model"], "dummy");
        assert!(value.get("ocr").is_none());
    }
}
