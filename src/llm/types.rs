//! LLM 类型定义

use serde::{Deserialize, Serialize};

/// 配额耗尽时错误体中出现的标记（大小写敏感）
pub const QUOTA_EXHAUSTED_MARKER: &str = "insufficient_quota";

/// 图片内容
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageUrl {
    /// data URL 或远程 URL
    pub url: String,
}

/// 多模态消息片段（OpenAI 格式）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// 消息内容：纯文本或多模态片段
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// 文本视图（图片片段以占位符表示），用于日志预览
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => text.clone(),
                    ContentPart::ImageUrl { .. } => "[image]".to_string(),
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

/// 聊天消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// 角色：system, user, assistant
    pub role: String,
    /// 消息内容
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }

    /// 带图片的用户消息
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.into(),
                    },
                },
            ]),
        }
    }
}

/// 流式响应块
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatChunk {
    /// 文本内容
    pub content: Option<String>,
    /// 完成原因
    pub finish_reason: Option<String>,
}

/// 聊天选项
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// 温度参数
    pub temperature: Option<f64>,
    /// 最大 token 数
    pub max_tokens: Option<u32>,
    /// 响应格式（如 "json_object"）
    pub response_format: Option<String>,
}

/// 一次完整的补全请求
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub options: ChatOptions,
}

/// 流式收集结果
#[derive(Debug, Clone, Default)]
pub struct StreamCollectResult {
    /// 完整响应内容
    pub content: String,
    /// 完成原因
    pub finish_reason: Option<String>,
    /// chunk 数量
    pub chunk_count: usize,
}

/// LLM 错误类型
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// HTTP 请求错误
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// API 返回错误
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    /// 超时错误
    #[error("request timed out")]
    Timeout,

    /// 配置错误
    #[error("config error: {0}")]
    ConfigError(String),

    /// JSON 解析错误
    #[error("JSON parse failed: {0}")]
    JsonError(#[from] serde_json::Error),

    /// 流解析错误
    #[error("stream error: {0}")]
    StreamError(String),
}

impl LlmError {
    /// 错误体是否带有配额耗尽标记
    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, LlmError::ApiError { message, .. } if message.contains(QUOTA_EXHAUSTED_MARKER))
    }

    /// 映射到对外的 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            LlmError::ApiError { status, .. } => *status,
            LlmError::Timeout => 504,
            LlmError::HttpError(e) if e.is_timeout() => 504,
            _ => 502,
        }
    }

    /// 简短的错误类别，用于请求日志
    pub fn error_type(&self) -> &'static str {
        match self {
            LlmError::HttpError(e) if e.is_timeout() => "timeout",
            LlmError::HttpError(_) => "http_error",
            LlmError::ApiError { .. } => "api_error",
            LlmError::Timeout => "timeout",
            LlmError::ConfigError(_) => "config_error",
            LlmError::JsonError(_) => "json_error",
            LlmError::StreamError(_) => "stream_error",
        }
    }
}
