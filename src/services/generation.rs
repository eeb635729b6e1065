//! 生成后端调用
//!
//! 把底层 `LlmError` 归类为管线关心的两种失败：配额耗尽和其他后端错误。

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{truncate_detail, AppError, MAX_DETAIL_LEN};
use crate::llm::{ChatMessage, ChatOptions, CompletionBackend, CompletionRequest, LlmError};

/// 分类后的生成失败
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// 错误体带有配额耗尽标记
    #[error("quota exhausted")]
    QuotaExhausted,

    /// 其他后端错误（含超时与传输错误）
    #[error("backend error ({status}): {detail}")]
    Backend { status: u16, detail: String },
}

impl From<LlmError> for GenerationError {
    fn from(err: LlmError) -> Self {
        if err.is_quota_exhausted() {
            return GenerationError::QuotaExhausted;
        }
        let status = err.status_code();
        let detail = match err {
            LlmError::ApiError { message, .. } => message,
            other => other.to_string(),
        };
        GenerationError::Backend {
            status,
            detail: truncate_detail(&detail, MAX_DETAIL_LEN),
        }
    }
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        match err {
            // 正常流程中配额耗尽会被 dummy 内容兜底，走到这里说明调用方没有处理
            GenerationError::QuotaExhausted => AppError::Backend {
                status: 429,
                detail: "quota exhausted".to_string(),
            },
            GenerationError::Backend { status, detail } => AppError::Backend { status, detail },
        }
    }
}

/// 单次调用的参数
#[derive(Debug, Clone)]
pub struct CallSpec {
    pub temperature: f64,
    /// 请求 JSON 输出
    pub json: bool,
}

impl CallSpec {
    pub fn creative(temperature: f64) -> Self {
        Self {
            temperature,
            json: true,
        }
    }

    /// 翻译类调用：温度为 0，纯文本输出
    pub fn translation() -> Self {
        Self {
            temperature: 0.0,
            json: false,
        }
    }

    /// 视觉识别：温度为 0，纯文本输出
    pub fn vision() -> Self {
        Self::translation()
    }

    pub fn repair(temperature: f64) -> Self {
        Self {
            temperature,
            json: false,
        }
    }
}

/// 生成客户端
#[derive(Clone)]
pub struct GenerationClient {
    backend: Arc<dyn CompletionBackend>,
    max_tokens: u32,
}

impl GenerationClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, max_tokens: u32) -> Self {
        Self { backend, max_tokens }
    }

    /// 调用生成后端，返回原始输出文本
    pub async fn generate(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        spec: CallSpec,
    ) -> Result<String, GenerationError> {
        let request = CompletionRequest {
            model: model.to_string(),
            messages,
            options: ChatOptions {
                temperature: Some(spec.temperature),
                max_tokens: Some(self.max_tokens),
                response_format: spec.json.then(|| "json_object".to_string()),
            },
        };

        match self.backend.complete(request).await {
            Ok(content) => {
                debug!("Generation succeeded: model={}, length={}", model, content.len());
                Ok(content)
            }
            Err(e) => {
                let err = GenerationError::from(e);
                warn!("Generation failed: model={}, error={}", model, err);
                Err(err)
            }
        }
    }
}
