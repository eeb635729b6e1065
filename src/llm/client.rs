//! 统一 LLM 客户端

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::backend::CompletionBackend;
use super::format::build_openai_endpoint;
use super::openai::stream_openai;
use super::types::{ChatChunk, ChatMessage, ChatOptions, CompletionRequest, LlmError, StreamCollectResult};
use crate::utils::request_logger::{CallTarget, RequestLogger};

/// OpenAI 兼容接口客户端
///
/// `base_url` 可以指向任何兼容 Chat Completions 的网关，模型名原样透传
pub struct LlmClient {
    client: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
    logger: Option<Arc<RequestLogger>>,
}

impl LlmClient {
    /// 创建新的 LLM 客户端
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(LlmError::ConfigError("API Key is required".to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(LlmError::HttpError)?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.into(),
            timeout,
            logger: None,
        })
    }

    /// 附加请求日志记录器
    pub fn with_logger(mut self, logger: Arc<RequestLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// 流式聊天
    pub fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        options: ChatOptions,
    ) -> Pin<Box<dyn Stream<Item = Result<ChatChunk, LlmError>> + Send>> {
        stream_openai(&self.client, &self.api_key, &self.base_url, messages, model, &options)
    }

    /// 流式请求并收集完整响应
    pub async fn stream_and_collect(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        options: ChatOptions,
    ) -> Result<StreamCollectResult, LlmError> {
        let mut stream = self.stream_chat(messages, model, options);
        let mut result = StreamCollectResult::default();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result?;
            result.chunk_count += 1;

            if let Some(content) = chunk.content {
                result.content.push_str(&content);
            }
            if chunk.finish_reason.is_some() {
                result.finish_reason = chunk.finish_reason;
            }
        }

        Ok(result)
    }

    fn endpoint(&self) -> String {
        build_openai_endpoint(&self.base_url)
    }
}

#[async_trait]
impl CompletionBackend for LlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        info!("LLM request: model={}", request.model);

        let start = Instant::now();
        let entry = self.logger.as_ref().map(|logger| {
            let endpoint = self.endpoint();
            logger.begin(
                &RequestLogger::generate_request_id(),
                &request,
                CallTarget {
                    endpoint: &endpoint,
                    timeout_secs: self.timeout.as_secs(),
                    api_key: &self.api_key,
                },
            )
        });

        let result = self
            .stream_and_collect(request.messages, &request.model, request.options)
            .await;

        if let Ok(collected) = &result {
            debug!(
                "LLM response collected: chunks={}, length={}, finish_reason={:?}",
                collected.chunk_count,
                collected.content.len(),
                collected.finish_reason
            );
        }
        if let (Some(logger), Some(entry)) = (self.logger.as_ref(), entry) {
            let outcome = result.as_ref().map(|c| c.content.as_str());
            logger.finish(entry, start, outcome);
        }

        result.map(|collected| collected.content)
    }
}
