//! 线路格式工具：端点构建、错误体读取、SSE 解码

use tracing::error;

use super::types::{ChatChunk, LlmError};
use crate::error::{truncate_detail, MAX_DETAIL_LEN};

/// 流中途出错时使用的状态码（上游已返回 200，无法得知真实状态）
pub const MID_STREAM_ERROR_STATUS: u16 = 502;

/// 规整 base_url 并补上 `/v1/<path>`（已带完整路径时原样返回）
fn endpoint(base_url: &str, path: &str) -> String {
    let mut url = base_url.trim().trim_end_matches('/').to_string();
    if let Some(pos) = url.find("://") {
        let (scheme, rest) = url.split_at(pos + 3);
        url = format!("{}{}", scheme, rest.replace("//", "/"));
    }

    if url.ends_with(&format!("/{}", path)) {
        url
    } else if url.ends_with("/v1") {
        format!("{}/{}", url, path)
    } else {
        format!("{}/v1/{}", url, path)
    }
}

/// OpenAI Chat Completions 端点
pub fn build_openai_endpoint(base_url: &str) -> String {
    endpoint(base_url, "chat/completions")
}

/// 读取非成功响应的错误体
pub async fn api_error(provider: &str, response: reqwest::Response) -> LlmError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    error!(
        "{} API error: status={}, body={}",
        provider,
        status,
        truncate_detail(&body, MAX_DETAIL_LEN)
    );
    LlmError::ApiError {
        status,
        message: body,
    }
}

/// 解析后的流事件
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Chunk(ChatChunk),
    /// 服务端声明流结束
    Stop,
}

/// SSE 解码器
///
/// 按字节缓冲，只在拿到完整一行后才做 UTF-8 解码，
/// 多字节字符（中日文、阿拉伯文等）被拆在两个网络块之间时不会损坏。
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 送入一个网络块，返回其中完整的 `data:` 载荷
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\r', '\n']);

            if let Some(data) = line.strip_prefix("data:") {
                let data = data.strip_prefix(' ').unwrap_or(data);
                if !data.is_empty() {
                    payloads.push(data.to_string());
                }
            }
        }
        payloads
    }
}
