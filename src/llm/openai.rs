//! OpenAI Chat Completions API 流式实现

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use tracing::debug;

use super::format::{api_error, build_openai_endpoint, SseDecoder, StreamEvent, MID_STREAM_ERROR_STATUS};
use super::types::{ChatChunk, ChatMessage, ChatOptions, LlmError};

/// 请求载荷；消息内容可以是纯文本，也可以是带图片的片段数组
#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

impl OpenAiRequest {
    fn new(model: &str, messages: Vec<ChatMessage>, options: &ChatOptions) -> Self {
        Self {
            model: model.to_string(),
            messages,
            stream: true,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            response_format: options.response_format.clone().map(|format_type| ResponseFormat { format_type }),
        }
    }
}

#[derive(Deserialize, Debug)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    /// 部分兼容网关在 200 响应的流里返回错误对象
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize, Debug)]
struct OpenAiChoice {
    #[serde(default)]
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct OpenAiDelta {
    content: Option<String>,
}

/// 解析一条 `data:` 载荷；无法识别的载荷返回 None
fn parse_data(data: &str) -> Result<Option<StreamEvent>, LlmError> {
    if data == "[DONE]" {
        return Ok(Some(StreamEvent::Stop));
    }

    let chunk: OpenAiStreamChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            debug!("Skipping unparsable OpenAI chunk: {}, data: {}", e, data);
            return Ok(None);
        }
    };

    if chunk.error.is_some() {
        return Err(LlmError::ApiError {
            status: MID_STREAM_ERROR_STATUS,
            message: data.to_string(),
        });
    }

    Ok(chunk.choices.into_iter().next().map(|choice| {
        StreamEvent::Chunk(ChatChunk {
            content: choice.delta.content,
            finish_reason: choice.finish_reason,
        })
    }))
}

/// 流式调用 OpenAI 兼容接口
pub fn stream_openai(
    client: &Client,
    api_key: &str,
    base_url: &str,
    messages: Vec<ChatMessage>,
    model: &str,
    options: &ChatOptions,
) -> Pin<Box<dyn Stream<Item = Result<ChatChunk, LlmError>> + Send>> {
    let endpoint = build_openai_endpoint(base_url);
    let api_key = api_key.to_string();
    let payload = OpenAiRequest::new(model, messages, options);
    let client = client.clone();

    Box::pin(try_stream! {
        debug!("OpenAI API request: endpoint={}, model={}", endpoint, payload.model);

        let response = client
            .post(&endpoint)
            .bearer_auth(&api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            Err::<(), _>(api_error("OpenAI", response).await)?;
            return;
        }

        let mut decoder = SseDecoder::new();
        let mut body = response.bytes_stream();
        while let Some(bytes) = body.next().await {
            let bytes = bytes?;
            for data in decoder.feed(&bytes) {
                match parse_data(&data)? {
                    Some(StreamEvent::Chunk(chunk)) => yield chunk,
                    Some(StreamEvent::Stop) => return,
                    None => {}
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_requests_json_and_keeps_image_parts() {
        let options = ChatOptions {
            temperature: Some(0.0),
            max_tokens: Some(300),
            response_format: Some("json_object".to_string()),
        };
        let messages = vec![
            ChatMessage::system("read the screenshot"),
            ChatMessage::user_with_image("text only", "data:image/png;base64,QUJD"),
        ];
        let value = serde_json::to_value(OpenAiRequest::new("gpt-4o-mini", messages, &options)).unwrap();

        assert_eq!(value["stream"], true);
        assert_eq!(value["response_format"]["type"], "json_object");
        assert_eq!(value["messages"][0]["content"], "read the screenshot");
        assert_eq!(value["messages"][1]["content"][1]["type"], "image_url");
    }

    #[test]
    fn test_plain_call_omits_optional_fields() {
        let value = serde_json::to_value(OpenAiRequest::new(
            "gpt-4o-mini",
            vec![ChatMessage::user("hi")],
            &ChatOptions::default(),
        ))
        .unwrap();
        assert!(value.get("response_format").is_none());
        assert!(value.get("temperature").is_none());
    }

    #[test]
    fn test_parse_data() {
        let event = parse_data(r#"{"choices":[{"delta":{"content":"Hoi"},"finish_reason":null}]}"#).unwrap();
        assert_eq!(
            event,
            Some(StreamEvent::Chunk(ChatChunk {
                content: Some("Hoi".to_string()),
                finish_reason: None,
            }))
        );

        // role-only 首块没有 content
        let event = parse_data(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap();
        assert!(matches!(event, Some(StreamEvent::Chunk(ChatChunk { content: None, .. }))));

        assert_eq!(parse_data("[DONE]").unwrap(), Some(StreamEvent::Stop));
        assert_eq!(parse_data("not json").unwrap(), None);
        assert_eq!(parse_data(r#"{"choices":[]}"#).unwrap(), None);
    }

    #[test]
    fn test_mid_stream_error_keeps_quota_marker() {
        let err = parse_data(r#"{"error":{"code":"insufficient_quota","message":"out of credit"}}"#).unwrap_err();
        assert!(err.is_quota_exhausted());
        assert_eq!(err.status_code(), MID_STREAM_ERROR_STATUS);
    }
}
