//! OCR.space 引擎

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{normalize_text, EngineMode, OcrEngine, OcrError};
use crate::error::{truncate_detail, MAX_DETAIL_LEN};

#[derive(Debug, Deserialize)]
struct ParsedResult {
    #[serde(rename = "ParsedText", default)]
    parsed_text: String,
}

#[derive(Debug, Deserialize)]
struct OcrSpaceResponse {
    #[serde(rename = "ParsedResults", default)]
    parsed_results: Vec<ParsedResult>,
    #[serde(rename = "IsErroredOnProcessing", default)]
    is_errored: bool,
    #[serde(rename = "ErrorMessage", default)]
    error_message: serde_json::Value,
}

/// OCR.space HTTP 客户端
pub struct OcrSpaceEngine {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl OcrSpaceEngine {
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, OcrError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| OcrError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        })
    }
}

/// 错误信息可能是字符串或字符串数组
fn error_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join("; "),
        serde_json::Value::Null => "unknown error".to_string(),
        other => other.to_string(),
    }
}

fn parse_response(body: &str) -> Result<String, OcrError> {
    let response: OcrSpaceResponse =
        serde_json::from_str(body).map_err(|e| OcrError::Decode(e.to_string()))?;
    if response.is_errored {
        return Err(OcrError::Api(truncate_detail(
            &error_text(&response.error_message),
            MAX_DETAIL_LEN,
        )));
    }
    let joined = response
        .parsed_results
        .iter()
        .map(|r| r.parsed_text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    Ok(normalize_text(&joined))
}

#[async_trait]
impl OcrEngine for OcrSpaceEngine {
    async fn recognize(
        &self,
        data_url: &str,
        language_code: &str,
        mode: EngineMode,
    ) -> Result<String, OcrError> {
        let engine = mode.engine.to_string();
        let mut form = vec![
            ("base64Image", data_url),
            ("language", language_code),
            ("isOverlayRequired", "false"),
            ("OCREngine", engine.as_str()),
            ("scale", "true"),
        ];
        if mode.detect_orientation {
            form.push(("detectOrientation", "true"));
        }

        debug!("OCR.space request: engine={}, language={}", mode.engine, language_code);
        let response = self
            .client
            .post(&self.endpoint)
            .header("apikey", &self.api_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OcrError::Timeout
                } else {
                    OcrError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OcrError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(OcrError::Status {
                status: status.as_u16(),
                body: truncate_detail(&body, MAX_DETAIL_LEN),
            });
        }

        parse_response(&body)
    }
}
