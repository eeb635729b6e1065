//! 生成后端调用日志
//!
//! 每次后端调用写一行 JSONL，记录模型、是否 JSON 模式、是否带图片、耗时和结果。
//! 图片内容只以占位符出现，API 密钥只保留首尾各 4 位。

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::time::Instant;
use tracing::warn;
use uuid::Uuid;

use crate::config::RequestLogSettings;
use crate::error::truncate_detail;
use crate::llm::{CompletionRequest, ContentPart, LlmError, MessageContent};

const MAX_PREVIEW_MESSAGES: usize = 3;
const MESSAGE_PREVIEW_CHARS: usize = 200;
const RESPONSE_PREVIEW_CHARS: usize = 300;
const ERROR_MESSAGE_CHARS: usize = 500;
const LOG_FILE_NAME: &str = "llm_requests.jsonl";

/// 调用状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Pending,
    Success,
    Error,
}

/// 日志条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub api_key_masked: String,
    pub model: String,
    /// 是否请求 JSON 输出（主生成调用）
    pub json_mode: bool,
    /// 是否带图片（视觉 OCR 调用）
    pub has_image: bool,
    pub messages_count: usize,
    pub messages_preview: Vec<MessagePreview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
    pub status: CallStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub quota_exhausted: bool,
}

/// 消息预览
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePreview {
    pub role: String,
    pub content_preview: String,
}

/// 调用目标信息
pub struct CallTarget<'a> {
    pub endpoint: &'a str,
    pub timeout_secs: u64,
    pub api_key: &'a str,
}

#[derive(Default)]
struct LogFile {
    handle: Option<File>,
    /// 文件中的行数，首次写入时从磁盘统计
    lines: Option<usize>,
}

/// 请求日志记录器
pub struct RequestLogger {
    log_path: PathBuf,
    max_entries: usize,
    file: Mutex<LogFile>,
}

impl RequestLogger {
    /// `log_dir` 缺省为可执行文件旁的 storage/
    pub fn new(log_dir: Option<PathBuf>, max_entries: usize) -> Self {
        let log_dir = log_dir.unwrap_or_else(|| {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()))
                .unwrap_or_else(|| PathBuf::from("."))
                .join("storage")
        });

        if let Err(e) = fs::create_dir_all(&log_dir) {
            warn!("Failed to create request log dir {}: {}", log_dir.display(), e);
        }

        Self {
            log_path: log_dir.join(LOG_FILE_NAME),
            max_entries: max_entries.max(1),
            file: Mutex::new(LogFile::default()),
        }
    }

    pub fn from_settings(settings: &RequestLogSettings) -> Self {
        Self::new(settings.dir.clone(), settings.max_entries)
    }

    /// 生成 8 位请求 ID
    pub fn generate_request_id() -> String {
        Uuid::new_v4().simple().to_string()[..8].to_string()
    }

    /// API 密钥脱敏
    pub fn mask_api_key(api_key: &str) -> String {
        let chars: Vec<char> = api_key.chars().collect();
        if chars.len() <= 8 {
            "*".repeat(chars.len())
        } else {
            let head: String = chars[..4].iter().collect();
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("{}...{}", head, tail)
        }
    }

    fn preview(text: &str, max_chars: usize) -> String {
        let cut = truncate_detail(text, max_chars);
        if cut.len() < text.len() {
            format!("{}...", cut)
        } else {
            cut
        }
    }

    /// 调用开始：从请求本身提取日志字段
    pub fn begin(&self, request_id: &str, request: &CompletionRequest, target: CallTarget<'_>) -> LogEntry {
        let has_image = request.messages.iter().any(|m| match &m.content {
            MessageContent::Parts(parts) => parts.iter().any(|p| matches!(p, ContentPart::ImageUrl { .. })),
            MessageContent::Text(_) => false,
        });

        LogEntry {
            request_id: request_id.to_string(),
            timestamp: Utc::now(),
            endpoint: target.endpoint.to_string(),
            api_key_masked: Self::mask_api_key(target.api_key),
            model: request.model.clone(),
            json_mode: request.options.response_format.is_some(),
            has_image,
            messages_count: request.messages.len(),
            messages_preview: request
                .messages
                .iter()
                .take(MAX_PREVIEW_MESSAGES)
                .map(|m| MessagePreview {
                    role: m.role.clone(),
                    content_preview: Self::preview(&m.content.as_text(), MESSAGE_PREVIEW_CHARS),
                })
                .collect(),
            temperature: request.options.temperature,
            max_tokens: request.options.max_tokens,
            timeout_secs: target.timeout_secs,
            status: CallStatus::Pending,
            duration_ms: None,
            response_length: None,
            response_preview: None,
            error_type: None,
            error_message: None,
            status_code: None,
            quota_exhausted: false,
        }
    }

    /// 调用结束：补全结果并落盘
    pub fn finish(&self, mut entry: LogEntry, start: Instant, outcome: Result<&str, &LlmError>) {
        entry.duration_ms = Some(start.elapsed().as_millis() as u64);
        match outcome {
            Ok(content) => {
                entry.status = CallStatus::Success;
                entry.response_length = Some(content.len());
                entry.response_preview = Some(Self::preview(content, RESPONSE_PREVIEW_CHARS));
            }
            Err(e) => {
                entry.status = CallStatus::Error;
                entry.error_type = Some(e.error_type().to_string());
                entry.error_message = Some(Self::preview(&e.to_string(), ERROR_MESSAGE_CHARS));
                entry.status_code = Some(e.status_code());
                entry.quota_exhausted = e.is_quota_exhausted();
            }
        }
        self.write_entry(&entry);
    }

    fn write_entry(&self, entry: &LogEntry) {
        let Ok(json) = serde_json::to_string(entry) else {
            return;
        };

        let mut file = self.file.lock();
        if file.lines.is_none() {
            file.lines = Some(self.count_lines());
        }
        if file.handle.is_none() {
            match OpenOptions::new().create(true).append(true).open(&self.log_path) {
                Ok(handle) => file.handle = Some(handle),
                Err(e) => {
                    warn!("Failed to open request log {}: {}", self.log_path.display(), e);
                    return;
                }
            }
        }

        let written = file
            .handle
            .as_mut()
            .map(|handle| writeln!(handle, "{}", json).and_then(|_| handle.flush()).is_ok())
            .unwrap_or(false);
        if !written {
            return;
        }

        let lines = file.lines.unwrap_or(0) + 1;
        file.lines = Some(lines);

        // 超出上限一成后压缩回上限，避免每次写入都重写文件
        if lines > self.max_entries + self.max_entries / 10 {
            file.handle = None;
            file.lines = Some(self.compact());
        }
    }

    fn count_lines(&self) -> usize {
        File::open(&self.log_path)
            .map(|f| BufReader::new(f).lines().count())
            .unwrap_or(0)
    }

    /// 只保留最近 max_entries 条，返回保留的行数
    fn compact(&self) -> usize {
        let Ok(file) = File::open(&self.log_path) else {
            return 0;
        };
        let lines: Vec<String> = BufReader::new(file).lines().map_while(Result::ok).collect();
        let keep = &lines[lines.len().saturating_sub(self.max_entries)..];

        match File::create(&self.log_path) {
            Ok(mut file) => {
                for line in keep {
                    let _ = writeln!(file, "{}", line);
                }
                keep.len()
            }
            Err(e) => {
                warn!("Failed to compact request log: {}", e);
                lines.len()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatMessage, ChatOptions};

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("flairy-log-{}-{}", name, Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn target() -> CallTarget<'static> {
        CallTarget {
            endpoint: "https://example.invalid/v1/chat/completions",
            timeout_secs: 45,
            api_key: "sk-1234567890abcd",
        }
    }

    fn vision_request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![
                ChatMessage::system("Extract the chat text"),
                ChatMessage::user_with_image("Read this", format!("data:image/png;base64,{}", "A".repeat(5000))),
            ],
            options: ChatOptions {
                temperature: Some(0.0),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_mask_api_key() {
        assert_eq!(RequestLogger::mask_api_key("short"), "*****");
        assert_eq!(RequestLogger::mask_api_key("sk-1234567890abcd"), "sk-1...abcd");
    }

    #[test]
    fn test_begin_flags_vision_calls_without_image_data() {
        let logger = RequestLogger::new(Some(temp_dir("begin")), 10);
        let entry = logger.begin("abcd1234", &vision_request(), target());

        assert!(entry.has_image);
        assert!(!entry.json_mode);
        assert_eq!(entry.status, CallStatus::Pending);
        assert_eq!(entry.messages_preview[1].content_preview, "Read this [image]");
        assert_eq!(entry.api_key_masked, "sk-1...abcd");
    }

    #[test]
    fn test_error_entry_records_quota() {
        let dir = temp_dir("quota");
        let logger = RequestLogger::new(Some(dir.clone()), 10);
        let entry = logger.begin("abcd1234", &vision_request(), target());
        let err = LlmError::ApiError {
            status: 429,
            message: "insufficient_quota".to_string(),
        };
        logger.finish(entry, Instant::now(), Err(&err));

        let content = fs::read_to_string(dir.join(LOG_FILE_NAME)).unwrap();
        let entry: LogEntry = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(entry.status, CallStatus::Error);
        assert_eq!(entry.status_code, Some(429));
        assert!(entry.quota_exhausted);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_entries_are_capped() {
        let dir = temp_dir("cap");
        let logger = RequestLogger::new(Some(dir.clone()), 3);

        for i in 0..5 {
            let entry = logger.begin(&format!("req{}", i), &vision_request(), target());
            logger.finish(entry, Instant::now(), Ok("hello"));
        }

        let content = fs::read_to_string(dir.join(LOG_FILE_NAME)).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert!(lines.len() <= 3);
        assert!(lines.last().unwrap().contains("\"request_id\":\"req4\""));
        assert!(!content.contains("sk-1234567890abcd"));
        assert!(!content.contains("AAAAAAAAAA"));

        let _ = fs::remove_dir_all(dir);
    }
}
