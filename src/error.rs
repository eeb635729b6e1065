//! 统一错误处理模块
//!
//! 定义应用级错误类型，并实现 axum 的 IntoResponse trait 以便自动转换为 HTTP 响应。
//! 响应体统一为 `{"error": kind, "message": ..., "detail"?: ...}`。

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// 上游错误详情的最大长度
pub const MAX_DETAIL_LEN: usize = 500;

/// 应用错误枚举
#[derive(Error, Debug)]
pub enum AppError {
    /// 缺少必填输入（在任何后端调用之前拒绝）
    #[error("missing input: {0}")]
    MissingInput(String),

    /// 图片载荷过小
    #[error("image too small: base64 length {base64_len}")]
    ImageTooSmall { base64_len: usize },

    /// 生成后端返回非成功状态
    #[error("backend error ({status}): {detail}")]
    Backend { status: u16, detail: String },

    /// 两类 OCR 提供方都出现传输级错误
    #[error("ocr failed: {0}")]
    OcrFailed(String),

    /// 触发限流
    #[error("rate limited")]
    RateLimited,

    /// 配置相关错误
    #[error("config error: {0}")]
    Config(String),
}

impl AppError {
    /// 错误类别（对外暴露的 `error` 字段）
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::MissingInput(_) => "missing_input",
            AppError::ImageTooSmall { .. } => "image_too_small",
            AppError::Backend { .. } => "backend_error",
            AppError::OcrFailed(_) => "ocr_failed",
            AppError::RateLimited => "rate_limited",
            AppError::Config(_) => "server_error",
        }
    }

    /// 对应的 HTTP 状态码
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingInput(_) | AppError::ImageTooSmall { .. } => StatusCode::BAD_REQUEST,
            AppError::Backend { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::OcrFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// 按字符截断，避免切在 UTF-8 字符中间
pub fn truncate_detail(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::MissingInput(msg) => json!({
                "error": self.kind(),
                "message": msg,
            }),
            AppError::ImageTooSmall { base64_len } => json!({
                "error": self.kind(),
                "message": "Base64 payload is too small to contain readable text. Send a full screenshot (PNG/JPG).",
                "provider": "none",
                "detail": { "base64Len": base64_len },
            }),
            AppError::Backend { detail, .. } => json!({
                "error": self.kind(),
                "message": "Generation backend returned an error",
                "detail": truncate_detail(detail, MAX_DETAIL_LEN),
            }),
            AppError::OcrFailed(detail) => json!({
                "error": self.kind(),
                "provider": "none",
                "detail": truncate_detail(detail, MAX_DETAIL_LEN),
            }),
            AppError::RateLimited => json!({
                "error": self.kind(),
                "message": "Too many requests, slow down",
            }),
            AppError::Config(msg) => json!({
                "error": self.kind(),
                "detail": truncate_detail(msg, MAX_DETAIL_LEN),
            }),
        };

        (status, Json(body)).into_response()
    }
}

/// 便捷类型别名
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_status() {
        let err = AppError::Backend {
            status: 401,
            detail: "bad key".to_string(),
        };
        assert_eq!(err.kind(), "backend_error");
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        assert_eq!(AppError::OcrFailed("x".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(AppError::Config("x".into()).kind(), "server_error");
        assert_eq!(
            AppError::ImageTooSmall { base64_len: 500 }.kind(),
            "image_too_small"
        );
    }

    #[test]
    fn test_invalid_upstream_status_maps_to_bad_gateway() {
        let err = AppError::Backend {
            status: 42,
            detail: String::new(),
        };
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_truncate_detail_is_char_safe() {
        assert_eq!(truncate_detail("héllo", 2), "hé");
        assert_eq!(truncate_detail("abc", 10), "abc");
    }
}
