//! 生成后端接入
//!
//! `CompletionBackend` 是服务层唯一依赖的接口；`LlmClient` 是它的 HTTP 实现，
//! 走 OpenAI 兼容的 Chat Completions 流式接口收集完整输出。

pub mod backend;
mod client;
mod format;
mod openai;
mod types;

pub use backend::CompletionBackend;
pub use client::LlmClient;
pub use types::*;
