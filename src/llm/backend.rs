//! 生成后端抽象
//!
//! 管线各阶段只依赖这个 trait，测试中可替换为脚本化的假后端。

use async_trait::async_trait;

use super::types::{CompletionRequest, LlmError};

/// 能完成一次（非流式语义的）补全请求的后端
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// 返回模型输出的完整文本
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}

#[cfg(test)]
pub mod testing {
    //! 测试用脚本化后端

    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// 脚本化的响应
    pub enum Scripted {
        Text(String),
        Error { status: u16, body: String },
    }

    /// 按顺序返回预设响应，并记录所有请求
    #[derive(Default)]
    pub struct ScriptedBackend {
        responses: Mutex<VecDeque<Scripted>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, text: impl Into<String>) -> Self {
            self.responses.lock().push_back(Scripted::Text(text.into()));
            self
        }

        pub fn fail(self, status: u16, body: impl Into<String>) -> Self {
            self.responses.lock().push_back(Scripted::Error {
                status,
                body: body.into(),
            });
            self
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().len()
        }

        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
            self.requests.lock().push(request);
            match self.responses.lock().pop_front() {
                Some(Scripted::Text(text)) => Ok(text),
                Some(Scripted::Error { status, body }) => Err(LlmError::ApiError {
                    status,
                    message: body,
                }),
                None => Err(LlmError::StreamError("script exhausted".to_string())),
            }
        }
    }
}
