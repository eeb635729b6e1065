//! 格式修复
//!
//! 去重后的数量不等于目标数量时，用更窄的指令让后端重新排版一次。
//! 每个请求最多调用一次，不是重试循环。

use tracing::{info, warn};

use super::diversity::select_diverse;
use super::generation::{CallSpec, GenerationClient};
use super::language::ResolvedLanguage;
use super::normalizer::Tone;
use super::prompt_service::PromptService;
use super::resolver::split_lines;

/// 修复阶段的输入
pub struct RepairInput<'a> {
    pub count: usize,
    pub language: &'a ResolvedLanguage,
    pub tone: Tone,
    /// 当前最好的候选行
    pub candidates: &'a [String],
    /// 主调用的原始输出，没有候选行时作为修复输入
    pub raw: &'a str,
}

impl RepairInput<'_> {
    fn content(&self) -> String {
        if self.candidates.is_empty() {
            self.raw.to_string()
        } else {
            self.candidates.join("\n")
        }
    }
}

/// 格式修复阶段
pub struct FormatRepair {
    temperature: f64,
}

impl FormatRepair {
    pub fn new(temperature: f64) -> Self {
        Self { temperature }
    }

    /// 执行一次修复；失败或没有可用行时返回 None，由调用方保留原结果
    pub async fn run(
        &self,
        generation: &GenerationClient,
        prompts: &PromptService,
        model: &str,
        input: RepairInput<'_>,
    ) -> Option<Vec<String>> {
        let content = input.content();
        if content.trim().is_empty() {
            return None;
        }

        info!("Running format repair: target={}, candidates={}", input.count, input.candidates.len());
        let messages = prompts.build_repair_messages(input.count, input.language, input.tone, &content);
        let repaired = match generation
            .generate(model, messages, CallSpec::repair(self.temperature))
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!("Format repair failed: {}", e);
                return None;
            }
        };

        let lines = select_diverse(&split_lines(&repaired), input.count);
        if lines.is_empty() {
            warn!("Format repair returned no usable lines");
            return None;
        }
        Some(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::backend::testing::ScriptedBackend;
    use crate::services::language::LanguageResolver;
    use std::sync::Arc;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_repair_uses_candidates_and_low_temperature() {
        let backend = Arc::new(
            ScriptedBackend::new().reply("1. Coffee first?\n2. Sunset walk later?\n3. Tacos or sushi?"),
        );
        let generation = GenerationClient::new(backend.clone(), 256);
        let language = LanguageResolver::new("en").resolve("en");
        let candidates = lines(&["Coffee first?"]);

        let out = FormatRepair::new(0.2)
            .run(
                &generation,
                &PromptService::new(),
                "gpt-4o-mini",
                RepairInput {
                    count: 3,
                    language: &language,
                    tone: Tone::Playful,
                    candidates: &candidates,
                    raw: "ignored",
                },
            )
            .await
            .unwrap();

        assert_eq!(out, lines(&["Coffee first?", "Sunset walk later?", "Tacos or sushi?"]));
        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].options.temperature, Some(0.2));
        assert_eq!(requests[0].options.response_format, None);
        assert_eq!(requests[0].messages[1].content.as_text(), "Coffee first?");
    }

    #[tokio::test]
    async fn test_repair_falls_back_to_raw_payload() {
        let backend = Arc::new(ScriptedBackend::new().reply("one line here"));
        let generation = GenerationClient::new(backend.clone(), 256);
        let language = LanguageResolver::new("en").resolve("en");

        FormatRepair::new(0.2)
            .run(
                &generation,
                &PromptService::new(),
                "gpt-4o-mini",
                RepairInput {
                    count: 3,
                    language: &language,
                    tone: Tone::Safe,
                    candidates: &[],
                    raw: "{\"broken\": ",
                },
            )
            .await;

        assert_eq!(backend.requests()[0].messages[1].content.as_text(), "{\"broken\": ");
    }

    #[tokio::test]
    async fn test_repair_failure_is_none() {
        let backend = Arc::new(ScriptedBackend::new().fail(500, "boom"));
        let generation = GenerationClient::new(backend.clone(), 256);
        let language = LanguageResolver::new("en").resolve("en");

        let out = FormatRepair::new(0.2)
            .run(
                &generation,
                &PromptService::new(),
                "gpt-4o-mini",
                RepairInput {
                    count: 3,
                    language: &language,
                    tone: Tone::Safe,
                    candidates: &lines(&["only one"]),
                    raw: "",
                },
            )
            .await;
        assert!(out.is_none());
        assert_eq!(backend.calls(), 1);
    }
}
