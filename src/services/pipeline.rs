//! 建议生成管线
//!
//! 阶段依次执行，每个阶段只依赖上一阶段的输出和配置：
//! 规范化 → 语言解析 → prompt 构建 → 主生成调用 → 响应解析（含语言检查）
//! → 多样性过滤 →（数量不对时）格式修复 → 补齐。
//! 同一请求内的后端调用严格串行。

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

use super::diversity::{pad, select_diverse};
use super::dummy;
use super::generation::{CallSpec, GenerationClient, GenerationError};
use super::language::{LangKey, LanguageResolver, ResolvedLanguage};
use super::normalizer::{normalize_language, normalize_persona, normalize_tone, Tone};
use super::prompt_service::{
    PromptKind, PromptService, SuggestionContext, FOLLOW_UP_MIN_WORDS, MAX_COACH_TIPS,
};
use super::repair::{FormatRepair, RepairInput};
use super::resolver::{enforce_language, resolve_payload, Candidate, ResolvedOutput};

/// 默认建议数量
pub const DEFAULT_COUNT: usize = 5;
/// 建议数量上限
pub const MAX_COUNT: usize = 10;

/// 兜底内容使用的模型标识
pub const DUMMY_MODEL: &str = "dummy";
/// 后端可用但没有产出可用行时的模型标识
pub const FALLBACK_MODEL: &str = "fallback";

const NOTE_NO_BACKEND: &str = "no API key configured, dummy response";
const NOTE_QUOTA: &str = "backend quota exhausted, dummy response";
const NOTE_EMPTY: &str = "backend returned no usable lines, fallback response";

/// 管线输入（字段为客户端原始值，由管线负责规范化）
#[derive(Debug, Clone)]
pub struct SuggestionRequest {
    pub kind: PromptKind,
    pub tone: Option<String>,
    pub persona: Option<String>,
    pub language: Option<String>,
    pub count: usize,
    pub model: Option<String>,
}

/// 单条建议
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub text: String,
    pub style: Tone,
    #[serde(rename = "why", skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// 各阶段的执行记录（debug 模式下返回给客户端）
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTrace {
    pub structured: bool,
    pub translated: bool,
    pub repaired: bool,
    /// 多样性过滤前的候选数
    pub candidates: usize,
    /// 多样性过滤后的条数
    pub unique: usize,
}

/// 管线输出
#[derive(Debug, Clone)]
pub struct SuggestionOutcome {
    pub model: String,
    pub language: ResolvedLanguage,
    pub suggestions: Vec<Suggestion>,
    pub coach: Vec<String>,
    pub note: Option<String>,
    pub trace: PipelineTrace,
}

/// 建议生成管线
pub struct SuggestionPipeline {
    config: Arc<AppConfig>,
    generation: Option<GenerationClient>,
    prompts: PromptService,
    languages: LanguageResolver,
    repair: FormatRepair,
}

impl SuggestionPipeline {
    /// `generation` 为 None 时管线只产出离线兜底内容
    pub fn new(config: Arc<AppConfig>, generation: Option<GenerationClient>) -> Self {
        let languages = LanguageResolver::new(&config.default_language);
        let repair = FormatRepair::new(config.repair_temperature);
        Self {
            config,
            generation,
            prompts: PromptService::new(),
            languages,
            repair,
        }
    }

    pub fn languages(&self) -> &LanguageResolver {
        &self.languages
    }

    /// 执行完整管线
    pub async fn run(&self, request: SuggestionRequest) -> AppResult<SuggestionOutcome> {
        let model_override = request
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        let ctx = self.prepare(request)?;

        let Some(generation) = &self.generation else {
            info!("No backend configured, returning dummy suggestions");
            return Ok(self.fallback(&ctx, DUMMY_MODEL, NOTE_NO_BACKEND, PipelineTrace::default()));
        };
        let model = model_override.unwrap_or_else(|| self.config.model.clone());

        info!(
            "Generating suggestions: model={}, language={}, tone={}, count={}",
            model,
            ctx.language.code,
            ctx.tone.as_str(),
            ctx.count
        );

        let messages = self.prompts.build_suggestion_messages(&ctx);
        let raw = match generation
            .generate(&model, messages, CallSpec::creative(self.config.creative_temperature))
            .await
        {
            Ok(raw) => raw,
            Err(GenerationError::QuotaExhausted) => {
                warn!("Backend quota exhausted, returning dummy suggestions");
                return Ok(self.fallback(&ctx, DUMMY_MODEL, NOTE_QUOTA, PipelineTrace::default()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut trace = PipelineTrace::default();

        let resolved = resolve_payload(&raw);
        trace.structured = resolved.structured;
        let resolved = self.check_language(generation, &model, &ctx, resolved).await;
        trace.translated = resolved.translated;

        trace.candidates = resolved.candidates.len();
        let mut lines = select_diverse(&resolved.texts(), ctx.count);
        trace.unique = lines.len();
        debug!("Resolved {} candidates, {} unique", trace.candidates, trace.unique);

        if lines.len() != ctx.count {
            let input = RepairInput {
                count: ctx.count,
                language: &ctx.language,
                tone: ctx.tone,
                candidates: &lines,
                raw: &raw,
            };
            let repaired = self.repair.run(generation, &self.prompts, &model, input).await;
            if let Some(repaired) = repaired {
                trace.repaired = true;
                let repaired = ResolvedOutput {
                    candidates: repaired.into_iter().map(Candidate::plain).collect(),
                    ..Default::default()
                };
                let repaired = self.check_language(generation, &model, &ctx, repaired).await;
                trace.translated |= repaired.translated;
                let repaired_lines = select_diverse(&repaired.texts(), ctx.count);
                if repaired_lines.len() >= lines.len() {
                    lines = repaired_lines;
                }
                trace.unique = lines.len();
            }
        }

        if lines.is_empty() {
            warn!("No usable suggestions after repair, returning fallback");
            return Ok(self.fallback(&ctx, FALLBACK_MODEL, NOTE_EMPTY, trace));
        }

        let lines = pad(lines, ctx.count, self.config.pad_policy);
        let suggestions = lines
            .into_iter()
            .map(|text| {
                let rationale = resolved
                    .candidates
                    .iter()
                    .find(|c| c.text == text)
                    .and_then(|c| c.rationale.clone());
                Suggestion {
                    text,
                    style: ctx.tone,
                    rationale,
                }
            })
            .collect::<Vec<_>>();

        let coach = if ctx.kind.wants_coach() {
            resolved.coach.into_iter().take(MAX_COACH_TIPS).collect()
        } else {
            Vec::new()
        };

        info!("Pipeline finished: {} suggestions, trace={:?}", suggestions.len(), trace);
        Ok(SuggestionOutcome {
            model,
            language: ctx.language,
            suggestions,
            coach,
            note: None,
            trace,
        })
    }

    /// 阶段：校验输入并规范化客户端字段
    fn prepare(&self, request: SuggestionRequest) -> AppResult<SuggestionContext> {
        let kind = match request.kind {
            PromptKind::Chat { input } => PromptKind::Chat {
                input: required(input, "input")?,
            },
            PromptKind::FollowUp { pasted_text } => PromptKind::FollowUp {
                pasted_text: required(pasted_text, "pastedText")?,
            },
            PromptKind::Opener { name, interests } => PromptKind::Opener {
                name: name.trim().to_string(),
                interests: interests.trim().to_string(),
            },
        };

        let language = normalize_language(request.language.as_deref(), &self.config.default_language);
        Ok(SuggestionContext {
            kind,
            tone: normalize_tone(request.tone.as_deref()),
            persona: normalize_persona(request.persona.as_deref()),
            language: self.languages.resolve(&language),
            count: request.count.clamp(1, MAX_COUNT),
        })
    }

    /// 阶段：语言检查，跟进模式下再过滤过短的行
    async fn check_language(
        &self,
        generation: &GenerationClient,
        model: &str,
        ctx: &SuggestionContext,
        output: ResolvedOutput,
    ) -> ResolvedOutput {
        let mut output =
            enforce_language(generation, &self.prompts, model, &self.languages, &ctx.language, output).await;

        // 中日文不按空格分词，不做词数过滤
        let counts_words = !matches!(ctx.language.key, LangKey::Ja | LangKey::Zh);
        if ctx.kind.wants_coach() && counts_words {
            output
                .candidates
                .retain(|c| c.text.split_whitespace().count() >= FOLLOW_UP_MIN_WORDS);
        }
        output
    }

    /// 离线兜底：不访问网络，输出只取决于输入、语气和语言
    fn fallback(
        &self,
        ctx: &SuggestionContext,
        model: &str,
        note: &str,
        trace: PipelineTrace,
    ) -> SuggestionOutcome {
        let hint_lang = ctx.language.hint_lang();
        let lines = dummy::suggestions(ctx.kind.topic_source(), ctx.tone, hint_lang);
        let lines = pad(select_diverse(&lines, ctx.count), ctx.count, self.config.pad_policy);
        let coach = if ctx.kind.wants_coach() {
            dummy::coach_tips(hint_lang)
        } else {
            Vec::new()
        };

        SuggestionOutcome {
            model: model.to_string(),
            language: ctx.language.clone(),
            suggestions: lines
                .into_iter()
                .map(|text| Suggestion {
                    text,
                    style: ctx.tone,
                    rationale: None,
                })
                .collect(),
            coach,
            note: Some(note.to_string()),
            trace,
        }
    }
}

fn required(value: String, field: &str) -> AppResult<String> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(AppError::MissingInput(format!("Provide a non-empty '{}'", field)));
    }
    Ok(value)
}
