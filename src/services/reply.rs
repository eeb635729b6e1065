//! 回复生成
//!
//! 从聊天文本中找出最后一个问题，单次调用生成一个直接回答、两个不同角度的备选和两条教练提示。
//! 不做修复或重试；解析失败时返回空的回复包而不是错误。

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

use super::dummy;
use super::generation::{CallSpec, GenerationClient, GenerationError};
use super::language::{HintLang, LangKey, LanguageResolver, ResolvedLanguage};
use super::normalizer::{normalize_language, normalize_persona, normalize_tone};
use super::pipeline::DUMMY_MODEL;
use super::prompt_service::{PromptService, MAX_COACH_TIPS};
use super::resolver::{clean_line, extract_json};

static QUESTION_SENTENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^.!?\n]*\?").unwrap());

/// 找出最后一个问题：先从末尾逐行查找以 `?` 结尾的行，再用正则找最后一个问句
///
/// OCR 文本会被压成一行，所以只有单句的行才直接采用；
/// 行内还有别的句末标点时交给正则取最后一句。
pub fn extract_last_question(text: &str) -> Option<String> {
    let last_line = text
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.ends_with('?') && l.len() > 1);
    if let Some(line) = last_line {
        let body = &line[..line.len() - 1];
        if !body.contains(['.', '!', '?']) {
            return Some(line.to_string());
        }
    }

    QUESTION_SENTENCE
        .find_iter(text)
        .map(|m| m.as_str().trim())
        .filter(|q| q.len() > 1)
        .last()
        .map(str::to_string)
}

/// 回复包
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyBundle {
    pub last_question: String,
    pub direct: String,
    pub alt1: String,
    pub alt2: String,
    pub coach: Vec<String>,
}

impl ReplyBundle {
    fn empty(last_question: Option<&str>) -> Self {
        Self {
            last_question: last_question.unwrap_or_default().to_string(),
            ..Default::default()
        }
    }
}

#[derive(Deserialize)]
struct RawReply {
    #[serde(default)]
    direct: String,
    #[serde(default)]
    alt1: String,
    #[serde(default)]
    alt2: String,
    #[serde(default)]
    coach: Vec<String>,
}

/// 解析后端输出；格式不对时返回 None
pub fn parse_reply(payload: &str, last_question: Option<&str>) -> Option<ReplyBundle> {
    let raw: RawReply = serde_json::from_str(extract_json(payload)?).ok()?;
    Some(ReplyBundle {
        last_question: last_question.unwrap_or_default().to_string(),
        direct: clean_line(&raw.direct),
        alt1: clean_line(&raw.alt1),
        alt2: clean_line(&raw.alt2),
        coach: raw
            .coach
            .iter()
            .map(|c| clean_line(c))
            .filter(|c| !c.is_empty())
            .take(MAX_COACH_TIPS)
            .collect(),
    })
}

/// 教练提示不足两条时用内置提示补齐；内置提示只有英文和荷兰文，其他语言保持原样
fn fill_coach(coach: &mut Vec<String>, language: &ResolvedLanguage) {
    if !matches!(language.key, LangKey::En | LangKey::Nl) {
        return;
    }
    for tip in dummy::coach_tips(language.hint_lang()) {
        if coach.len() >= MAX_COACH_TIPS {
            break;
        }
        if !coach.contains(&tip) {
            coach.push(tip);
        }
    }
}

/// 离线兜底回复
pub fn dummy_bundle(last_question: Option<&str>, lang: HintLang) -> ReplyBundle {
    let (direct, alt1, alt2) = match lang {
        HintLang::En => (
            "Good question! Honestly it depends on the day, what about you?",
            "Ha, you go first, I'm curious what you'd say.",
            "Let me answer that one over coffee sometime?",
        ),
        HintLang::Nl => (
            "Goede vraag! Eerlijk gezegd hangt het van de dag af, en jij?",
            "Haha, jij eerst, ik ben benieuwd wat jij zou zeggen.",
            "Zal ik die vraag een keer bij een koffie beantwoorden?",
        ),
    };
    ReplyBundle {
        last_question: last_question.unwrap_or_default().to_string(),
        direct: direct.to_string(),
        alt1: alt1.to_string(),
        alt2: alt2.to_string(),
        coach: dummy::coach_tips(lang),
    }
}

/// 回复请求（字段为客户端原始值）
#[derive(Debug, Clone, Default)]
pub struct ReplyRequest {
    pub text: String,
    pub tone: Option<String>,
    pub persona: Option<String>,
    pub language: Option<String>,
    pub model: Option<String>,
}

/// 回复结果
#[derive(Debug, Clone)]
pub struct ReplyOutcome {
    pub bundle: ReplyBundle,
    pub model: String,
    pub language: ResolvedLanguage,
}

/// 回复生成器
pub struct ReplyGenerator {
    config: Arc<AppConfig>,
    generation: Option<GenerationClient>,
    prompts: PromptService,
    languages: LanguageResolver,
}

impl ReplyGenerator {
    pub fn new(config: Arc<AppConfig>, generation: Option<GenerationClient>) -> Self {
        let languages = LanguageResolver::new(&config.default_language);
        Self {
            config,
            generation,
            prompts: PromptService::new(),
            languages,
        }
    }

    /// 解析请求语言（OCR 也使用同一个结果）
    pub fn resolve_language(&self, raw: Option<&str>) -> ResolvedLanguage {
        let code = normalize_language(raw, &self.config.default_language);
        self.languages.resolve(&code)
    }

    pub async fn generate(&self, request: ReplyRequest) -> AppResult<ReplyOutcome> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(AppError::MissingInput("Provide 'text' or an image".to_string()));
        }

        let language = self.resolve_language(request.language.as_deref());
        let tone = normalize_tone(request.tone.as_deref());
        let persona = normalize_persona(request.persona.as_deref());
        let last_question = extract_last_question(text);
        info!(
            "Generating reply: language={}, question_found={}",
            language.code,
            last_question.is_some()
        );

        let Some(generation) = &self.generation else {
            return Ok(ReplyOutcome {
                bundle: dummy_bundle(last_question.as_deref(), language.hint_lang()),
                model: DUMMY_MODEL.to_string(),
                language,
            });
        };

        let model = request
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.config.model.clone());

        let messages = self.prompts.build_reply_messages(
            &language,
            tone,
            persona,
            text,
            last_question.as_deref(),
        );
        let raw = match generation
            .generate(&model, messages, CallSpec::creative(self.config.creative_temperature))
            .await
        {
            Ok(raw) => raw,
            Err(GenerationError::QuotaExhausted) => {
                warn!("Backend quota exhausted, returning dummy reply");
                return Ok(ReplyOutcome {
                    bundle: dummy_bundle(last_question.as_deref(), language.hint_lang()),
                    model: DUMMY_MODEL.to_string(),
                    language,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let bundle = match parse_reply(&raw, last_question.as_deref()) {
            Some(mut bundle) => {
                if !bundle.direct.is_empty() {
                    fill_coach(&mut bundle.coach, &language);
                }
                bundle
            }
            None => {
                warn!("Reply output was not valid JSON, returning empty bundle");
                ReplyBundle::empty(last_question.as_deref())
            }
        };

        Ok(ReplyOutcome {
            bundle,
            model,
            language,
        })
    }
}
