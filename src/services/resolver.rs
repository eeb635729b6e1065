//! 后端响应解析
//!
//! 阶段顺序：
//! 1. 结构化解析：按请求的 JSON 结构提取建议数组
//! 2. 行回退：解析失败时按行切分，去掉项目符号、编号和引号
//! 3. 语言检查：目标语言不是默认语言且文本像默认语言时，发起一次温度为 0 的翻译，
//!    用 `S:` / `C:` 前缀保持多字段结构；翻译失败不致命，沿用原文

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::generation::{CallSpec, GenerationClient};
use super::language::{LanguageResolver, ResolvedLanguage};
use super::prompt_service::PromptService;

const SUGGESTION_TAG: &str = "S:";
const COACH_TAG: &str = "C:";

static LEADING_DECORATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?:\s*(?:[-*•·]|\d+[.):]|\(\d+\))\s*)*["“”„«»‘’\s]*"#).unwrap()
});
static TRAILING_DECORATION: Lazy<Regex> = Lazy::new(|| Regex::new(r#"["“”„«»‘’\s]+$"#).unwrap());

/// 单条候选
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub text: String,
    pub rationale: Option<String>,
}

impl Candidate {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            rationale: None,
        }
    }
}

/// 解析结果：未去重、未定长的候选列表
#[derive(Debug, Clone, Default)]
pub struct ResolvedOutput {
    pub candidates: Vec<Candidate>,
    pub coach: Vec<String>,
    /// 是否来自结构化解析
    pub structured: bool,
    /// 是否经过翻译
    pub translated: bool,
}

impl ResolvedOutput {
    /// 候选文本列表
    pub fn texts(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.text.clone()).collect()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSuggestion {
    Text(String),
    Object {
        text: String,
        #[serde(default)]
        why: Option<String>,
    },
}

#[derive(Deserialize)]
struct RawPayload {
    suggestions: Vec<RawSuggestion>,
    #[serde(default)]
    coach: Vec<String>,
}

/// 去掉行首的项目符号/编号/引号和行尾引号
pub fn clean_line(line: &str) -> String {
    let stripped = LEADING_DECORATION.replace(line, "");
    TRAILING_DECORATION.replace(&stripped, "").trim().to_string()
}

/// 从可能被 markdown 代码块包裹的文本中取出 JSON 对象
pub fn extract_json(payload: &str) -> Option<&str> {
    let trimmed = payload.trim();
    let body = match trimmed.find("```") {
        Some(start) => {
            let after = &trimmed[start + 3..];
            let after = after.strip_prefix("json").unwrap_or(after);
            match after.find("```") {
                Some(end) => after[..end].trim(),
                None => after.trim(),
            }
        }
        None => trimmed,
    };
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (start < end).then(|| &body[start..=end])
}

/// 阶段 1：结构化解析，数组为空或格式不对时返回 None
pub fn try_structured(payload: &str) -> Option<ResolvedOutput> {
    let json = extract_json(payload)?;
    let raw: RawPayload = match serde_json::from_str(json) {
        Ok(raw) => raw,
        Err(e) => {
            debug!("Structured parse failed: {}", e);
            return None;
        }
    };

    let candidates: Vec<Candidate> = raw
        .suggestions
        .into_iter()
        .filter_map(|s| {
            let (text, why) = match s {
                RawSuggestion::Text(text) => (text, None),
                RawSuggestion::Object { text, why } => (text, why),
            };
            let text = clean_line(&text);
            if text.is_empty() {
                return None;
            }
            let rationale = why.map(|w| w.trim().to_string()).filter(|w| !w.is_empty());
            Some(Candidate { text, rationale })
        })
        .collect();

    if candidates.is_empty() {
        return None;
    }

    Some(ResolvedOutput {
        candidates,
        coach: raw
            .coach
            .iter()
            .map(|c| clean_line(c))
            .filter(|c| !c.is_empty())
            .collect(),
        structured: true,
        translated: false,
    })
}

/// 阶段 2：按行切分
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(clean_line)
        .filter(|l| !l.is_empty())
        .collect()
}

/// 阶段 1 + 2
pub fn resolve_payload(payload: &str) -> ResolvedOutput {
    if let Some(output) = try_structured(payload) {
        return output;
    }
    ResolvedOutput {
        candidates: split_lines(payload).into_iter().map(Candidate::plain).collect(),
        ..Default::default()
    }
}

/// 带前缀的翻译输入
fn tagged_text(output: &ResolvedOutput) -> String {
    output
        .candidates
        .iter()
        .map(|c| format!("{} {}", SUGGESTION_TAG, c.text))
        .chain(output.coach.iter().map(|c| format!("{} {}", COACH_TAG, c)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 解析翻译结果，返回 (建议, 教练提示)
///
/// 模型丢掉了全部前缀时，把所有行都当作建议。
pub fn parse_tagged(text: &str) -> (Vec<String>, Vec<String>) {
    let mut suggestions = Vec::new();
    let mut coach = Vec::new();
    let mut untagged = Vec::new();

    for line in text.lines().map(clean_line).filter(|l| !l.is_empty()) {
        if let Some(rest) = line.strip_prefix(SUGGESTION_TAG) {
            suggestions.push(clean_line(rest));
        } else if let Some(rest) = line.strip_prefix(COACH_TAG) {
            coach.push(clean_line(rest));
        } else {
            untagged.push(line);
        }
    }

    if suggestions.is_empty() && coach.is_empty() {
        return (untagged, coach);
    }
    suggestions.retain(|s| !s.is_empty());
    coach.retain(|c| !c.is_empty());
    (suggestions, coach)
}

/// 输出整体是否需要翻译
pub fn needs_translation(
    resolver: &LanguageResolver,
    language: &ResolvedLanguage,
    output: &ResolvedOutput,
) -> bool {
    if resolver.is_default(language) || output.candidates.is_empty() {
        return false;
    }
    output
        .candidates
        .iter()
        .map(|c| c.text.as_str())
        .chain(output.coach.iter().map(String::as_str))
        .any(|t| resolver.looks_like_default(t))
}

/// 阶段 3：语言一致性检查
pub async fn enforce_language(
    generation: &GenerationClient,
    prompts: &PromptService,
    model: &str,
    resolver: &LanguageResolver,
    language: &ResolvedLanguage,
    mut output: ResolvedOutput,
) -> ResolvedOutput {
    if !needs_translation(resolver, language, &output) {
        return output;
    }

    info!("Output looks like default language, translating to {}", language.display_name);
    let messages = prompts.build_translation_messages(language, &tagged_text(&output));
    let translated = match generation.generate(model, messages, CallSpec::translation()).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Translation failed, keeping untranslated text: {}", e);
            return output;
        }
    };

    let (suggestions, coach) = parse_tagged(&translated);
    if !suggestions.is_empty() {
        // 理由没有参与翻译，丢弃以免混入默认语言
        output.candidates = suggestions.into_iter().map(Candidate::plain).collect();
        output.translated = true;
    }
    if !coach.is_empty() {
        output.coach = coach;
        output.translated = true;
    }
    output
}
