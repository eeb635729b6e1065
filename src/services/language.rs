//! 语言解析
//!
//! 同一个语言代码对不同下游暴露不同视图：
//! - 粗粒度 key（15 种支持语言），用于选择语言相关逻辑
//! - 完整显示名（"Portuguese (Brazil)"），直接写进发给生成后端的 prompt
//! - 两值提示语言（en / nl），用于内置提示文案、dummy 内容和 OCR 引擎

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// 支持的粗粒度语言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LangKey {
    Ar,
    De,
    En,
    Es,
    Fr,
    Hi,
    It,
    Ja,
    Ko,
    Nl,
    Pl,
    Pt,
    Ru,
    Tr,
    Zh,
}

/// 语言表：(代码, key, 显示名)
const LANGUAGES: &[(&str, LangKey, &str)] = &[
    ("ar", LangKey::Ar, "Arabic"),
    ("de", LangKey::De, "German"),
    ("en", LangKey::En, "English"),
    ("es", LangKey::Es, "Spanish"),
    ("fr", LangKey::Fr, "French"),
    ("hi", LangKey::Hi, "Hindi"),
    ("it", LangKey::It, "Italian"),
    ("ja", LangKey::Ja, "Japanese"),
    ("ko", LangKey::Ko, "Korean"),
    ("nl", LangKey::Nl, "Dutch"),
    ("pl", LangKey::Pl, "Polish"),
    ("pt", LangKey::Pt, "Portuguese"),
    ("ru", LangKey::Ru, "Russian"),
    ("tr", LangKey::Tr, "Turkish"),
    ("zh", LangKey::Zh, "Chinese (Simplified)"),
];

/// 带区域的显示名覆盖
const REGIONAL_NAMES: &[(&str, &str)] = &[
    ("pt-br", "Portuguese (Brazil)"),
    ("pt-pt", "Portuguese (Portugal)"),
    ("zh-hans", "Chinese (Simplified)"),
    ("zh-cn", "Chinese (Simplified)"),
    ("zh-sg", "Chinese (Simplified)"),
    ("zh-hant", "Chinese (Traditional)"),
    ("zh-tw", "Chinese (Traditional)"),
    ("zh-hk", "Chinese (Traditional)"),
];

impl LangKey {
    /// 从任意语言代码解析粗粒度 key
    pub fn from_code(code: &str) -> Option<LangKey> {
        let lower = code.trim().to_lowercase();
        let base = lower.split(['-', '_']).next().unwrap_or_default();
        LANGUAGES
            .iter()
            .find(|(c, _, _)| *c == base)
            .map(|(_, key, _)| *key)
    }

    pub fn code(&self) -> &'static str {
        LANGUAGES
            .iter()
            .find(|(_, key, _)| key == self)
            .map(|(c, _, _)| *c)
            .unwrap_or("en")
    }

    /// 所有支持的语言代码
    pub fn supported_codes() -> Vec<&'static str> {
        LANGUAGES.iter().map(|(c, _, _)| *c).collect()
    }
}

/// 内置提示文案支持的两种语言
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintLang {
    En,
    Nl,
}

/// 解析后的目标语言
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLanguage {
    /// 规范化后的完整代码（如 `pt-br`）
    pub code: String,
    pub key: LangKey,
    /// prompt 中使用的完整显示名
    pub display_name: String,
}

impl ResolvedLanguage {
    /// 两值提示语言：只有荷兰语映射到 nl，其余一律 en
    pub fn hint_lang(&self) -> HintLang {
        if self.key == LangKey::Nl {
            HintLang::Nl
        } else {
            HintLang::En
        }
    }

    /// OCR 引擎的语言参数（词汇有限，只区分荷兰语和英语）
    pub fn ocr_engine_code(&self) -> &'static str {
        match self.hint_lang() {
            HintLang::Nl => "nld",
            HintLang::En => "eng",
        }
    }
}

/// 语言解析器，持有默认语言
#[derive(Debug, Clone)]
pub struct LanguageResolver {
    default: ResolvedLanguage,
}

impl LanguageResolver {
    pub fn new(default_code: &str) -> Self {
        let default = resolve_known(default_code).unwrap_or_else(|| ResolvedLanguage {
            code: "en".to_string(),
            key: LangKey::En,
            display_name: "English".to_string(),
        });
        Self { default }
    }

    pub fn default_language(&self) -> &ResolvedLanguage {
        &self.default
    }

    /// 解析语言代码；无法识别时返回默认语言，从不失败
    pub fn resolve(&self, code: &str) -> ResolvedLanguage {
        resolve_known(code).unwrap_or_else(|| self.default.clone())
    }

    /// 目标语言是否就是默认语言
    pub fn is_default(&self, language: &ResolvedLanguage) -> bool {
        language.key == self.default.key
    }

    /// 文本是否像默认语言（词表启发式）
    ///
    /// 默认语言没有词表时总是返回 false，即不做语言检查。
    pub fn looks_like_default(&self, text: &str) -> bool {
        match self.default.key {
            LangKey::En => ENGLISH_LEXICON.is_match(text),
            LangKey::Nl => DUTCH_LEXICON.is_match(text),
            _ => false,
        }
    }
}

fn resolve_known(code: &str) -> Option<ResolvedLanguage> {
    let code = code.trim().to_lowercase().replace('_', "-");
    let key = LangKey::from_code(&code)?;
    let display_name = REGIONAL_NAMES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .or_else(|| {
            LANGUAGES
                .iter()
                .find(|(_, k, _)| *k == key)
                .map(|(_, _, name)| *name)
        })
        .unwrap_or("English")
        .to_string();

    Some(ResolvedLanguage {
        code,
        key,
        display_name,
    })
}

// 默认语言功能词表
static ENGLISH_LEXICON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(the|you|your|let's|how's|what's|life|adventure|story|together|ready)\b").unwrap()
});
static DUTCH_LEXICON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(het|een|jij|jouw|niet|wat|hoe|samen|leuk|eigenlijk)\b").unwrap()
});
