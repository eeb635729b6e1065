//! 客户端字段规范化
//!
//! 把自由格式的 tone / persona / language 字段映射到封闭的枚举值。
//! 别名集中在下方的映射表里，纯函数、幂等、不会失败。

use serde::{Deserialize, Serialize};

use super::language::LangKey;

/// 语气
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Safe,
    Playful,
    Flirty,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Safe => "safe",
            Tone::Playful => "playful",
            Tone::Flirty => "flirty",
        }
    }
}

/// 人设
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    Funny,
    Classy,
    Wing,
}

impl Persona {
    pub fn as_str(&self) -> &'static str {
        match self {
            Persona::Funny => "funny",
            Persona::Classy => "classy",
            Persona::Wing => "wing",
        }
    }
}

/// 语气别名表
const TONE_ALIASES: &[(&str, Tone)] = &[
    ("safe", Tone::Safe),
    ("friendly", Tone::Safe),
    ("playful", Tone::Playful),
    ("flirty", Tone::Flirty),
    ("flirt", Tone::Flirty),
    ("flirting", Tone::Flirty),
];

/// 人设别名表
const PERSONA_ALIASES: &[(&str, Persona)] = &[
    ("funny", Persona::Funny),
    ("classy", Persona::Classy),
    ("wing", Persona::Wing),
    ("wingwoman", Persona::Wing),
    ("wingman", Persona::Wing),
];

fn canonical(raw: Option<&str>) -> String {
    raw.unwrap_or_default().trim().to_lowercase()
}

/// 规范化语气，未知或缺失时为 `safe`
pub fn normalize_tone(raw: Option<&str>) -> Tone {
    let value = canonical(raw);
    TONE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == value)
        .map(|(_, tone)| *tone)
        .unwrap_or_default()
}

/// 规范化人设，未知或缺失时为 None（表示“无人设”）
pub fn normalize_persona(raw: Option<&str>) -> Option<Persona> {
    let value = canonical(raw);
    PERSONA_ALIASES
        .iter()
        .find(|(alias, _)| *alias == value)
        .map(|(_, persona)| *persona)
}

/// 规范化语言代码
///
/// 返回小写的完整代码（保留区域，如 `pt-br`、`zh-hans`），
/// 基础语言不在支持列表中时返回默认语言。
pub fn normalize_language(raw: Option<&str>, default_language: &str) -> String {
    let value = canonical(raw).replace('_', "-");
    if value.is_empty() {
        return default_language.to_string();
    }
    match LangKey::from_code(&value) {
        Some(_) => value,
        None => default_language.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_tone() {
        assert_eq!(normalize_tone(Some("flirt")), Tone::Flirty);
        assert_eq!(normalize_tone(Some(" Playful ")), Tone::Playful);
        assert_eq!(normalize_tone(Some("spicy")), Tone::Safe);
        assert_eq!(normalize_tone(None), Tone::Safe);
    }

    #[test]
    fn test_normalize_persona() {
        assert_eq!(normalize_persona(Some("wingwoman")), Some(Persona::Wing));
        assert_eq!(normalize_persona(Some("WINGMAN")), Some(Persona::Wing));
        assert_eq!(normalize_persona(Some("classy")), Some(Persona::Classy));
        assert_eq!(normalize_persona(Some("pirate")), None);
        assert_eq!(normalize_persona(None), None);
    }

    #[test]
    fn test_normalize_language() {
        assert_eq!(normalize_language(Some("pt-BR"), "en"), "pt-br");
        assert_eq!(normalize_language(Some("zh_Hans"), "en"), "zh-hans");
        assert_eq!(normalize_language(Some("xx"), "en"), "en");
        assert_eq!(normalize_language(Some(""), "nl"), "nl");
        assert_eq!(normalize_language(None, "en"), "en");
    }

    #[test]
    fn test_normalization_is_idempotent() {
        for raw in ["flirt", "playful", "SAFE", "nonsense", ""] {
            let once = normalize_tone(Some(raw));
            assert_eq!(normalize_tone(Some(once.as_str())), once);
        }
        for raw in ["wingwoman", "funny", "Classy", "nonsense"] {
            let once = normalize_persona(Some(raw));
            let twice = normalize_persona(once.map(|p| p.as_str()));
            assert_eq!(twice, once);
        }
        for raw in ["pt-BR", "de", "ZH_hant", "xx", "nl-be"] {
            let once = normalize_language(Some(raw), "en");
            assert_eq!(normalize_language(Some(&once), "en"), once);
        }
    }
}
