//! Prompt 构建服务
//!
//! 负责为建议生成、翻译、格式修复、回复生成和视觉 OCR 构建消息。
//! 相同输入总是得到逐字节相同的 prompt，这里不引入任何随机性。

use crate::llm::ChatMessage;

use super::language::{HintLang, ResolvedLanguage};
use super::normalizer::{Persona, Tone};

/// 输入上下文的最大长度（字符）
const MAX_CONTEXT_CHARS: usize = 4000;

/// 跟进模式下每条建议的最少词数
pub const FOLLOW_UP_MIN_WORDS: usize = 5;

/// 教练提示上限
pub const MAX_COACH_TIPS: usize = 2;

/// 建议生成的输入类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptKind {
    /// 针对一段聊天文本给出建议回复
    Chat { input: String },
    /// 基于对方资料写开场白
    Opener { name: String, interests: String },
    /// 分析整段聊天，给出跟进句和教练提示
    FollowUp { pasted_text: String },
}

impl PromptKind {
    /// 是否需要教练提示
    pub fn wants_coach(&self) -> bool {
        matches!(self, PromptKind::FollowUp { .. })
    }

    /// 用于 dummy 内容的主题文本
    pub fn topic_source(&self) -> &str {
        match self {
            PromptKind::Chat { input } => input,
            PromptKind::Opener { interests, name } => {
                if interests.is_empty() {
                    name
                } else {
                    interests
                }
            }
            PromptKind::FollowUp { pasted_text } => pasted_text,
        }
    }
}

/// 一次建议生成的 prompt 上下文
#[derive(Debug, Clone)]
pub struct SuggestionContext {
    pub kind: PromptKind,
    pub tone: Tone,
    pub persona: Option<Persona>,
    pub language: ResolvedLanguage,
    pub count: usize,
}

/// 人设提示
pub fn persona_hint(lang: HintLang, persona: Option<Persona>) -> &'static str {
    match (lang, persona) {
        (HintLang::En, Some(Persona::Funny)) => "Use light humor.",
        (HintLang::En, Some(Persona::Classy)) => "Keep it elegant and confident.",
        (HintLang::En, Some(Persona::Wing)) => "Be supportive and socially smart, like a wingwoman.",
        (HintLang::En, None) => "Be natural.",
        (HintLang::Nl, Some(Persona::Funny)) => "Gebruik lichte humor.",
        (HintLang::Nl, Some(Persona::Classy)) => "Houd het elegant en zelfverzekerd.",
        (HintLang::Nl, Some(Persona::Wing)) => "Wees steunend en sociaal slim, zoals een wingwoman.",
        (HintLang::Nl, None) => "Wees natuurlijk.",
    }
}

/// 语气提示
pub fn tone_hint(lang: HintLang, tone: Tone) -> &'static str {
    match (lang, tone) {
        (HintLang::En, Tone::Flirty) => "Flirty but respectful.",
        (HintLang::En, Tone::Playful) => "Playful and positive.",
        (HintLang::En, Tone::Safe) => "Safe and friendly.",
        (HintLang::Nl, Tone::Flirty) => "Flirterig maar respectvol.",
        (HintLang::Nl, Tone::Playful) => "Speels en positief.",
        (HintLang::Nl, Tone::Safe) => "Veilig en vriendelijk.",
    }
}

/// Prompt 服务
pub struct PromptService;

impl PromptService {
    /// 创建新的 Prompt 服务
    pub fn new() -> Self {
        Self
    }

    /// 建议列表的 JSON 结构说明
    pub fn json_list_schema(&self, tone: Tone, with_coach: bool) -> String {
        let coach = if with_coach {
            r#","coach":["<tip1>","<tip2>"]"#
        } else {
            ""
        };
        format!(
            r#"Return ONLY valid JSON: {{"suggestions":[{{"text":"<line>","style":"{}","why":"<short reason>"}}]{}}}. No extra keys, no text before/after JSON."#,
            tone.as_str(),
            coach
        )
    }

    /// 构建主生成调用的消息
    pub fn build_suggestion_messages(&self, ctx: &SuggestionContext) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.suggestion_system(ctx)),
            ChatMessage::user(self.suggestion_user(ctx)),
        ]
    }

    fn suggestion_system(&self, ctx: &SuggestionContext) -> String {
        let lname = &ctx.language.display_name;
        let persona = ctx.persona.map(|p| p.as_str()).unwrap_or("none");
        let mut rules = vec![
            "You are Flairy, a concise dating conversation coach.".to_string(),
            format!(
                "Produce EXACTLY {} standalone natural lines, one per suggestion.",
                ctx.count
            ),
            "No numbering. No quotes. No disclaimers.".to_string(),
            format!("You MUST answer ONLY in {}. Use only {}. Do not mix languages.", lname, lname),
            format!("Persona = {}. Tone = {}.", persona, ctx.tone.as_str()),
        ];

        match &ctx.kind {
            PromptKind::Chat { .. } => {}
            PromptKind::Opener { .. } => {
                rules.push("Return short, message-ready openers (max ~120 characters each).".to_string());
                rules.push("Vary the angle (playful, curious, direct). Avoid emojis.".to_string());
            }
            PromptKind::FollowUp { .. } => {
                rules.push(format!(
                    "Each suggestion has at least {} words and uses a different angle (playful, direct, curious).",
                    FOLLOW_UP_MIN_WORDS
                ));
                rules.push("Do not start with the same 2 words as another suggestion or the original chat.".to_string());
                rules.push(format!(
                    "Add {} short coach tips about structure and hooks.",
                    MAX_COACH_TIPS
                ));
            }
        }

        rules.join("\n")
    }

    fn suggestion_user(&self, ctx: &SuggestionContext) -> String {
        let hint_lang = ctx.language.hint_lang();
        let hints = format!(
            "{} {}",
            persona_hint(hint_lang, ctx.persona),
            tone_hint(hint_lang, ctx.tone)
        );
        let lname = &ctx.language.display_name;

        let context = match &ctx.kind {
            PromptKind::Chat { input } => format!("Context: {}", truncate_chars(input, MAX_CONTEXT_CHARS)),
            PromptKind::Opener { name, interests } => format!(
                "Context:\n- Name: {}\n- Interests: {}\n- Task: Create {} opening lines for a dating app conversation.",
                dash_if_empty(name),
                dash_if_empty(interests),
                ctx.count
            ),
            PromptKind::FollowUp { pasted_text } => format!(
                "Chat text (flattened):\n{}\n\nReturn EXACTLY {} follow-up lines (at least {} words each) and {} coach tips.",
                truncate_chars(pasted_text, MAX_CONTEXT_CHARS),
                ctx.count,
                FOLLOW_UP_MIN_WORDS,
                MAX_COACH_TIPS
            ),
        };

        format!(
            "{}\nWrite ALL outputs in: {}.\n{}\n{}",
            hints,
            lname,
            context,
            self.json_list_schema(ctx.tone, ctx.kind.wants_coach())
        )
    }

    /// 构建翻译调用的消息（保留 S:/C: 行前缀）
    pub fn build_translation_messages(&self, language: &ResolvedLanguage, tagged_text: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(format!(
                "Translate to natural {}. Keep the \"S:\" and \"C:\" line prefixes exactly as they are. Return plain text lines, no quotes.",
                language.display_name
            )),
            ChatMessage::user(tagged_text),
        ]
    }

    /// 构建格式修复调用的消息
    pub fn build_repair_messages(
        &self,
        count: usize,
        language: &ResolvedLanguage,
        tone: Tone,
        content: &str,
    ) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(format!(
                "Convert the input into EXACTLY {} standalone natural {} lines (style: {}). Each on a new line. No numbering. No quotes.",
                count,
                language.display_name,
                tone.as_str()
            )),
            ChatMessage::user(content),
        ]
    }

    /// 构建回复生成调用的消息
    pub fn build_reply_messages(
        &self,
        language: &ResolvedLanguage,
        tone: Tone,
        persona: Option<Persona>,
        chat_text: &str,
        last_question: Option<&str>,
    ) -> Vec<ChatMessage> {
        let lname = &language.display_name;
        let system = format!(
            "You are Flairy, a dating chat reply assistant.\n\
             Write all outputs in {lname}. Use only {lname}. Do not mix languages.\n\
             Persona = {}. Tone = {}.\n\
             Return ONLY JSON: {{\"direct\":\"...\",\"alt1\":\"...\",\"alt2\":\"...\",\"coach\":[\"tip1\",\"tip2\"]}}.",
            persona.map(|p| p.as_str()).unwrap_or("none"),
            tone.as_str(),
        );

        let task = match last_question {
            Some(question) => format!(
                "The last question in the chat is:\n{}\n\nGive a direct answer (direct), two answers from different angles (alt1, alt2) and {} short coach tips.",
                question, MAX_COACH_TIPS
            ),
            None => format!(
                "No question found in the chat. Infer a sensible next line from the context: a direct line (direct), two alternatives from different angles (alt1, alt2) and {} short coach tips.",
                MAX_COACH_TIPS
            ),
        };

        let hint_lang = language.hint_lang();
        let user = format!(
            "{} {}\nChat text:\n{}\n\n{}",
            persona_hint(hint_lang, persona),
            tone_hint(hint_lang, tone),
            truncate_chars(chat_text, MAX_CONTEXT_CHARS),
            task
        );

        vec![ChatMessage::system(system), ChatMessage::user(user)]
    }

    /// 构建视觉 OCR 调用的消息
    pub fn build_vision_messages(&self, language: &ResolvedLanguage, data_url: &str) -> Vec<ChatMessage> {
        let instruction = match language.hint_lang() {
            HintLang::Nl => "Lees ALLE chat-tekst uit de afbeelding. Geef uitsluitend de platte tekst terug (geen opsomming of uitleg).".to_string(),
            HintLang::En => format!(
                "Extract ALL chat text from the image. The chat is likely in {}. Return plain text only (no bullets or explanations).",
                language.display_name
            ),
        };
        vec![
            ChatMessage::system("You are a precise OCR assistant. Return only the raw plain text you read."),
            ChatMessage::user_with_image(instruction, data_url),
        ]
    }
}

impl Default for PromptService {
    fn default() -> Self {
        Self::new()
    }
}

fn dash_if_empty(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}

/// 按字符截断
fn truncate_chars(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        content.to_string()
    } else {
        format!("{}... (truncated)", content.chars().take(max_chars).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MessageContent;
    use crate::services::language::LanguageResolver;

    fn ctx(kind: PromptKind, lang: &str) -> SuggestionContext {
        SuggestionContext {
            kind,
            tone: Tone::Playful,
            persona: Some(Persona::Wing),
            language: LanguageResolver::new("en").resolve(lang),
            count: 5,
        }
    }

    fn text(msg: &ChatMessage) -> String {
        msg.content.as_text()
    }

    #[test]
    fn test_system_prompt_mandates_count_and_language() {
        let service = PromptService::new();
        let messages = service.build_suggestion_messages(&ctx(
            PromptKind::Chat {
                input: "Tell me about your weekend".into(),
            },
            "pt-BR",
        ));
        assert_eq!(messages.len(), 2);
        let system = text(&messages[0]);
        assert!(system.contains("EXACTLY 5 standalone"));
        assert!(system.contains("ONLY in Portuguese (Brazil)"));
        assert!(system.contains("Do not mix languages"));
        assert!(system.contains("No numbering. No quotes."));

        let user = text(&messages[1]);
        assert!(user.contains("Be supportive and socially smart"));
        assert!(user.contains("Playful and positive."));
        assert!(user.contains("Context: Tell me about your weekend"));
        assert!(user.contains(r#""style":"playful""#));
        assert!(!user.contains("coach"));
    }

    #[test]
    fn test_prompts_are_deterministic() {
        let service = PromptService::new();
        let c = ctx(PromptKind::Chat { input: "hi".into() }, "de");
        let a = service.build_suggestion_messages(&c);
        let b = service.build_suggestion_messages(&c);
        assert_eq!(text(&a[0]), text(&b[0]));
        assert_eq!(text(&a[1]), text(&b[1]));
    }

    #[test]
    fn test_dutch_hints_and_follow_up_schema() {
        let service = PromptService::new();
        let messages = service.build_suggestion_messages(&ctx(
            PromptKind::FollowUp {
                pasted_text: "hoi! hoe gaat het?".into(),
            },
            "nl",
        ));
        let user = text(&messages[1]);
        assert!(user.contains("Speels en positief."));
        assert!(user.contains(r#""coach":["<tip1>","<tip2>"]"#));
        assert!(text(&messages[0]).contains("at least 5 words"));
    }

    #[test]
    fn test_opener_context_uses_dash_for_missing_fields() {
        let service = PromptService::new();
        let messages = service.build_suggestion_messages(&ctx(
            PromptKind::Opener {
                name: "Sam".into(),
                interests: String::new(),
            },
            "en",
        ));
        let user = text(&messages[1]);
        assert!(user.contains("- Name: Sam"));
        assert!(user.contains("- Interests: -"));
    }

    #[test]
    fn test_reply_prompt_without_question() {
        let service = PromptService::new();
        let lang = LanguageResolver::new("en").resolve("fr");
        let messages = service.build_reply_messages(&lang, Tone::Safe, None, "salut", None);
        assert!(text(&messages[0]).contains("Use only French"));
        assert!(text(&messages[1]).contains("No question found"));
    }

    #[test]
    fn test_vision_message_carries_image() {
        let service = PromptService::new();
        let lang = LanguageResolver::new("en").resolve("en");
        let messages = service.build_vision_messages(&lang, "data:image/png;base64,AAAA");
        match &messages[1].content {
            MessageContent::Parts(parts) => assert_eq!(parts.len(), 2),
            MessageContent::Text(_) => panic!("expected image parts"),
        }
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("abcdef", 3), "abc... (truncated)");
    }
}
