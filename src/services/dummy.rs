//! 离线兜底内容
//!
//! 没有配置后端凭据或配额耗尽时使用。输出只取决于输入文本、语气和提示语言，
//! 不发起任何网络请求。

use super::language::HintLang;
use super::normalizer::Tone;
use super::prompt_service::MAX_COACH_TIPS;

/// 主题最多取输入的前几个词
const TOPIC_WORDS: usize = 3;

const TOPIC_SLOT: &str = "{topic}";

const EN_SAFE: &[&str] = &[
    "What got you interested in {topic}?",
    "I'd love to hear more about {topic}, what is the backstory?",
    "How has your week been so far?",
    "What's something small that made you smile today?",
];
const EN_PLAYFUL: &[&str] = &[
    "Okay, important question: {topic} or pizza?",
    "Rate {topic} on a scale from one to ten, go!",
    "I have a theory about you, want to hear it?",
    "Quick, tell me your most useless talent.",
];
const EN_FLIRTY: &[&str] = &[
    "Talking about {topic} with you sounds like a great plan.",
    "I think {topic} suits you, and so does that smile.",
    "Careful, you're making it hard to stop texting you.",
    "Coffee sometime, or are you secretly trouble?",
];
const EN_COMMON: &[&str] = &[
    "Tell me what your ideal weekend looks like?",
    "Which small habit makes your day better?",
    "What's the last thing that really made you laugh?",
    "If you could travel anywhere tomorrow, where would you go?",
    "Which song has been stuck in your head lately?",
    "Are you more of a sunrise or a late night person?",
];

const NL_SAFE: &[&str] = &[
    "Hoe ben je eigenlijk bij {topic} terechtgekomen?",
    "Ik hoor graag meer over {topic}, wat is het verhaal?",
    "Hoe is je week tot nu toe verlopen?",
    "Wat heeft je vandaag even laten glimlachen?",
];
const NL_PLAYFUL: &[&str] = &[
    "Oké, belangrijke vraag: {topic} of pizza?",
    "Geef {topic} eens een cijfer van één tot tien!",
    "Ik heb een theorie over jou, wil je hem horen?",
    "Snel, vertel me je meest nutteloze talent.",
];
const NL_FLIRTY: &[&str] = &[
    "Met jou over {topic} praten klinkt als een goed plan.",
    "Ik denk dat {topic} bij je past, net als die glimlach.",
    "Pas op, zo wordt het lastig om te stoppen met appen.",
    "Koffie binnenkort, of ben je stiekem gevaarlijk?",
];
const NL_COMMON: &[&str] = &[
    "Vertel eens wat jouw ideale weekend inhoudt?",
    "Welke kleine gewoonte maakt je dag beter?",
    "Wat is het laatste waar je hard om moest lachen?",
    "Als je morgen overal heen kon reizen, waar ga je heen?",
    "Welk nummer zit de laatste tijd in je hoofd?",
    "Ben jij meer een ochtendmens of een nachtuil?",
];

const EN_COACH: &[&str] = &[
    "Ask concrete, small questions (easy to answer).",
    "Vary angles: playful, direct, curious.",
];
const NL_COACH: &[&str] = &[
    "Stel concrete, kleine vragen (makkelijk te beantwoorden).",
    "Wissel invalshoeken: speels, direct, nieuwsgierig.",
];

/// 从输入中取一个简短主题
pub fn short_topic(source: &str, lang: HintLang) -> String {
    let topic = source
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .take(TOPIC_WORDS)
        .collect::<Vec<_>>()
        .join(" ");

    if topic.is_empty() {
        match lang {
            HintLang::En => "your day".to_string(),
            HintLang::Nl => "je dag".to_string(),
        }
    } else {
        topic
    }
}

/// 固定顺序的兜底建议：语气相关的行在前，通用行在后
pub fn suggestions(topic_source: &str, tone: Tone, lang: HintLang) -> Vec<String> {
    let (toned, common) = match (lang, tone) {
        (HintLang::En, Tone::Safe) => (EN_SAFE, EN_COMMON),
        (HintLang::En, Tone::Playful) => (EN_PLAYFUL, EN_COMMON),
        (HintLang::En, Tone::Flirty) => (EN_FLIRTY, EN_COMMON),
        (HintLang::Nl, Tone::Safe) => (NL_SAFE, NL_COMMON),
        (HintLang::Nl, Tone::Playful) => (NL_PLAYFUL, NL_COMMON),
        (HintLang::Nl, Tone::Flirty) => (NL_FLIRTY, NL_COMMON),
    };
    let topic = short_topic(topic_source, lang);

    toned
        .iter()
        .chain(common.iter())
        .map(|line| line.replace(TOPIC_SLOT, &topic))
        .collect()
}

/// 跟进模式的兜底教练提示
pub fn coach_tips(lang: HintLang) -> Vec<String> {
    let tips = match lang {
        HintLang::En => EN_COACH,
        HintLang::Nl => NL_COACH,
    };
    tips.iter().take(MAX_COACH_TIPS).map(|t| t.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::diversity::{jaccard, select_diverse, MAX_SIMILARITY};

    #[test]
    fn test_short_topic() {
        assert_eq!(short_topic("Tell me about your weekend", HintLang::En), "Tell me about");
        assert_eq!(short_topic("  hi! ", HintLang::En), "hi");
        assert_eq!(short_topic("?!", HintLang::Nl), "je dag");
    }

    #[test]
    fn test_deterministic() {
        let a = suggestions("hiking and coffee", Tone::Playful, HintLang::En);
        let b = suggestions("hiking and coffee", Tone::Playful, HintLang::En);
        assert_eq!(a, b);
        assert_eq!(a[0], "Okay, important question: hiking and coffee or pizza?");
    }

    #[test]
    fn test_every_bank_is_diverse_enough() {
        for lang in [HintLang::En, HintLang::Nl] {
            for tone in [Tone::Safe, Tone::Playful, Tone::Flirty] {
                let lines = suggestions("hi", tone, lang);
                assert_eq!(lines.len(), 10);
                assert_eq!(select_diverse(&lines, 10).len(), 10);
                for (i, a) in lines.iter().enumerate() {
                    for b in lines.iter().skip(i + 1) {
                        assert!(jaccard(a, b) <= MAX_SIMILARITY, "{} / {}", a, b);
                    }
                }
            }
        }
    }

    #[test]
    fn test_coach_tips() {
        assert_eq!(coach_tips(HintLang::Nl).len(), 2);
        assert_eq!(coach_tips(HintLang::En)[1], "Vary angles: playful, direct, curious.");
    }
}
