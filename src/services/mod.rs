//! 服务层模块

mod diversity;
mod dummy;
mod generation;
mod language;
mod normalizer;
pub mod ocr;
mod pipeline;
mod prompt_service;
mod repair;
mod reply;
mod resolver;

pub use generation::GenerationClient;
pub use language::{LangKey, LanguageResolver};
pub use ocr::{OcrEngine, OcrOutcome, OcrResolver, OcrSpaceEngine, VisionOcr};
pub use pipeline::{
    PipelineTrace, Suggestion, SuggestionOutcome, SuggestionPipeline, SuggestionRequest,
    DEFAULT_COUNT, DUMMY_MODEL,
};
pub use prompt_service::PromptKind;
pub use reply::{ReplyBundle, ReplyGenerator, ReplyRequest};
