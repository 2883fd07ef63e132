//! External services used by the agents

pub mod llm;

pub use llm::{
    Completion, CompletionBackend, CompletionError, GeminiBackend, LlmService, OpenAiBackend, RotationCursor,
};
