mod chat;
mod prompt;

pub use chat::ChatCompletionsAiSearch;
pub use prompt::{user_prompt, SYSTEM_PROMPT};
