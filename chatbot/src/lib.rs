//! Chat transcript bookkeeping and Llama-3 prompt templating.
//!
//! Model loading, tokenization and sampling live behind the traits in [`serve`]; the
//! `chatbot-llm` crate provides the candle-backed implementations.
pub mod chat;
pub mod config;
mod error;
pub mod history;
pub mod message;
pub mod prompt;
pub mod serve;

pub use chat::{Conversation, clean_response};
pub use config::{ChatConfig, GenerationConfig};
pub use error::ChatError;
pub use history::History;
pub use message::{Role, Turn};
pub use prompt::{JinjaFormat, Llama3Format, PromptFormat, build_prompt};

pub type Result<T, E = error::ChatError> = std::result::Result<T, E>;
