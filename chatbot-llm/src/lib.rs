//! Binds the `chatbot` core to real Llama weights: model files from the Hugging Face hub (or a
//! local directory), `tokenizers` for text/token translation and candle for generation.
pub mod config;
pub mod device;
mod error;
pub mod run;
pub mod utils;

pub use error::LLMError;
pub type Result<T, E = error::LLMError> = std::result::Result<T, E>;
