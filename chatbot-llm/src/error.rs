use chatbot::ChatError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LLMError {
    #[error("IO error occurred: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unsupported model architecture: {0}")]
    UnsupportedModel(String),

    #[error("Invalid model config: {0}")]
    InvalidModelConfig(String),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Tokenizer Error: {0}")]
    TokenizerError(String),

    #[error("Hugging Face hub error: {0}")]
    HuggingFaceAPIError(#[from] hf_hub::api::sync::ApiError),

    #[error("Candle error: {0}")]
    CandleError(#[from] candle_core::Error),

    #[error("No usable compute device among {0}")]
    NoDevice(String),

    #[error("Prompt of {tokens} tokens does not fit a context of {limit}")]
    ContextOverflow { tokens: usize, limit: usize },
}

impl From<tokenizers::Error> for LLMError {
    fn from(err: tokenizers::Error) -> Self {
        LLMError::TokenizerError(err.to_string())
    }
}

// Anything reaching the chat core through this conversion happened while loading.
impl From<LLMError> for ChatError {
    fn from(err: LLMError) -> Self {
        ChatError::LoaderError(err.to_string())
    }
}
