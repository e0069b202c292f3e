use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Failed to load model: {0}")]
    LoaderError(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Generation failed: {0}")]
    GenerationError(String),

    #[error("Template rendering error: {0}")]
    TemplateError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Display surface error: {0}")]
    SurfaceError(String),

    #[error("IO error occurred: {0}")]
    IoError(#[from] std::io::Error),
}

impl ChatError {
    /// Only a failed model load ends the session; everything else fails a single turn.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChatError::LoaderError(_))
    }
}

impl From<minijinja::Error> for ChatError {
    fn from(err: minijinja::Error) -> Self {
        ChatError::TemplateError(err.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::ConfigError(err.to_string())
    }
}
