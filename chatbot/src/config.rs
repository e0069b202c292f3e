use crate::{ChatError, Result};
use serde::{Deserialize, Serialize};

/// Decoding parameters handed to the [`crate::serve::Generator`] on every turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_new_tokens: usize,
    pub do_sample: bool,
    pub top_p: f64,
    pub temperature: f64,
    pub repetition_penalty: f32,
    /// Number of trailing context tokens the repetition penalty looks at; `None` means all of them.
    pub repeat_last_n: Option<usize>,
    pub seed: u64,
    /// Resolved from the tokenizer when a conversation starts.
    #[serde(skip)]
    pub eos_token_id: Option<u32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 512,
            do_sample: true,
            top_p: 0.9,
            temperature: 0.5,
            repetition_penalty: 1.1,
            repeat_last_n: None,
            seed: 299792458,
            eos_token_id: None,
        }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_new_tokens == 0 {
            return Err(ChatError::ConfigError(
                "max_new_tokens must be positive".to_string(),
            ));
        }
        if self.do_sample {
            if !(self.top_p > 0.0 && self.top_p <= 1.0) {
                return Err(ChatError::ConfigError(format!(
                    "top_p must be in (0, 1], got {}",
                    self.top_p
                )));
            }
            if self.temperature <= 0.0 {
                return Err(ChatError::ConfigError(format!(
                    "temperature must be positive when sampling, got {}",
                    self.temperature
                )));
            }
        }
        if self.repetition_penalty <= 0.0 {
            return Err(ChatError::ConfigError(format!(
                "repetition_penalty must be positive, got {}",
                self.repetition_penalty
            )));
        }
        Ok(())
    }
}

/// Session-level behaviour of a [`crate::Conversation`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Persona rendered once at the top of every prompt. Off unless configured.
    pub system_prompt: Option<String>,
    /// Sliding window over the history used when building the prompt.
    pub max_history_turns: Option<usize>,
    /// Token budget for the encoded prompt; oldest exchanges are dropped to fit.
    pub max_prompt_tokens: Option<usize>,
    /// Number of turns the history retains at all.
    pub history_limit: Option<usize>,
    /// Accept user text containing the format's reserved `<|...|>` markers.
    pub allow_control_tokens: bool,
}

impl ChatConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_prompt_tokens == Some(0) {
            return Err(ChatError::ConfigError(
                "max_prompt_tokens must be positive".to_string(),
            ));
        }
        if let Some(limit) = self.history_limit {
            if limit < 2 {
                return Err(ChatError::ConfigError(format!(
                    "history_limit must keep at least one exchange, got {limit}"
                )));
            }
        }
        Ok(())
    }
}
