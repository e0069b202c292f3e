use crate::{LLMError, Result};
use chatbot::{ChatConfig, GenerationConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EosTokenId {
    Single(u32),
    Multiple(Vec<u32>),
}

/// The fields of a model's `config.json` needed before handing it to candle.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub architectures: Vec<String>,
    pub eos_token_id: Option<EosTokenId>,
    pub max_position_embeddings: usize,
}

impl ModelConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }

    pub fn get_eos_token_ids(&self) -> Vec<u32> {
        match self.eos_token_id {
            Some(EosTokenId::Single(id)) => vec![id],
            Some(EosTokenId::Multiple(ref ids)) => ids.clone(),
            None => vec![],
        }
    }

    pub fn check_architecture(&self) -> Result<()> {
        match self.architectures.first().map(String::as_str) {
            Some("LlamaForCausalLM") => Ok(()),
            Some(arch) => Err(LLMError::UnsupportedModel(arch.to_string())),
            None => Err(LLMError::InvalidModelConfig(
                "config.json lists no architectures".to_string(),
            )),
        }
    }
}

/// Chat template and BOS token from `tokenizer_config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenizerConfig {
    pub chat_template: Option<String>,
    pub bos_token: Option<String>,
}

impl TokenizerConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        Ok(Self::from_json(&json))
    }

    pub fn from_json(json: &serde_json::Value) -> Self {
        let chat_template = json
            .get("chat_template")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        // Either a plain string or an AddedToken object
        let bos_token = json.get("bos_token").and_then(|v| {
            v.as_str()
                .or_else(|| v.get("content").and_then(|c| c.as_str()))
                .map(str::to_string)
        });

        Self {
            chat_template,
            bos_token,
        }
    }
}

/// Contents of the optional `--config` JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub generation: GenerationConfig,
    pub chat: ChatConfig,
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }
}
