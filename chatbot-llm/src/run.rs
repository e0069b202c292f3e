//! Candle-backed implementations of the chat core's tokenizer, generator and loader.
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::llama::{Cache, Config, Llama, LlamaConfig};
use candle_transformers::utils::apply_repeat_penalty;
use chatbot::serve::{Generator, Loader, Tokenizer};
use chatbot::{ChatError, GenerationConfig};

use crate::config::{ModelConfig, TokenizerConfig};
use crate::utils::{ModelFiles, get_model_files};
use crate::{LLMError, Result};

pub struct LlamaTokenizer {
    tokenizer: tokenizers::Tokenizer,
    config: TokenizerConfig,
}

impl LlamaTokenizer {
    pub fn new(tokenizer: tokenizers::Tokenizer, config: TokenizerConfig) -> Self {
        Self { tokenizer, config }
    }

    pub fn from_files(files: &ModelFiles) -> Result<Self> {
        let tokenizer = tokenizers::Tokenizer::from_file(&files.tokenizer)?;
        let config = match &files.tokenizer_config {
            Some(path) => TokenizerConfig::from_file(path)?,
            None => TokenizerConfig::default(),
        };
        Ok(Self::new(tokenizer, config))
    }

    /// The model's own Jinja chat template, if it ships one.
    pub fn chat_template(&self) -> Option<&str> {
        self.config.chat_template.as_deref()
    }

    pub fn bos_token(&self) -> &str {
        self.config.bos_token.as_deref().unwrap_or("")
    }
}

impl Tokenizer for LlamaTokenizer {
    // The prompt spells out its own special tokens, so none are added here.
    fn encode(&self, content: &str) -> chatbot::Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(content, false)
            .map_err(|err| ChatError::EncodingError(err.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    // Special tokens are kept; the conversation strips them from the reply.
    fn decode(&self, tokens: &[u32]) -> chatbot::Result<String> {
        self.tokenizer
            .decode(tokens, false)
            .map_err(|err| ChatError::EncodingError(err.to_string()))
    }

    fn token_to_id(&self, token: &str) -> Option<u32> {
        self.tokenizer.token_to_id(token)
    }
}

pub struct LlamaGenerator {
    model: Llama,
    config: Config,
    device: Device,
    dtype: DType,
    eos_token_ids: Vec<u32>,
    calls: u64,
}

impl LlamaGenerator {
    pub fn load(files: &ModelFiles, device: Device, dtype: DType) -> Result<Self> {
        let model_config = ModelConfig::from_file(&files.config)?;
        model_config.check_architecture()?;

        let llama_config: LlamaConfig =
            serde_json::from_str(&std::fs::read_to_string(&files.config)?)?;
        let config = llama_config.into_config(false);

        log::info!(
            "Loading {} weight file(s) as {dtype:?} on {device:?}",
            files.weights.len()
        );
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&files.weights, dtype, &device)? };
        let model = Llama::load(vb, &config)?;

        Ok(Self {
            model,
            config,
            device,
            dtype,
            eos_token_ids: model_config.get_eos_token_ids(),
            calls: 0,
        })
    }

    fn is_stop(&self, token: u32, config: &GenerationConfig) -> bool {
        config.eos_token_id == Some(token) || self.eos_token_ids.contains(&token)
    }

    fn run(&mut self, tokens: &[u32], config: &GenerationConfig) -> Result<Vec<u32>> {
        let limit = self.config.max_position_embeddings;
        if tokens.is_empty() || tokens.len() >= limit {
            return Err(LLMError::ContextOverflow {
                tokens: tokens.len(),
                limit,
            });
        }
        let max_new_tokens = config.max_new_tokens.min(limit - tokens.len());

        let sampling = if config.do_sample {
            Sampling::TopP {
                p: config.top_p,
                temperature: config.temperature,
            }
        } else {
            Sampling::ArgMax
        };
        let mut logits_processor =
            LogitsProcessor::from_sampling(config.seed.wrapping_add(self.calls), sampling);
        self.calls += 1;

        // The prompt is rebuilt from scratch every turn, so nothing is gained by keeping the cache.
        let mut cache = Cache::new(true, self.dtype, &self.config, &self.device)?;
        let mut output = tokens.to_vec();
        let mut index_pos = 0;

        for index in 0..max_new_tokens {
            let context_size = if index > 0 { 1 } else { output.len() };
            let ctxt = &output[output.len() - context_size..];
            let input = Tensor::new(ctxt, &self.device)?.unsqueeze(0)?;
            let logits = self.model.forward(&input, index_pos, &mut cache)?;
            let logits = logits.squeeze(0)?;
            let logits = if config.repetition_penalty == 1.0 {
                logits
            } else {
                let start_at = config
                    .repeat_last_n
                    .map_or(0, |n| output.len().saturating_sub(n));
                apply_repeat_penalty(&logits, config.repetition_penalty, &output[start_at..])?
            };
            index_pos += ctxt.len();

            let next_token = logits_processor.sample(&logits)?;
            output.push(next_token);
            if self.is_stop(next_token, config) {
                break;
            }
        }

        log::debug!("Generated {} tokens", output.len() - tokens.len());
        Ok(output)
    }
}

impl Generator for LlamaGenerator {
    fn generate(&mut self, tokens: &[u32], config: &GenerationConfig) -> chatbot::Result<Vec<u32>> {
        self.run(tokens, config)
            .map_err(|err| ChatError::GenerationError(err.to_string()))
    }
}

/// Loads a Llama checkpoint once; the resulting handles are owned by one conversation.
pub struct LlamaLoader {
    files: ModelFiles,
    device: Device,
    dtype: DType,
}

impl LlamaLoader {
    pub fn new(model: &str, revision: &str, device: Device, dtype: DType) -> Result<Self> {
        let files = get_model_files(model, revision)?;
        Ok(Self::from_files(files, device, dtype))
    }

    pub fn from_files(files: ModelFiles, device: Device, dtype: DType) -> Self {
        Self {
            files,
            device,
            dtype,
        }
    }
}

impl Loader for LlamaLoader {
    type Tokenizer = LlamaTokenizer;
    type Generator = LlamaGenerator;

    fn load_tokenizer(&self) -> chatbot::Result<LlamaTokenizer> {
        Ok(LlamaTokenizer::from_files(&self.files)?)
    }

    fn load_generator(&self) -> chatbot::Result<LlamaGenerator> {
        Ok(LlamaGenerator::load(
            &self.files,
            self.device.clone(),
            self.dtype,
        )?)
    }
}
