//! The conversation loop: one request/response cycle per submitted user message.
use crate::config::{ChatConfig, GenerationConfig};
use crate::history::{History, drop_oldest_exchange};
use crate::message::Turn;
use crate::prompt::{ASSISTANT_HEADER, EOT, Llama3Format, PromptFormat, contains_control_token};
use crate::serve::{Generator, Surface, Tokenizer};
use crate::{ChatError, Result};

/// Strip template artifacts the model echoes back around its answer.
///
/// Applied until nothing changes, so cleaning an already clean response is a no-op.
pub fn clean_response(raw: &str) -> String {
    let mut current = raw.to_string();
    loop {
        let next = current
            .trim()
            .replace(EOT, "")
            .replace(ASSISTANT_HEADER, "")
            .trim()
            .to_string();
        if next == current {
            return next;
        }
        current = next;
    }
}

/// A single chat session: it owns the model handles and the transcript.
///
/// History is only appended to after a turn fully succeeds, so a failed turn leaves the session
/// exactly as it was and the user can resubmit.
pub struct Conversation<T, G, F = Llama3Format> {
    tokenizer: T,
    generator: G,
    format: F,
    history: History,
    config: ChatConfig,
    generation: GenerationConfig,
}

impl<T: Tokenizer, G: Generator> Conversation<T, G> {
    pub fn new(
        tokenizer: T,
        generator: G,
        config: ChatConfig,
        generation: GenerationConfig,
    ) -> Result<Self> {
        Self::with_format(tokenizer, generator, Llama3Format, config, generation)
    }
}

impl<T: Tokenizer, G: Generator, F: PromptFormat> Conversation<T, G, F> {
    pub fn with_format(
        tokenizer: T,
        generator: G,
        format: F,
        config: ChatConfig,
        mut generation: GenerationConfig,
    ) -> Result<Self> {
        config.validate()?;
        generation.validate()?;

        let eos_token_id = tokenizer
            .token_to_id(EOT)
            .ok_or_else(|| ChatError::LoaderError(format!("tokenizer has no {EOT} token")))?;
        generation.eos_token_id = Some(eos_token_id);

        Ok(Self {
            tokenizer,
            generator,
            format,
            history: History::with_capacity_limit(config.history_limit),
            config,
            generation,
        })
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn generation_config(&self) -> &GenerationConfig {
        &self.generation
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn into_parts(self) -> (T, G, History) {
        (self.tokenizer, self.generator, self.history)
    }

    /// Run one turn for `text` and return the assistant's reply.
    pub fn submit(&mut self, text: &str) -> Result<Turn> {
        if !self.config.allow_control_tokens && contains_control_token(text) {
            return Err(ChatError::EncodingError(
                "message contains reserved control tokens".to_string(),
            ));
        }

        let input = self.encode_prompt(text)?;

        log::info!("Starting inference on {} prompt tokens", input.len());
        let output = self.generator.generate(&input, &self.generation)?;
        let new_tokens = output.get(input.len()..).ok_or_else(|| {
            ChatError::GenerationError(format!(
                "generator returned {} tokens for a {} token prompt",
                output.len(),
                input.len()
            ))
        })?;
        log::info!("Inference done, {} new tokens", new_tokens.len());

        let raw = self.tokenizer.decode(new_tokens)?;
        let reply = Turn::assistant(clean_response(&raw));

        self.history.extend([Turn::user(text), reply.clone()]);
        log::debug!("History holds {} turns", self.history.len());
        Ok(reply)
    }

    // Render and encode the prompt, dropping the oldest exchanges until it fits the token budget.
    fn encode_prompt(&self, text: &str) -> Result<Vec<u32>> {
        let system = self.config.system_prompt.as_deref();
        let mut window = self.history.window(self.config.max_history_turns);
        loop {
            let prompt = self.format.render(system, window, text)?;
            let tokens = self.tokenizer.encode(&prompt)?;
            match self.config.max_prompt_tokens {
                Some(budget) if tokens.len() > budget => {
                    if window.is_empty() {
                        return Err(ChatError::EncodingError(format!(
                            "prompt needs {} tokens but the budget is {budget}",
                            tokens.len()
                        )));
                    }
                    window = drop_oldest_exchange(window);
                    log::debug!(
                        "Prompt of {} tokens over budget, keeping {} turns",
                        tokens.len(),
                        window.len()
                    );
                }
                _ => {
                    log::debug!("Prompt: {prompt:?}");
                    return Ok(tokens);
                }
            }
        }
    }

    /// Drive the session until the surface has no more input.
    ///
    /// Turn-level failures are reported on the surface and the loop carries on; a loader failure
    /// or a broken surface ends it.
    pub fn run<S: Surface>(&mut self, surface: &mut S) -> Result<()> {
        while let Some(text) = surface.read_input()? {
            if text.trim().is_empty() {
                continue;
            }
            surface.show(&Turn::user(text.as_str()))?;
            match self.submit(&text) {
                Ok(reply) => surface.show(&reply)?,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    log::warn!("Turn failed: {err}");
                    surface.show_error(&err);
                }
            }
        }
        Ok(())
    }
}
