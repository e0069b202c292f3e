//! Serialising a transcript into the prompt string a model's tokenizer consumes.
use crate::message::{Role, Turn};
use crate::{ChatError, Result};
use minijinja::{Environment, ErrorKind, context};
use minijinja_contrib::pycompat::unknown_method_callback;

pub const BEGIN_OF_TEXT: &str = "<|begin_of_text|>";
pub const END_OF_TEXT: &str = "<|end_of_text|>";
pub const START_HEADER: &str = "<|start_header_id|>";
pub const END_HEADER: &str = "<|end_header_id|>";
pub const EOT: &str = "<|eot_id|>";

/// Open assistant header that ends every prompt, cueing the model to answer.
pub const ASSISTANT_HEADER: &str = "<|start_header_id|>assistant<|end_header_id|>\n\n";

const RESERVED_TOKENS: [&str; 7] = [
    BEGIN_OF_TEXT,
    END_OF_TEXT,
    START_HEADER,
    END_HEADER,
    EOT,
    "<|eom_id|>",
    "<|python_tag|>",
];

/// True if `text` contains one of the control tokens of the Llama-3 format.
pub fn contains_control_token(text: &str) -> bool {
    RESERVED_TOKENS.iter().any(|t| text.contains(t))
}

/// A way of turning (system prompt, history, pending user message) into a prompt.
///
/// Implementations are pure: the history is only read, and equal inputs give equal output.
pub trait PromptFormat {
    fn render(&self, system: Option<&str>, history: &[Turn], pending: &str) -> Result<String>;
}

/// Build the Llama-3 prompt for `pending` following `history`, with no system prompt.
pub fn build_prompt(pending: &str, history: &[Turn]) -> Result<String> {
    Llama3Format.render(None, history, pending)
}

/// The hand-written Llama-3 instruct template.
#[derive(Clone, Copy, Debug, Default)]
pub struct Llama3Format;

impl Llama3Format {
    pub fn format_system(content: &str) -> String {
        format!("{BEGIN_OF_TEXT}{START_HEADER}system{END_HEADER}\n\n{content}{EOT}")
    }

    pub fn format_turn(turn: &Turn) -> Result<String> {
        let content = turn.content();
        match turn.role() {
            Role::User => Ok(format!("{START_HEADER}user{END_HEADER}\n\n{content}{EOT}")),
            Role::Assistant => Ok(format!(
                "{START_HEADER}assistant{END_HEADER}\n\n{content}{EOT}\n"
            )),
            // System prompts come in through the `system` argument only
            Role::System => Err(ChatError::TemplateError(
                "system turn found in history".to_string(),
            )),
        }
    }
}

impl PromptFormat for Llama3Format {
    fn render(&self, system: Option<&str>, history: &[Turn], pending: &str) -> Result<String> {
        let mut prompt = String::new();
        if let Some(system) = system {
            prompt.push_str(&Self::format_system(system));
        }
        for turn in history {
            prompt.push_str(&Self::format_turn(turn)?);
        }
        prompt.push_str(&Self::format_turn(&Turn::user(pending))?);
        prompt.push_str(ASSISTANT_HEADER);
        Ok(prompt)
    }
}

/// A model-supplied Jinja chat template, as found under `chat_template` in `tokenizer_config.json`.
#[derive(Clone, Debug)]
pub struct JinjaFormat {
    template: String,
    bos_token: String,
}

impl JinjaFormat {
    /// Compile `template` once to surface syntax errors before the first turn.
    pub fn new(template: impl Into<String>, bos_token: impl Into<String>) -> Result<Self> {
        let format = Self {
            template: template.into(),
            bos_token: bos_token.into(),
        };
        format.environment()?;
        Ok(format)
    }

    fn environment(&self) -> Result<Environment<'_>> {
        let mut env = Environment::new();
        env.set_unknown_method_callback(unknown_method_callback);
        env.add_function("raise_exception", |msg: String| -> Result<(), minijinja::Error> {
            Err(minijinja::Error::new(ErrorKind::InvalidOperation, msg))
        });
        env.add_template("chat", &self.template)?;
        Ok(env)
    }
}

impl PromptFormat for JinjaFormat {
    fn render(&self, system: Option<&str>, history: &[Turn], pending: &str) -> Result<String> {
        if history.iter().any(|t| t.role() == Role::System) {
            return Err(ChatError::TemplateError(
                "system turn found in history".to_string(),
            ));
        }

        let mut messages = vec![];
        if let Some(system) = system {
            messages.push(context!(role => "system", content => system));
        }
        messages.extend(
            history
                .iter()
                .map(|t| context!(role => t.role().as_str(), content => t.content())),
        );
        messages.push(context!(role => "user", content => pending));

        let env = self.environment()?;
        let tmpl = env.get_template("chat")?;
        Ok(tmpl.render(context!(
            messages => messages,
            bos_token => self.bos_token,
            add_generation_prompt => true
        ))?)
    }
}
