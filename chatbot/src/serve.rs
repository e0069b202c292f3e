//! Abstract interfaces to the external model runtime and display surface.
use crate::config::GenerationConfig;
use crate::message::Turn;
use crate::{ChatError, Result};

/// A [`Tokenizer`] translates between token ids and strings.
///
/// Failures are reported as [`ChatError::EncodingError`].
pub trait Tokenizer {
    fn encode(&self, content: &str) -> Result<Vec<u32>>;
    fn decode(&self, tokens: &[u32]) -> Result<String>;
    fn token_to_id(&self, token: &str) -> Option<u32>;
}

/// A [`Generator`] extends a token sequence with newly generated tokens.
///
/// The returned sequence holds the input followed by the new tokens. Failures are reported as
/// [`ChatError::GenerationError`].
pub trait Generator {
    fn generate(&mut self, tokens: &[u32], config: &GenerationConfig) -> Result<Vec<u32>>;
}

/// A *loader* is conceptually a pair of generator and supporting tokenizer for one model.
pub trait Loader {
    type Tokenizer: Tokenizer;
    type Generator: Generator;

    fn load_tokenizer(&self) -> Result<Self::Tokenizer>;
    fn load_generator(&self) -> Result<Self::Generator>;

    fn load(&self) -> Result<(Self::Tokenizer, Self::Generator)> {
        Ok((self.load_tokenizer()?, self.load_generator()?))
    }
}

/// Where the transcript is shown and user input comes from.
pub trait Surface {
    /// Block until the user submits a line. `None` ends the session.
    fn read_input(&mut self) -> Result<Option<String>>;

    fn show(&mut self, turn: &Turn) -> Result<()>;

    fn show_error(&mut self, err: &ChatError);
}
