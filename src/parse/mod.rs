mod error;
mod grammar;
mod tokenizer;

pub use error::PromptError;

use crate::types::TagSequence;

/// Tokenize a raw prompt string into a [`TagSequence`].
///
/// # Errors
///
/// Returns [`PromptError`] on unbalanced emphasis parentheses or a malformed
/// explicit weight.
pub fn tokenize(input: &str) -> Result<TagSequence, PromptError> {
    tokenizer::tokenize(input)
}
