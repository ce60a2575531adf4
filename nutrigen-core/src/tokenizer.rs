//! Tokenizer wrapper around the HuggingFace `tokenizers` crate.
//!
//! Exposes the three operations the pipeline needs: vocabulary size,
//! length-bounded encoding, and decoding with special-token skipping.

use std::path::Path;

use tokenizers::Tokenizer;

use crate::error::{Error, Result};

/// Wraps a HuggingFace tokenizer with the recipe pipeline's contract.
pub struct RecipeTokenizer {
    inner: Tokenizer,
    eos_token_id: Option<u32>,
}

impl RecipeTokenizer {
    /// Build from a `tokenizers::Tokenizer` instance, resolving the
    /// end-of-sequence token ID from common special-token names.
    pub fn new(tokenizer: Tokenizer) -> Self {
        let eos_token_id = tokenizer
            .token_to_id("</s>")
            .or_else(|| tokenizer.token_to_id("<|endoftext|>"))
            .or_else(|| tokenizer.token_to_id("<end>"))
            .or_else(|| tokenizer.token_to_id("[EOS]"));
        Self {
            inner: tokenizer,
            eos_token_id,
        }
    }

    /// Load a tokenizer from a local `tokenizer.json` file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path).map_err(|e| {
            Error::ConfigResolution(format!(
                "cannot load tokenizer from {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self::new(tokenizer))
    }

    /// Vocabulary size, counting added special tokens.
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    /// Encode text to token IDs, truncated to at most `max_length`.
    pub fn encode(&self, text: &str, max_length: usize) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| Error::Generation(format!("tokenizer encode error: {e}")))?;
        let mut ids = encoding.get_ids().to_vec();
        ids.truncate(max_length);
        Ok(ids)
    }

    /// Decode token IDs back to text.
    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        self.inner
            .decode(ids, skip_special_tokens)
            .map_err(|e| Error::Generation(format!("tokenizer decode error: {e}")))
    }

    /// Whether `token` is the end-of-sequence marker.
    pub fn is_eos(&self, token: u32) -> bool {
        self.eos_token_id.map_or(false, |eos| token == eos)
    }

    pub fn eos_token_id(&self) -> Option<u32> {
        self.eos_token_id
    }

    /// Override the EOS token ID.
    pub fn set_eos_token_id(&mut self, id: u32) {
        self.eos_token_id = Some(id);
    }

    /// Access the underlying tokenizer.
    pub fn inner(&self) -> &Tokenizer {
        &self.inner
    }
}
