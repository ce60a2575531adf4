//! The generation engine: temperature + top-k sampling and the bounded
//! autoregressive decode loop.

use candle_core::Tensor;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::RecipeTransformer;
use crate::prompt::GenerationRequest;
use crate::resources::Resources;
use crate::tokenizer::RecipeTokenizer;
use crate::GenerateOutput;

/// Token budget for the encoded prompt.
pub const PROMPT_MAX_TOKENS: usize = 200;

/// Parameters controlling one generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Maximum number of tokens to generate beyond the prompt.
    pub max_length: usize,
    /// Temperature for logit scaling. Values below 1e-7 mean greedy.
    pub temperature: f64,
    /// Top-k filtering. 0 = disabled.
    pub top_k: usize,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_length: 300,
            temperature: 0.8,
            top_k: 50,
        }
    }
}

/// Sample one token from a slice of next-token logits.
///
/// Logits are scaled by 1/temperature first, then restricted to the
/// top-k candidates, softmax-renormalized among them, and drawn from.
/// Temperature below 1e-7 short-circuits to greedy argmax.
pub fn sample_token(logits: &[f32], temperature: f64, top_k: usize) -> Result<u32> {
    if logits.is_empty() {
        return Err(Error::Generation("empty logits".to_string()));
    }

    if temperature < 1e-7 {
        let (best_idx, _) = logits
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .expect("non-empty logits");
        return Ok(best_idx as u32);
    }

    // Temperature scaling before the top-k restriction.
    let inv_temp = (1.0 / temperature) as f32;
    let mut indexed: Vec<(usize, f32)> = logits
        .iter()
        .map(|&l| l * inv_temp)
        .enumerate()
        .collect();
    indexed.sort_unstable_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    if top_k > 0 && top_k < indexed.len() {
        indexed.truncate(top_k);
    }

    // Softmax over the surviving candidates.
    let max_logit = indexed[0].1;
    let mut probs: Vec<(usize, f32)> = indexed
        .iter()
        .map(|&(i, l)| (i, (l - max_logit).exp()))
        .collect();
    let total: f32 = probs.iter().map(|(_, p)| p).sum();
    for (_, p) in probs.iter_mut() {
        *p /= total;
    }

    // Weighted random draw.
    let mut rng = rand::thread_rng();
    let r: f32 = rng.gen();
    let mut acc = 0.0f32;
    for &(idx, p) in &probs {
        acc += p;
        if acc >= r {
            return Ok(idx as u32);
        }
    }
    Ok(probs.last().map(|&(idx, _)| idx as u32).unwrap_or(0))
}

/// Autoregressive decoding from a tokenized prompt.
///
/// Each step runs the model over the FULL current sequence (there is no
/// KV cache in this architecture), samples one token and appends it.
/// Stops after the end-of-sequence token is appended, after
/// `params.max_length` generated tokens, or at the model's positional
/// capacity, whichever comes first. Returns the full sequence, prompt
/// included; the generated tail is between 1 and `max_length` tokens.
pub fn generate(
    model: &RecipeTransformer,
    tokenizer: &RecipeTokenizer,
    input_ids: &[u32],
    params: &GenerationParams,
) -> Result<Vec<u32>> {
    if input_ids.is_empty() {
        return Err(Error::Generation("prompt produced no tokens".to_string()));
    }

    let device = model.device().clone();
    let mut all_tokens = input_ids.to_vec();

    for _ in 0..params.max_length {
        if all_tokens.len() >= model.max_positions() {
            tracing::warn!(
                len = all_tokens.len(),
                max = model.max_positions(),
                "reached positional capacity"
            );
            break;
        }

        let input = Tensor::new(all_tokens.as_slice(), &device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(|e| Error::Generation(format!("building input tensor: {e}")))?;
        let logits = model
            .forward(&input)
            .map_err(|e| Error::Generation(format!("forward pass: {e}")))?;
        let logits: Vec<f32> = logits
            .to_vec1()
            .map_err(|e| Error::Generation(format!("extracting logits: {e}")))?;

        let next_token = sample_token(&logits, params.temperature, params.top_k)?;
        all_tokens.push(next_token);

        if tokenizer.is_eos(next_token) {
            break;
        }
    }

    Ok(all_tokens)
}

/// Full pipeline for one request: prompt -> encode -> generate ->
/// decode -> clean.
pub fn generate_recipe(
    resources: &Resources,
    request: &GenerationRequest,
    params: &GenerationParams,
) -> Result<GenerateOutput> {
    let prompt = request.prompt();
    let input_ids = resources.tokenizer.encode(&prompt, PROMPT_MAX_TOKENS)?;
    tracing::debug!(prompt_tokens = input_ids.len(), "prompt encoded");

    let tokens = generate(&resources.model, &resources.tokenizer, &input_ids, params)?;
    let raw_text = resources.tokenizer.decode(&tokens, true)?;
    let text = crate::postprocess::clean(&raw_text);

    Ok(GenerateOutput {
        text,
        generated_tokens: tokens.len() - input_ids.len(),
        prompt_tokens: input_ids.len(),
        tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greedy_picks_max() {
        let logits = [1.0f32, 5.0, 3.0, 2.0];
        let tok = sample_token(&logits, 0.0, 50).unwrap();
        assert_eq!(tok, 1);
    }

    #[test]
    fn top_k_one_is_deterministic() {
        let logits = [0.3f32, 0.1, 2.0, 1.9];
        for _ in 0..20 {
            assert_eq!(sample_token(&logits, 0.8, 1).unwrap(), 2);
        }
    }

    #[test]
    fn samples_stay_within_top_k() {
        let logits = [10.0f32, 9.0, -50.0, -50.0, -50.0];
        for _ in 0..50 {
            let tok = sample_token(&logits, 1.0, 2).unwrap();
            assert!(tok == 0 || tok == 1, "token {tok} escaped the top-2 set");
        }
    }

    #[test]
    fn empty_logits_are_a_generation_error() {
        let err = sample_token(&[], 0.8, 50).unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
    }

    #[test]
    fn default_params_match_the_serving_defaults() {
        let p = GenerationParams::default();
        assert_eq!(p.max_length, 300);
        assert!((p.temperature - 0.8).abs() < 1e-9);
        assert_eq!(p.top_k, 50);
    }
}
