//! NutriGen core -- recipe generation inference runtime.
//!
//! Resolves a trained recipe-transformer checkpoint and its tokenizer
//! into runnable resources and drives autoregressive generation with
//! temperature + top-k sampling, using Candle as the tensor backend.

use candle_core::Device;
use serde::{Deserialize, Serialize};

pub mod checkpoint;
pub mod error;
pub mod generate;
pub mod model;
pub mod postprocess;
pub mod prompt;
pub mod resources;
pub mod tokenizer;

pub use checkpoint::{resolve, ModelConfig, ParameterSet, RawCheckpoint};
pub use error::{Error, Result};
pub use generate::{generate, generate_recipe, GenerationParams};
pub use model::RecipeTransformer;
pub use postprocess::clean;
pub use prompt::{format_prompt, parse_ingredients, GenerationRequest, NutritionTarget};
pub use resources::{ArtifactPaths, ResourceCell, Resources};
pub use tokenizer::RecipeTokenizer;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Select the best available compute device for the current platform.
///
/// Priority: Metal, then CUDA, then CPU. Accelerator construction can
/// fail at runtime even when compiled in, so each attempt falls through
/// to the next backend. CPU is always available.
pub fn select_device() -> Device {
    #[cfg(feature = "metal")]
    match Device::new_metal(0) {
        Ok(device) => {
            tracing::info!("using Metal backend");
            return device;
        }
        Err(e) => tracing::warn!(error = %e, "Metal unavailable, falling back"),
    }

    #[cfg(feature = "cuda")]
    match Device::new_cuda(0) {
        Ok(device) => {
            tracing::info!("using CUDA backend");
            return device;
        }
        Err(e) => tracing::warn!(error = %e, "CUDA unavailable, falling back"),
    }

    tracing::info!("using CPU backend");
    Device::Cpu
}

/// Output from a generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateOutput {
    /// Cleaned, display-ready recipe text.
    pub text: String,
    /// Full token sequence: prompt followed by generated tokens.
    pub tokens: Vec<u32>,
    pub prompt_tokens: usize,
    pub generated_tokens: usize,
}
