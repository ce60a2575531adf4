//! Resource loading: artifacts at fixed well-known paths resolved into
//! a ready-to-use (model, tokenizer, device) triple, cached for the
//! process lifetime behind a single-initialization barrier.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use candle_core::Device;

use crate::checkpoint::{resolve, RawCheckpoint};
use crate::error::{Error, Result};
use crate::model::RecipeTransformer;
use crate::select_device;
use crate::tokenizer::RecipeTokenizer;

/// Well-known locations of the tokenizer and checkpoint artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub tokenizer: PathBuf,
    pub checkpoint: PathBuf,
}

impl ArtifactPaths {
    /// Artifact file names under a base directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            tokenizer: dir.join("recipe_tokenizer.json"),
            checkpoint: dir.join("nutrigen_transformer.safetensors"),
        }
    }
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self::in_dir(Path::new("models"))
    }
}

/// Everything needed for inference after loading. Never mutated after
/// construction; generation only reads from it.
pub struct Resources {
    pub model: RecipeTransformer,
    pub tokenizer: RecipeTokenizer,
    pub device: Device,
}

impl std::fmt::Debug for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resources")
            .field("device", &self.device)
            .field("vocab_size", &self.tokenizer.vocab_size())
            .finish_non_exhaustive()
    }
}

impl Resources {
    /// Load tokenizer and checkpoint, resolve the configuration and
    /// instantiate the model on the selected device.
    ///
    /// Every failure surfaces as a typed [`Error`]; nothing panics past
    /// this boundary.
    pub fn load(paths: &ArtifactPaths) -> Result<Self> {
        let device = select_device();

        if !paths.tokenizer.exists() {
            return Err(Error::ArtifactMissing(paths.tokenizer.clone()));
        }
        let tokenizer = RecipeTokenizer::from_file(&paths.tokenizer)?;
        tracing::info!(
            path = %paths.tokenizer.display(),
            vocab_size = tokenizer.vocab_size(),
            "tokenizer loaded"
        );

        if !paths.checkpoint.exists() {
            return Err(Error::ArtifactMissing(paths.checkpoint.clone()));
        }
        let checkpoint = RawCheckpoint::read(&paths.checkpoint, &device)?;
        let (config, params) = resolve(&checkpoint, tokenizer.vocab_size())?;
        tracing::info!(
            d_model = config.d_model,
            n_heads = config.n_heads,
            n_layers = config.n_layers,
            "model config resolved"
        );

        let model = RecipeTransformer::from_parameters(&config, params, &device)?;
        tracing::info!("model ready");

        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }
}

/// Single-initialization cache for [`Resources`].
///
/// The first caller performs the load; every caller, on every thread,
/// observes the same outcome afterwards, including a failed one. The
/// cell is owned by the hosting process and passed by reference to
/// request handlers; the load is attempted at most once per process.
pub struct ResourceCell {
    cell: OnceLock<Result<Resources>>,
}

impl ResourceCell {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// Return the cached resources, loading them on first use.
    pub fn get_or_load(&self, paths: &ArtifactPaths) -> std::result::Result<&Resources, &Error> {
        self.cell
            .get_or_init(|| {
                let loaded = Resources::load(paths);
                if let Err(e) = &loaded {
                    tracing::error!(error = %e, "resource load failed");
                }
                loaded
            })
            .as_ref()
    }
}

impl Default for ResourceCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tokenizer_is_artifact_missing() {
        let paths = ArtifactPaths::in_dir(Path::new("/nonexistent/nutrigen"));
        let err = Resources::load(&paths).unwrap_err();
        match err {
            Error::ArtifactMissing(p) => assert!(p.ends_with("recipe_tokenizer.json")),
            other => panic!("expected ArtifactMissing, got {other:?}"),
        }
    }

    #[test]
    fn cell_caches_the_failed_outcome() {
        let paths = ArtifactPaths::in_dir(Path::new("/nonexistent/nutrigen"));
        let cell = ResourceCell::new();
        assert!(cell.get_or_load(&paths).is_err());
        // Second call observes the same cached failure without retrying.
        assert!(matches!(
            cell.get_or_load(&paths).unwrap_err(),
            Error::ArtifactMissing(_)
        ));
    }
}
