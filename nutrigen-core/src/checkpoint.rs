//! Checkpoint resolution: derive a concrete model configuration and a
//! normalized parameter set from a persisted artifact.
//!
//! The artifact is a safetensors file. Model hyperparameters ride in the
//! safetensors `__metadata__` string map: optional `vocab_size` and
//! `d_model` entries plus an optional `config` entry holding a JSON
//! object. Weights live in the tensor table; a checkpoint exported from
//! a training wrapper may carry a `model_state_dict.` key prefix, and a
//! checkpoint trained under a multi-device replication wrapper carries a
//! `module.` key prefix on every parameter name.

use std::collections::HashMap;
use std::path::Path;

use candle_core::safetensors::Load;
use candle_core::{Device, Tensor};
use safetensors::SafeTensors;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Prefix prepended to parameter names by a distributed-training wrapper.
pub const WRAPPER_PREFIX: &str = "module.";

/// Prefix under which a wrapper checkpoint nests the actual state dict.
const STATE_DICT_PREFIX: &str = "model_state_dict.";

const DEFAULT_D_MODEL: usize = 256;
const DEFAULT_N_HEADS: usize = 8;
const DEFAULT_N_LAYERS: usize = 4;
const DEFAULT_D_FF: usize = 1024;
const DEFAULT_DROPOUT: f32 = 0.1;

/// Concrete, fully-resolved model configuration.
///
/// Every field holds a usable value even when the checkpoint omitted it;
/// `vocab_size` falls back to the tokenizer's vocabulary size rather
/// than a constant, since model and tokenizer vocabularies must agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub vocab_size: usize,
    pub d_model: usize,
    pub n_heads: usize,
    pub n_layers: usize,
    pub d_ff: usize,
    pub dropout: f32,
}

/// Parameter name -> tensor mapping, ready for model instantiation.
pub type ParameterSet = HashMap<String, Tensor>;

/// Nested `config` metadata entry. All fields optional; absent fields
/// fall back to fixed defaults during resolution.
#[derive(Debug, Default, Deserialize)]
struct HyperParams {
    n_heads: Option<usize>,
    n_layers: Option<usize>,
    d_ff: Option<usize>,
    dropout: Option<f32>,
}

/// A checkpoint as read from disk, before resolution.
///
/// Tensors are kept in the file's native header order so that the
/// wrapper-prefix heuristic can inspect the first observed key.
#[derive(Debug)]
pub struct RawCheckpoint {
    metadata: HashMap<String, String>,
    tensors: Vec<(String, Tensor)>,
}

impl RawCheckpoint {
    /// Read a safetensors checkpoint, placing tensors on `device`.
    pub fn read(path: &Path, device: &Device) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            Error::ConfigResolution(format!("cannot read {}: {e}", path.display()))
        })?;

        let st = SafeTensors::deserialize(&bytes)
            .map_err(|e| Error::ConfigResolution(format!("invalid safetensors file: {e}")))?;

        let (_header_size, header) = SafeTensors::read_metadata(&bytes)
            .map_err(|e| Error::ConfigResolution(format!("invalid safetensors header: {e}")))?;
        let metadata = header.metadata().clone().unwrap_or_default();

        // SafeTensors::tensors() walks a hash map and gives no stable
        // order; the file's native key order is ascending data offsets
        // in the header.
        let mut names: Vec<(String, usize)> = header
            .tensors()
            .into_iter()
            .map(|(name, info)| (name, info.data_offsets.0))
            .collect();
        names.sort_unstable_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        let mut tensors = Vec::with_capacity(names.len());
        for (name, _) in names {
            let view = st.tensor(&name).map_err(|e| {
                Error::ConfigResolution(format!("cannot access tensor {name}: {e}"))
            })?;
            let tensor = view.load(device).map_err(|e| {
                Error::ConfigResolution(format!("cannot load tensor {name}: {e}"))
            })?;
            tensors.push((name, tensor));
        }

        Ok(Self { metadata, tensors })
    }

    /// Build a checkpoint from already-materialized parts.
    pub fn from_parts(metadata: HashMap<String, String>, tensors: Vec<(String, Tensor)>) -> Self {
        Self { metadata, tensors }
    }
}

/// Resolve a checkpoint into a concrete configuration and a normalized
/// parameter set.
///
/// Missing metadata falls back per field; `vocab_size` falls back to
/// `tokenizer_vocab_size`. Parameter extraction prefers keys nested
/// under `model_state_dict.`; otherwise the whole tensor table is the
/// state dict. Wrapper normalization is a heuristic on the first key
/// only: when it starts with `module.`, the first 7 bytes are dropped
/// from every key.
pub fn resolve(
    checkpoint: &RawCheckpoint,
    tokenizer_vocab_size: usize,
) -> Result<(ModelConfig, ParameterSet)> {
    let vocab_size = match checkpoint.metadata.get("vocab_size") {
        Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
            Error::ConfigResolution(format!("vocab_size metadata is not an integer: {raw:?}"))
        })?,
        None => tokenizer_vocab_size,
    };

    let d_model = match checkpoint.metadata.get("d_model") {
        Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
            Error::ConfigResolution(format!("d_model metadata is not an integer: {raw:?}"))
        })?,
        None => DEFAULT_D_MODEL,
    };

    let hyper: HyperParams = match checkpoint.metadata.get("config") {
        Some(raw) => serde_json::from_str(raw).map_err(|e| {
            Error::ConfigResolution(format!("config metadata is not valid JSON: {e}"))
        })?,
        None => HyperParams::default(),
    };

    let config = ModelConfig {
        vocab_size,
        d_model,
        n_heads: hyper.n_heads.unwrap_or(DEFAULT_N_HEADS),
        n_layers: hyper.n_layers.unwrap_or(DEFAULT_N_LAYERS),
        d_ff: hyper.d_ff.unwrap_or(DEFAULT_D_FF),
        dropout: hyper.dropout.unwrap_or(DEFAULT_DROPOUT),
    };

    // Prefer keys nested under model_state_dict.; fall back to treating
    // the whole tensor table as the state dict.
    let has_nested = checkpoint
        .tensors
        .iter()
        .any(|(name, _)| name.starts_with(STATE_DICT_PREFIX));
    let state: Vec<(String, Tensor)> = if has_nested {
        checkpoint
            .tensors
            .iter()
            .filter(|(name, _)| name.starts_with(STATE_DICT_PREFIX))
            .map(|(name, t)| (name[STATE_DICT_PREFIX.len()..].to_string(), t.clone()))
            .collect()
    } else {
        checkpoint.tensors.to_vec()
    };

    // Wrapper normalization: decided by the first observed key only.
    let strip_wrapper = match state.first() {
        Some((name, _)) => name.starts_with(WRAPPER_PREFIX),
        None => {
            return Err(Error::ConfigResolution(
                "checkpoint contains no parameters".to_string(),
            ))
        }
    };

    let params: ParameterSet = state
        .into_iter()
        .map(|(name, tensor)| {
            let name = if strip_wrapper {
                name.get(WRAPPER_PREFIX.len()..).unwrap_or("").to_string()
            } else {
                name
            };
            (name, tensor)
        })
        .collect();

    Ok((config, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;

    fn tensor() -> Tensor {
        Tensor::zeros((2, 2), DType::F32, &Device::Cpu).unwrap()
    }

    fn checkpoint(meta: &[(&str, &str)], names: &[&str]) -> RawCheckpoint {
        let metadata = meta
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let tensors = names.iter().map(|n| (n.to_string(), tensor())).collect();
        RawCheckpoint::from_parts(metadata, tensors)
    }

    #[test]
    fn missing_config_metadata_yields_defaults() {
        let ckpt = checkpoint(&[], &["embedding.weight"]);
        let (config, _) = resolve(&ckpt, 1000).unwrap();
        assert_eq!(config.vocab_size, 1000);
        assert_eq!(config.d_model, 256);
        assert_eq!(config.n_heads, 8);
        assert_eq!(config.n_layers, 4);
        assert_eq!(config.d_ff, 1024);
        assert!((config.dropout - 0.1).abs() < 1e-6);
    }

    #[test]
    fn metadata_vocab_size_wins_over_tokenizer() {
        let ckpt = checkpoint(&[("vocab_size", "512")], &["embedding.weight"]);
        let (config, _) = resolve(&ckpt, 1000).unwrap();
        assert_eq!(config.vocab_size, 512);
    }

    #[test]
    fn partial_config_metadata_fills_remaining_defaults() {
        let ckpt = checkpoint(
            &[("d_model", "128"), ("config", r#"{"n_layers": 2}"#)],
            &["embedding.weight"],
        );
        let (config, _) = resolve(&ckpt, 1000).unwrap();
        assert_eq!(config.d_model, 128);
        assert_eq!(config.n_layers, 2);
        assert_eq!(config.n_heads, 8);
        assert_eq!(config.d_ff, 1024);
    }

    #[test]
    fn wrapper_prefix_stripped_from_every_key() {
        let ckpt = checkpoint(
            &[],
            &[
                "module.embedding.weight",
                "module.lm_head.weight",
                "module.norm.bias",
            ],
        );
        let (_, params) = resolve(&ckpt, 100).unwrap();
        assert_eq!(params.len(), 3);
        assert!(params.keys().all(|k| !k.starts_with("module.")));
        assert!(params.contains_key("embedding.weight"));
        assert!(params.contains_key("lm_head.weight"));
        assert!(params.contains_key("norm.bias"));
    }

    #[test]
    fn unprefixed_first_key_disables_stripping() {
        // The heuristic looks at the first key only; later prefixed
        // keys are left untouched.
        let ckpt = checkpoint(&[], &["embedding.weight", "module.norm.bias"]);
        let (_, params) = resolve(&ckpt, 100).unwrap();
        assert!(params.contains_key("embedding.weight"));
        assert!(params.contains_key("module.norm.bias"));
    }

    #[test]
    fn nested_state_dict_keys_are_preferred() {
        let ckpt = checkpoint(
            &[],
            &[
                "model_state_dict.embedding.weight",
                "model_state_dict.norm.bias",
                "optimizer_state.step",
            ],
        );
        let (_, params) = resolve(&ckpt, 100).unwrap();
        assert_eq!(params.len(), 2);
        assert!(params.contains_key("embedding.weight"));
        assert!(params.contains_key("norm.bias"));
        assert!(!params.contains_key("optimizer_state.step"));
    }

    #[test]
    fn empty_parameter_set_is_a_resolution_error() {
        let ckpt = checkpoint(&[("vocab_size", "100")], &[]);
        let err = resolve(&ckpt, 100).unwrap_err();
        assert!(matches!(err, Error::ConfigResolution(_)));
    }

    #[test]
    fn malformed_config_json_is_a_resolution_error() {
        let ckpt = checkpoint(&[("config", "{not json")], &["embedding.weight"]);
        let err = resolve(&ckpt, 100).unwrap_err();
        assert!(matches!(err, Error::ConfigResolution(_)));
    }

    #[test]
    fn disk_reads_of_mixed_prefix_keys_are_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ckpt.safetensors");
        let named = vec![
            ("module.norm.bias".to_string(), tensor()),
            ("embedding.weight".to_string(), tensor()),
        ];
        safetensors::serialize_to_file(named, &None, &path).unwrap();

        // The stripping decision belongs to whichever key the header
        // places first, and must not vary across reads of one file.
        let bytes = std::fs::read(&path).unwrap();
        let (_, header) = safetensors::SafeTensors::read_metadata(&bytes).unwrap();
        let first = header
            .tensors()
            .into_iter()
            .min_by_key(|(_, info)| info.data_offsets.0)
            .map(|(name, _)| name)
            .unwrap();
        let expected: [&str; 2] = if first.starts_with(WRAPPER_PREFIX) {
            // Every key loses exactly 7 bytes, prefixed or not.
            ["norm.bias", "ng.weight"]
        } else {
            ["embedding.weight", "module.norm.bias"]
        };

        for _ in 0..20 {
            let ckpt = RawCheckpoint::read(&path, &Device::Cpu).unwrap();
            let (_, params) = resolve(&ckpt, 100).unwrap();
            assert_eq!(params.len(), 2);
            for key in expected {
                assert!(params.contains_key(key), "missing {key} in {params:?}");
            }
        }
    }

    #[test]
    fn non_integer_vocab_size_is_a_resolution_error() {
        let ckpt = checkpoint(&[("vocab_size", "many")], &["embedding.weight"]);
        let err = resolve(&ckpt, 100).unwrap_err();
        assert!(matches!(err, Error::ConfigResolution(_)));
    }
}
