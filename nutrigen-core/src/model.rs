//! The recipe transformer: a decoder-only model instantiated from a
//! resolved [`ModelConfig`](crate::ModelConfig) and checkpoint
//! parameters.
//!
//! Token embedding scaled by sqrt(d_model), fixed sinusoidal positional
//! encoding, post-norm blocks of causal multi-head self-attention and a
//! ReLU feed-forward, a final layer norm and a linear head over the
//! vocabulary. Dropout layers exist per config but always run in
//! inference mode.

use candle_core::{DType, Device, Result as CandleResult, Tensor, D};
use candle_nn::{
    embedding, layer_norm, linear, ops, Dropout, Embedding, LayerNorm, LayerNormConfig, Linear,
    Module, VarBuilder,
};

use crate::checkpoint::{ModelConfig, ParameterSet};
use crate::error::{Error, Result};

/// Positional-encoding capacity; sequences never grow past this.
pub const MAX_POSITIONS: usize = 512;

#[derive(Debug)]
struct SelfAttention {
    q_proj: Linear,
    k_proj: Linear,
    v_proj: Linear,
    out_proj: Linear,
    n_heads: usize,
    head_dim: usize,
}

impl SelfAttention {
    fn new(config: &ModelConfig, vb: VarBuilder) -> CandleResult<Self> {
        if config.d_model % config.n_heads != 0 {
            candle_core::bail!(
                "d_model {} is not divisible by n_heads {}",
                config.d_model,
                config.n_heads
            );
        }
        let d = config.d_model;
        Ok(Self {
            q_proj: linear(d, d, vb.pp("q_proj"))?,
            k_proj: linear(d, d, vb.pp("k_proj"))?,
            v_proj: linear(d, d, vb.pp("v_proj"))?,
            out_proj: linear(d, d, vb.pp("out_proj"))?,
            n_heads: config.n_heads,
            head_dim: d / config.n_heads,
        })
    }

    fn forward(&self, x: &Tensor, mask: &Tensor) -> CandleResult<Tensor> {
        let (batch, seq_len, _) = x.dims3()?;

        let split = |t: Tensor| -> CandleResult<Tensor> {
            t.reshape((batch, seq_len, self.n_heads, self.head_dim))?
                .transpose(1, 2)?
                .contiguous()
        };
        let q = split(self.q_proj.forward(x)?)?;
        let k = split(self.k_proj.forward(x)?)?;
        let v = split(self.v_proj.forward(x)?)?;

        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let scores = (q.matmul(&k.transpose(D::Minus2, D::Minus1)?.contiguous()?)? * scale)?;
        let scores = scores.broadcast_add(mask)?;
        let probs = ops::softmax_last_dim(&scores)?;

        let context = probs
            .matmul(&v)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((batch, seq_len, self.n_heads * self.head_dim))?;
        self.out_proj.forward(&context)
    }
}

#[derive(Debug)]
struct DecoderBlock {
    attn: SelfAttention,
    norm1: LayerNorm,
    norm2: LayerNorm,
    ff_up: Linear,
    ff_down: Linear,
    dropout: Dropout,
}

impl DecoderBlock {
    fn new(config: &ModelConfig, vb: VarBuilder) -> CandleResult<Self> {
        Ok(Self {
            attn: SelfAttention::new(config, vb.pp("attn"))?,
            norm1: layer_norm(config.d_model, LayerNormConfig::default(), vb.pp("norm1"))?,
            norm2: layer_norm(config.d_model, LayerNormConfig::default(), vb.pp("norm2"))?,
            ff_up: linear(config.d_model, config.d_ff, vb.pp("ff_up"))?,
            ff_down: linear(config.d_ff, config.d_model, vb.pp("ff_down"))?,
            dropout: Dropout::new(config.dropout),
        })
    }

    fn forward(&self, x: &Tensor, mask: &Tensor) -> CandleResult<Tensor> {
        // Inference only, so dropout always runs with train = false.
        let attn_out = self.dropout.forward(&self.attn.forward(x, mask)?, false)?;
        let h = self.norm1.forward(&(x + attn_out)?)?;

        let ff = self.ff_down.forward(&self.ff_up.forward(&h)?.relu()?)?;
        let ff = self.dropout.forward(&ff, false)?;
        self.norm2.forward(&(&h + ff)?)
    }
}

/// The concrete recipe-generation model.
#[derive(Debug)]
pub struct RecipeTransformer {
    embedding: Embedding,
    pos_encoding: Tensor,
    blocks: Vec<DecoderBlock>,
    norm: LayerNorm,
    lm_head: Linear,
    device: Device,
    d_model: usize,
}

impl RecipeTransformer {
    /// Build the model from a configuration and a variable builder over
    /// the checkpoint parameters.
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> CandleResult<Self> {
        let device = vb.device().clone();
        let embedding = embedding(config.vocab_size, config.d_model, vb.pp("embedding"))?;
        let blocks = (0..config.n_layers)
            .map(|i| DecoderBlock::new(config, vb.pp(format!("blocks.{i}"))))
            .collect::<CandleResult<Vec<_>>>()?;
        let norm = layer_norm(config.d_model, LayerNormConfig::default(), vb.pp("norm"))?;
        let lm_head = linear(config.d_model, config.vocab_size, vb.pp("lm_head"))?;
        let pos_encoding = positional_encoding(MAX_POSITIONS, config.d_model, &device)?;

        Ok(Self {
            embedding,
            pos_encoding,
            blocks,
            norm,
            lm_head,
            device,
            d_model: config.d_model,
        })
    }

    /// Instantiate from a resolved parameter set, reporting shape or
    /// name mismatches as [`Error::ParameterMismatch`].
    pub fn from_parameters(
        config: &ModelConfig,
        params: ParameterSet,
        device: &Device,
    ) -> Result<Self> {
        let vb = VarBuilder::from_tensors(params, DType::F32, device);
        Self::new(config, vb).map_err(|e| Error::ParameterMismatch(e.to_string()))
    }

    /// Forward pass over the full current sequence.
    ///
    /// `input_ids` has shape `(1, seq_len)`; returns next-token logits
    /// for the last position, shape `(vocab_size,)`.
    pub fn forward(&self, input_ids: &Tensor) -> CandleResult<Tensor> {
        let (_batch, seq_len) = input_ids.dims2()?;

        let mut h = self.embedding.forward(input_ids)?;
        h = (h * (self.d_model as f64).sqrt())?;
        let pos = self.pos_encoding.narrow(0, 0, seq_len)?;
        h = h.broadcast_add(&pos)?;

        let mask = causal_mask(seq_len, &self.device)?;
        for block in &self.blocks {
            h = block.forward(&h, &mask)?;
        }
        let h = self.norm.forward(&h)?;
        let logits = self.lm_head.forward(&h)?;

        logits.narrow(1, seq_len - 1, 1)?.squeeze(1)?.squeeze(0)
    }

    /// Device this model lives on.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Longest sequence the positional encoding supports.
    pub fn max_positions(&self) -> usize {
        MAX_POSITIONS
    }
}

/// Fixed sinusoidal positional encoding, shape `(max_len, d_model)`.
fn positional_encoding(max_len: usize, d_model: usize, device: &Device) -> CandleResult<Tensor> {
    let mut data = vec![0f32; max_len * d_model];
    for pos in 0..max_len {
        for i in 0..d_model {
            let exponent = (2 * (i / 2)) as f32 / d_model as f32;
            let angle = pos as f32 / 10000f32.powf(exponent);
            data[pos * d_model + i] = if i % 2 == 0 { angle.sin() } else { angle.cos() };
        }
    }
    Tensor::from_vec(data, (max_len, d_model), device)
}

/// Additive causal mask, shape `(seq_len, seq_len)`: zero on and below
/// the diagonal, negative infinity above.
fn causal_mask(seq_len: usize, device: &Device) -> CandleResult<Tensor> {
    let mut data = vec![0f32; seq_len * seq_len];
    for i in 0..seq_len {
        for j in (i + 1)..seq_len {
            data[i * seq_len + j] = f32::NEG_INFINITY;
        }
    }
    Tensor::from_vec(data, (seq_len, seq_len), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::VarMap;

    fn tiny_config() -> ModelConfig {
        ModelConfig {
            vocab_size: 16,
            d_model: 8,
            n_heads: 2,
            n_layers: 1,
            d_ff: 16,
            dropout: 0.1,
        }
    }

    #[test]
    fn forward_returns_vocab_sized_logits() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = RecipeTransformer::new(&tiny_config(), vb).unwrap();

        let input = Tensor::new(&[1u32, 2, 3], &device).unwrap().unsqueeze(0).unwrap();
        let logits = model.forward(&input).unwrap();
        assert_eq!(logits.dims(), &[16]);
    }

    #[test]
    fn missing_parameters_are_a_mismatch_error() {
        let device = Device::Cpu;
        let err =
            RecipeTransformer::from_parameters(&tiny_config(), ParameterSet::new(), &device)
                .unwrap_err();
        assert!(matches!(err, Error::ParameterMismatch(_)));
    }

    #[test]
    fn indivisible_head_count_is_rejected() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let config = ModelConfig {
            n_heads: 3,
            ..tiny_config()
        };
        assert!(RecipeTransformer::new(&config, vb).is_err());
    }
}
