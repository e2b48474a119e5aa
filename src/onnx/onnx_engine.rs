//! # ONNX Embedding Engine
//!
//! Embedding generation with ONNX Runtime and a HuggingFace tokenizer, for
//! sentence-transformers models exported to ONNX (all-MiniLM-L6-v2 and the
//! like).
//!
//! Each text is tokenized (truncated to the model's maximum sequence
//! length), run through the graph, pooled into one vector and optionally
//! L2-normalized. Graphs that already emit a pooled `sentence_embedding`
//! output skip the pooling step.

use ndarray::{ArrayView2, ArrayViewD, Axis, Ix3};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info, instrument};

use crate::models::{Device, Embedding, EmbeddingError, ModelConfig, PoolingMode};
use crate::onnx::providers::execution_provider;

/// Output holding an already pooled embedding
const POOLED_OUTPUT: &str = "sentence_embedding";
/// Output holding per-token hidden states
const HIDDEN_STATE_OUTPUT: &str = "last_hidden_state";

/// Configuration for ONNX Runtime sessions
#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// Intra-op thread pool size for CPU inference
    pub intra_threads: usize,
}

impl Default for OnnxConfig {
    fn default() -> Self {
        Self { intra_threads: 4 }
    }
}

/// ONNX-based embedding engine for generating text embeddings
#[derive(Debug)]
pub struct OnnxEmbeddingEngine {
    /// ONNX Runtime session for model inference
    session: Session,
    /// HuggingFace tokenizer for text preprocessing
    tokenizer: Tokenizer,
    /// Graph output the embedding is read from
    output_name: String,
    /// Whether the graph declares a `token_type_ids` input
    uses_token_type_ids: bool,
    pooling: PoolingMode,
    normalize: bool,
}

impl OnnxEmbeddingEngine {
    /// Create a new ONNX embedding engine bound to `device`
    pub fn new(config: &ModelConfig, device: Device, onnx_config: &OnnxConfig) -> Result<Self, EmbeddingError> {
        info!(
            "Initializing ONNX embedding engine with model: {} on {}",
            config.model_path.display(),
            device
        );

        let builder = Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

        // Accelerators don't benefit from multiple intra-op threads
        let builder = match execution_provider(device) {
            Some(provider) => builder.with_intra_threads(1)?.with_execution_providers([provider])?,
            None => builder.with_intra_threads(onnx_config.intra_threads)?,
        };

        let session = builder
            .commit_from_file(&config.model_path)
            .map_err(|e| EmbeddingError::ModelLoadFailed {
                error: format!("Failed to load ONNX model: {}", e),
            })?;

        let mut tokenizer =
            Tokenizer::from_file(&config.tokenizer_path).map_err(|e| EmbeddingError::ModelLoadFailed {
                error: format!("Failed to load tokenizer: {}", e),
            })?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_sequence_length,
                ..Default::default()
            }))
            .map_err(|e| EmbeddingError::ModelLoadFailed {
                error: format!("Failed to configure truncation: {}", e),
            })?;
        tokenizer.with_padding(None);

        let output_name = [POOLED_OUTPUT, HIDDEN_STATE_OUTPUT]
            .iter()
            .find(|name| session.outputs.iter().any(|o| o.name == **name))
            .map(|name| name.to_string())
            .or_else(|| session.outputs.first().map(|o| o.name.clone()))
            .ok_or_else(|| EmbeddingError::ModelLoadFailed {
                error: "ONNX model declares no outputs".to_string(),
            })?;
        let uses_token_type_ids = session.inputs.iter().any(|i| i.name == "token_type_ids");

        info!(
            output = %output_name,
            token_type_ids = uses_token_type_ids,
            "ONNX embedding engine initialized"
        );
        Ok(Self {
            session,
            tokenizer,
            output_name,
            uses_token_type_ids,
            pooling: config.pooling_mode,
            normalize: config.normalize,
        })
    }

    /// Generate embeddings for a batch of texts, one per text, in order
    #[instrument(skip(self, texts), fields(text_count = texts.len()))]
    pub fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Err(EmbeddingError::InvalidInput {
                message: "Cannot embed empty text list".to_string(),
            });
        }

        let embeddings = texts
            .iter()
            .map(|text| self.embed_one(text))
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Successfully generated {} embeddings", embeddings.len());
        Ok(embeddings)
    }

    /// Generate the embedding of one text
    pub fn embed_one(&mut self, text: &str) -> Result<Embedding, EmbeddingError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbeddingError::EmbeddingFailed {
                error: format!("Tokenization failed: {}", e),
            })?;

        let attention_mask = encoding.get_attention_mask();
        let seq_len = encoding.get_ids().len() as i64;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&x| x as i64).collect();
        let mask: Vec<i64> = attention_mask.iter().map(|&x| x as i64).collect();

        let mut inputs = vec![
            ("input_ids", tensor(seq_len, input_ids)?),
            ("attention_mask", tensor(seq_len, mask)?),
        ];
        if self.uses_token_type_ids {
            let type_ids: Vec<i64> = encoding.get_type_ids().iter().map(|&x| x as i64).collect();
            inputs.push(("token_type_ids", tensor(seq_len, type_ids)?));
        }

        let outputs = self.session.run(inputs).map_err(|e| EmbeddingError::EmbeddingFailed {
            error: format!("ONNX inference failed: {}", e),
        })?;

        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbeddingError::EmbeddingFailed {
                error: format!("Failed to extract output tensor: {}", e),
            })?;

        let dims: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
        let output = ArrayViewD::from_shape(dims.as_slice(), data).map_err(|e| EmbeddingError::EmbeddingFailed {
            error: format!("Failed to create output array view: {:?}", e),
        })?;

        let pooled = pool(&output, attention_mask, self.pooling)?;
        Ok(if self.normalize { l2_normalize(pooled) } else { pooled })
    }
}

/// Shape `[1, seq_len]` input tensor
fn tensor(seq_len: i64, values: Vec<i64>) -> Result<Tensor<i64>, EmbeddingError> {
    Tensor::from_array(([1i64, seq_len], values)).map_err(|e| EmbeddingError::EmbeddingFailed {
        error: format!("Failed to create input tensor: {}", e),
    })
}

/// Reduce a single-sequence model output to one vector.
///
/// `[1, seq, hidden]` is pooled over tokens; `[1, dim]` and `[dim]` are
/// already sentence vectors and are flattened as they are.
pub(crate) fn pool(
    output: &ArrayViewD<f32>,
    attention_mask: &[u32],
    mode: PoolingMode,
) -> Result<Embedding, EmbeddingError> {
    if output.ndim() >= 2 && output.len_of(Axis(0)) == 0 {
        return Err(EmbeddingError::EmbeddingFailed {
            error: "Model returned an empty batch".to_string(),
        });
    }

    match output.ndim() {
        3 => {
            let hidden = output
                .view()
                .into_dimensionality::<Ix3>()
                .map_err(|e| EmbeddingError::EmbeddingFailed { error: e.to_string() })?;
            let tokens = hidden.index_axis(Axis(0), 0);
            match mode {
                PoolingMode::Mean => mean_pooling(tokens, attention_mask),
                PoolingMode::Cls => tokens
                    .outer_iter()
                    .next()
                    .map(|row| row.to_vec())
                    .ok_or_else(|| EmbeddingError::EmbeddingFailed {
                        error: "Empty token sequence".to_string(),
                    }),
            }
        }
        2 => Ok(output.index_axis(Axis(0), 0).iter().copied().collect()),
        1 => Ok(output.iter().copied().collect()),
        n => Err(EmbeddingError::EmbeddingFailed {
            error: format!("Unexpected {}D output tensor", n),
        }),
    }
}

/// Average the token rows whose attention mask is 1
fn mean_pooling(tokens: ArrayView2<f32>, attention_mask: &[u32]) -> Result<Embedding, EmbeddingError> {
    let (seq_len, hidden_size) = tokens.dim();
    if attention_mask.len() != seq_len {
        return Err(EmbeddingError::EmbeddingFailed {
            error: format!(
                "Attention mask length {} doesn't match sequence length {}",
                attention_mask.len(),
                seq_len
            ),
        });
    }

    let mut pooled = vec![0.0f32; hidden_size];
    let mut valid_tokens = 0usize;
    for (row, &mask) in tokens.outer_iter().zip(attention_mask) {
        if mask == 1 {
            for (acc, value) in pooled.iter_mut().zip(row.iter()) {
                *acc += value;
            }
            valid_tokens += 1;
        }
    }

    if valid_tokens == 0 {
        return Err(EmbeddingError::EmbeddingFailed {
            error: "No valid tokens found in attention mask".to_string(),
        });
    }

    for value in &mut pooled {
        *value /= valid_tokens as f32;
    }
    Ok(pooled)
}

/// L2-normalize; a zero vector is returned unchanged
pub(crate) fn l2_normalize(embedding: Embedding) -> Embedding {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return embedding;
    }
    embedding.into_iter().map(|x| x / norm).collect()
}
