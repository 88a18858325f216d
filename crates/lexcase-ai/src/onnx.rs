//! ONNX Runtime sentence embeddings for precedent text.
//!
//! Runs a sentence-transformers model (all-MiniLM-L6-v2 by default, 384
//! dimensions) with attention-masked mean pooling. The model directory must
//! contain `model.onnx` and `tokenizer.json`.

use std::path::Path;
use std::sync::Mutex;

use lexcase_core::EmbeddingError;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::info;

use crate::embed::{Embed, normalize};

/// MiniLM was trained on 256-token windows; judgments are truncated to that.
const MAX_TOKENS: usize = 256;
const FALLBACK_DIM: usize = 384;

/// Sentence embedder backed by ONNX Runtime.
///
/// The session needs exclusive access per run, so it sits behind a mutex and
/// the embedder can be shared across concurrent retrievals.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dim: usize,
}

impl OnnxEmbedder {
    pub fn load(model_dir: &Path) -> anyhow::Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");
        anyhow::ensure!(model_path.exists(), "model.onnx not found in {model_dir:?}");
        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer.json not found in {model_dir:?}"
        );

        let session = Session::builder()?.commit_from_file(&model_path)?;
        let dim = output_dim(session.outputs()[0].dtype()).unwrap_or(FALLBACK_DIM);

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("load tokenizer: {e}"))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("set truncation: {e}"))?;
        tokenizer.with_padding(Some(tokenizers::PaddingParams::default()));

        info!(dim, model = %model_path.display(), "loaded ONNX embedding model");
        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dim,
        })
    }

    fn run_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        let batch = texts.len();
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("tokenize: {e}"))?;
        let seq_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);

        // Flat [batch, seq_len] inputs; padding positions stay zero.
        let mut ids = vec![0i64; batch * seq_len];
        let mut mask = vec![0i64; batch * seq_len];
        let mut type_ids = vec![0i64; batch * seq_len];
        for (row, enc) in encodings.iter().enumerate() {
            let base = row * seq_len;
            let cells = enc.get_ids().iter().zip(enc.get_attention_mask()).zip(enc.get_type_ids());
            for (col, ((&id, &m), &t)) in cells.enumerate() {
                ids[base + col] = id as i64;
                mask[base + col] = m as i64;
                type_ids[base + col] = t as i64;
            }
        }

        let shape = [batch as i64, seq_len as i64];
        let inputs = ort::inputs![
            "input_ids" => Tensor::from_array((shape, ids.into_boxed_slice()))?,
            "attention_mask" => Tensor::from_array((shape, mask.clone().into_boxed_slice()))?,
            "token_type_ids" => Tensor::from_array((shape, type_ids.into_boxed_slice()))?,
        ];

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("embedding session poisoned"))?;
        let outputs = session.run(inputs)?;

        // Token embeddings: [batch, out_len, dim].
        let (out_shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: &[i64] = out_shape;
        anyhow::ensure!(
            dims.len() == 3 && dims[0] as usize == batch && dims[2] as usize == self.dim,
            "unexpected output shape {dims:?}, expected [{batch}, {seq_len}, {}]",
            self.dim
        );
        let out_len = dims[1] as usize;

        Ok((0..batch)
            .map(|row| mean_pool(data, &mask[row * seq_len..(row + 1) * seq_len], row, out_len, self.dim))
            .collect())
    }
}

/// Attention-masked mean of one row's token vectors, then L2-normalized.
fn mean_pool(data: &[f32], mask: &[i64], row: usize, out_len: usize, dim: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; dim];
    let mut count = 0.0f32;
    for (tok, &m) in mask.iter().enumerate().take(out_len) {
        if m == 0 {
            continue;
        }
        let offset = (row * out_len + tok) * dim;
        for (p, &x) in pooled.iter_mut().zip(&data[offset..offset + dim]) {
            *p += x;
        }
        count += 1.0;
    }
    if count > 0.0 {
        for p in &mut pooled {
            *p /= count;
        }
    }
    normalize(&mut pooled);
    pooled
}

fn output_dim(output_type: &ort::value::ValueType) -> Option<usize> {
    match output_type {
        ort::value::ValueType::Tensor { shape, .. } => shape
            .last()
            .and_then(|&d| if d > 0 { Some(d as usize) } else { None }),
        _ => None,
    }
}

impl Embed for OnnxEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| EmbeddingError::Backend("model returned no embedding".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        self.run_batch(texts)
            .map_err(|e| EmbeddingError::Backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::dot;
    use std::path::PathBuf;

    fn require_model() -> PathBuf {
        let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../models/all-MiniLM-L6-v2");
        if !dir.join("model.onnx").exists() {
            panic!(
                "Model not found. Download from HuggingFace:\n  \
                 curl -L -o models/all-MiniLM-L6-v2/model.onnx \
                 https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx"
            );
        }
        dir
    }

    #[test]
    fn mean_pool_ignores_padding() {
        // One row, three token slots (last is padding), dim 2.
        let data = [1.0, 0.0, 0.0, 1.0, 9.0, 9.0];
        let pooled = mean_pool(&data, &[1, 1, 0], 0, 3, 2);
        assert!((pooled[0] - pooled[1]).abs() < 1e-6);
    }

    #[test]
    #[ignore = "needs models/all-MiniLM-L6-v2"]
    fn embed_is_unit_norm() {
        let e = OnnxEmbedder::load(&require_model()).unwrap();
        let v = e.embed("Right to privacy under Article 21").unwrap();
        assert_eq!(v.len(), e.dim());
        assert!((dot(&v, &v) - 1.0).abs() < 1e-4);
    }

    #[test]
    #[ignore = "needs models/all-MiniLM-L6-v2"]
    fn related_judgments_closer() {
        let e = OnnxEmbedder::load(&require_model()).unwrap();
        let shutdown = e.embed("suspension of internet services in a region").unwrap();
        let bhasin = e.embed("internet shutdown orders must be proportionate").unwrap();
        let tax = e.embed("income tax assessment of partnership firms").unwrap();
        assert!(dot(&shutdown, &bhasin) > dot(&shutdown, &tax));
    }
}
