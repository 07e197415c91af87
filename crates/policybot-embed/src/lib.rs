//! Sentence embeddings for chunk indexing and query lookup.
//!
//! `SentenceEmbedder` runs a BERT-family sentence-transformer
//! (all-MiniLM-L6-v2 by default) with candle from a local model directory:
//! `config.json`, `tokenizer.json` and `model.safetensors` (or
//! `pytorch_model.bin`). `FakeEmbedder` is a deterministic hashing stand-in
//! selected by `embedding.use_fake`.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use policybot_core::config::EmbeddingSettings;
use policybot_core::traits::Embedder;

mod device;
mod pool;
mod tokenize;

pub use device::select_device;
pub use pool::masked_mean_l2;
pub use tokenize::tokenize_on_device;

/// Output size of all-MiniLM-L6-v2; the fake embedder matches it.
pub const MINILM_DIM: usize = 384;

pub struct SentenceEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
    id: String,
}

/// Hugging Face repository the default model directory is fetched from.
pub const MODEL_REPO: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Shell command that fetches the model files into `model_dir`.
pub fn download_hint(model_dir: &Path) -> String {
    format!(
        "huggingface-cli download {MODEL_REPO} config.json tokenizer.json model.safetensors --local-dir {}",
        model_dir.display()
    )
}

impl SentenceEmbedder {
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        if !model_dir.exists() {
            return Err(policybot_core::error::Error::NotFound(format!(
                "embedding model directory {} (download {MODEL_REPO} there first: `{}`)",
                model_dir.display(),
                download_hint(model_dir)
            ))
            .into());
        }
        let device = select_device();
        info!(dir = %model_dir.display(), "loading sentence embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let config: BertConfig = serde_json::from_str(
            &std::fs::read_to_string(&config_path).with_context(|| format!("reading {}", config_path.display()))?,
        )
        .with_context(|| format!("parsing {}", config_path.display()))?;

        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(vb, &config)?;

        let dim = config.hidden_size;
        let name = model_dir.file_name().map_or_else(|| "model".to_string(), |n| n.to_string_lossy().to_string());
        let id = format!("bert:{name}:d{dim}");
        info!(%id, "sentence embedding model loaded");
        Ok(Self { model, tokenizer, device, dim, max_len, id })
    }

    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, token_type_ids, attention_mask) =
            tokenize_on_device(&self.tokenizer, text, self.max_len, &self.device)?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let emb = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1::<f32>()?;
        if emb.len() != self.dim {
            return Err(anyhow!("embedding dim mismatch: got {} expected {}", emb.len(), self.dim));
        }
        if start.elapsed().as_millis() > 250 {
            warn!(ms = start.elapsed().as_millis() as u64, "slow embedding");
        }
        Ok(emb)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        debug!(path = %safetensors.display(), "reading safetensors weights");
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let pickle = model_dir.join("pytorch_model.bin");
    if pickle.exists() {
        debug!(path = %pickle.display(), "reading pytorch weights");
        let weights = candle_core::pickle::read_all(&pickle)?;
        return Ok(weights.into_iter().collect());
    }
    Err(anyhow!("no model.safetensors or pytorch_model.bin in {}", model_dir.display()))
}

impl Embedder for SentenceEmbedder {
    fn model_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_text(t)).collect()
    }
}

/// Bag-of-words hashing embedder. Texts sharing words land close together,
/// which is enough to exercise retrieval without model weights.
pub struct FakeEmbedder { dim: usize, id: String }

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim, id: format!("fake:xxhash:d{dim}") } }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        let tokens = text
            .split_whitespace()
            .map(|t| t.chars().filter(|c| c.is_alphanumeric()).flat_map(char::to_lowercase).collect::<String>())
            .filter(|t| !t.is_empty());
        for (i, token) in tokens.enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

impl Embedder for FakeEmbedder {
    fn model_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Build the embedder once per process; callers share the returned handle.
pub fn get_default_embedder(settings: &EmbeddingSettings, model_dir: &Path) -> Result<Arc<dyn Embedder>> {
    if settings.use_fake {
        info!("using FakeEmbedder");
        return Ok(Arc::new(FakeEmbedder::new(MINILM_DIM)));
    }
    Ok(Arc::new(SentenceEmbedder::load(model_dir, settings.max_len)?))
}
