use std::path::Path;

use policybot_core::config::EmbeddingSettings;
use policybot_embed::{get_default_embedder, MINILM_DIM};

fn cosine(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

#[test]
fn fake_embedder_shapes_and_determinism() {
    let settings = EmbeddingSettings { use_fake: true, ..EmbeddingSettings::default() };
    let embedder = get_default_embedder(&settings, Path::new("does/not/matter")).expect("embedder");
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), MINILM_DIM, "embedding dim matches MiniLM");
    assert_eq!(embedder.dim(), MINILM_DIM);
    assert!(embedder.model_id().starts_with("fake:"));

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[test]
fn fake_embedder_ranks_shared_words_higher() {
    let settings = EmbeddingSettings { use_fake: true, ..EmbeddingSettings::default() };
    let embedder = get_default_embedder(&settings, Path::new(".")).expect("embedder");
    let embs = embedder
        .embed_batch(&[
            "grace period for premium payment".to_string(),
            "the grace period lasts thirty days".to_string(),
            "hospital network directory".to_string(),
        ])
        .expect("embed");
    assert!(cosine(&embs[0], &embs[1]) > cosine(&embs[0], &embs[2]));
}

#[test]
fn missing_model_dir_is_reported() {
    let tmp = tempfile::tempdir().expect("tmp");
    let settings = EmbeddingSettings::default();
    let err = get_default_embedder(&settings, &tmp.path().join("absent")).err().expect("must fail");
    let msg = err.to_string();
    assert!(msg.contains("absent"));
    assert!(msg.contains("huggingface-cli download sentence-transformers/all-MiniLM-L6-v2"));
}
