use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::types::Note;

/// Embedding dimension for bge-small-en-v1.5.
pub const DIMENSIONS: usize = 384;

/// Characters of note content fed to the model. The model truncates at 512 tokens
/// anyway; cutting early keeps tokenization cheap for very long notes.
const MAX_CONTENT_CHARS: usize = 4_000;

/// Local text-embedding model used to find related notes.
///
/// The ONNX session is not safe for concurrent inference, so calls are serialized
/// behind a `Mutex`. Downloads (~33MB) happen on first use and are cached in
/// `cache_dir`.
pub struct EmbeddingPipeline {
    model: Mutex<TextEmbedding>,
}

impl EmbeddingPipeline {
    pub fn new(cache_dir: &Path, show_progress: bool) -> Result<Self> {
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::BGESmallENV15)
                .with_cache_dir(cache_dir.to_path_buf())
                .with_show_download_progress(show_progress),
        )?;
        Ok(Self { model: Mutex::new(model) })
    }

    /// One normalized vector per note, in input order.
    pub fn embed_notes(&self, notes: &[Note]) -> Result<Vec<Vec<f32>>> {
        if notes.is_empty() {
            return Ok(vec![]);
        }
        let texts: Vec<String> = notes.iter().map(note_text).collect();
        let model = self.model.lock().map_err(|e| anyhow::anyhow!("model lock poisoned: {e}"))?;
        let results = model.embed(texts, None)?;
        Ok(results.into_iter().map(normalize).collect())
    }
}

/// Text that represents a note to the embedding model: title, blank line, body.
pub fn note_text(note: &Note) -> String {
    let body: String = note.content.chars().take(MAX_CONTENT_CHARS).collect();
    format!("{}\n\n{}", note.title, body)
}

/// L2-normalize so cosine similarity equals the dot product.
fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-10 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}
