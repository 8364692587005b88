use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use ruvector_core::index::hnsw::HnswIndex;
use ruvector_core::index::VectorIndex;
use ruvector_core::types::{DistanceMetric, HnswConfig};

use crate::embeddings::EmbeddingPipeline;
use crate::similarity::SimilarityProvider;
use crate::types::{Note, SimilarNote};

/// Neighbours requested per lookup.
pub const DEFAULT_NEIGHBOURS: usize = 10;

/// Matches below this similarity are noise for "related notes".
const MIN_SIMILARITY: f64 = 0.30;

/// Notes embedded per model call while building.
const BATCH: usize = 64;

struct IndexedNote {
    title: String,
    updated_time: i64,
    embedding: Vec<f32>,
}

/// HNSW index over note embeddings, queried by note id.
///
/// The vectors are kept alongside the graph so a note's own embedding can be used
/// as the query. Re-inserting a note replaces its vector. Removed notes stay in the
/// graph until the next rebuild but are skipped by lookups.
pub struct SimilarityIndex {
    hnsw: HnswIndex,
    notes: HashMap<String, IndexedNote>,
}

impl SimilarityIndex {
    /// `max_elements` is an upper bound of notes and can be generous.
    pub fn new(dimensions: usize, max_elements: usize) -> Result<Self> {
        let config = HnswConfig {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            max_elements,
        };
        let hnsw = HnswIndex::new(dimensions, DistanceMetric::Cosine, config)
            .map_err(|e| anyhow::anyhow!("Failed to create HNSW index: {e}"))?;
        Ok(Self {
            hnsw,
            notes: HashMap::new(),
        })
    }

    pub fn insert_batch(&mut self, entries: Vec<(&Note, Vec<f32>)>) -> Result<()> {
        let graph_entries: Vec<(String, Vec<f32>)> = entries
            .iter()
            .map(|(note, emb)| (note.id.clone(), emb.clone()))
            .collect();
        self.hnsw
            .add_batch(graph_entries)
            .map_err(|e| anyhow::anyhow!("Index batch add failed: {e}"))?;
        for (note, embedding) in entries {
            self.notes.insert(
                note.id.clone(),
                IndexedNote {
                    title: note.title.clone(),
                    updated_time: note.updated_time,
                    embedding,
                },
            );
        }
        Ok(())
    }

    /// Forget a note. Its graph node stays but is filtered from results.
    pub fn remove(&mut self, note_id: &str) {
        self.notes.remove(note_id);
    }

    pub fn contains(&self, note_id: &str) -> bool {
        self.notes.contains_key(note_id)
    }

    /// Up to `k` notes most similar to `note_id`, best first. Unknown ids yield nothing.
    pub fn similar_to(&self, note_id: &str, k: usize) -> Result<Vec<SimilarNote>> {
        let Some(query) = self.notes.get(note_id) else {
            return Ok(vec![]);
        };
        // Headroom for the note itself and removed notes still in the graph.
        let raw = self
            .hnsw
            .search(&query.embedding, k * 2 + 1)
            .map_err(|e| anyhow::anyhow!("Index search failed: {e}"))?;

        // Cosine distance -> similarity, clamped to [0, 1].
        let mut results: Vec<SimilarNote> = raw
            .into_iter()
            .filter(|hit| hit.id != note_id)
            .filter_map(|hit| {
                let meta = self.notes.get(&hit.id)?;
                Some(SimilarNote {
                    id: hit.id,
                    title: meta.title.clone(),
                    similarity: f64::from((1.0 - hit.score).clamp(0.0, 1.0)),
                    updated_time: meta.updated_time,
                })
            })
            .filter(|s| s.similarity >= MIN_SIMILARITY)
            .collect();

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(k);
        Ok(results)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

/// [`SimilarityProvider`] backed by a local embedding model and HNSW index.
pub struct LocalSimilarity {
    pipeline: Arc<EmbeddingPipeline>,
    index: Arc<tokio::sync::RwLock<SimilarityIndex>>,
    neighbours: usize,
}

impl LocalSimilarity {
    /// Embed every note and build a fresh index. Inference runs on the blocking pool.
    pub async fn build(pipeline: Arc<EmbeddingPipeline>, notes: Arc<Vec<Note>>) -> Result<Self> {
        let worker = pipeline.clone();
        let index = tokio::task::spawn_blocking(move || -> Result<SimilarityIndex> {
            // 2x headroom so later inserts don't hit capacity before the next rebuild.
            let mut index =
                SimilarityIndex::new(crate::embeddings::DIMENSIONS, (notes.len() * 2).max(2000))?;
            for chunk in notes.chunks(BATCH) {
                let embeddings = worker.embed_notes(chunk)?;
                index.insert_batch(chunk.iter().zip(embeddings).collect())?;
            }
            Ok(index)
        })
        .await
        .map_err(|e| anyhow::anyhow!("Index build task failed: {e}"))??;

        tracing::debug!("Built similarity index with {} notes", index.len());
        Ok(Self {
            pipeline,
            index: Arc::new(tokio::sync::RwLock::new(index)),
            neighbours: DEFAULT_NEIGHBOURS,
        })
    }

    /// Re-embed notes that were added or edited since the last build.
    pub async fn upsert(&self, changed: Vec<Note>) -> Result<()> {
        if changed.is_empty() {
            return Ok(());
        }
        let worker = self.pipeline.clone();
        let (changed, embeddings) = tokio::task::spawn_blocking(move || {
            let embeddings = worker.embed_notes(&changed);
            (changed, embeddings)
        })
        .await
        .map_err(|e| anyhow::anyhow!("Embedding task failed: {e}"))?;
        let embeddings = embeddings?;

        // Write lock held for the insert only.
        let mut index = self.index.write().await;
        index.insert_batch(changed.iter().zip(embeddings).collect())
    }

    pub async fn remove(&self, note_id: &str) {
        self.index.write().await.remove(note_id);
    }
}

impl SimilarityProvider for LocalSimilarity {
    async fn fetch_similar(&self, note_id: &str) -> Result<Vec<SimilarNote>> {
        self.index.read().await.similar_to(note_id, self.neighbours)
    }
}
