//! Corpus lifecycle: ingest documents, embed their chunks, and answer
//! nearest-chunk queries.
//!
//! The queryable state is a [`CorpusSnapshot`] (chunks plus the index over
//! their vectors) held behind an `Arc`. Loading builds a complete new
//! snapshot off to the side and publishes it with a single pointer swap, so
//! readers see either the old corpus or the new one, never a mix. Readers
//! clone the `Arc` and search without holding any lock.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use serde::Serialize;

use crate::{
    chunking::{Chunk, Chunker},
    document::DocumentSource,
    embedding::{Embedder, embed_checked, embed_one_checked},
    error::{Error, Result},
    index::VectorIndex,
};

/// Separator used by [`CorpusManager::retrieve_context`].
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// An immutable, coherent set of chunks and the index over their vectors.
///
/// `chunks[i]` corresponds to row `i` of `index`.
#[derive(Debug, Default)]
pub struct CorpusSnapshot {
    chunks: Vec<Chunk>,
    index: VectorIndex,
    generation: u64,
}

impl CorpusSnapshot {
    fn new(chunks: Vec<Chunk>, vectors: &[Vec<f32>], generation: u64) -> Result<Self> {
        if chunks.len() != vectors.len() {
            return Err(Error::Embedding(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }
        Ok(Self {
            index: VectorIndex::build(vectors)?,
            chunks,
            generation,
        })
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of successful loads that led to this snapshot.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Whether the corpus currently has anything to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpusState {
    Empty,
    Loaded,
}

/// Summary of one load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Documents that were read and chunked.
    pub documents: usize,
    /// Documents skipped because they could not be read.
    pub skipped: usize,
    /// Chunks indexed.
    pub chunks: usize,
    /// Vector dimension, 0 when nothing was indexed.
    pub dimension: usize,
}

/// Per-query retrieval options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrieveOptions {
    /// Maximum number of chunks to return.
    pub k: usize,
    /// Drop chunks whose text repeats a closer result.
    pub dedup: bool,
}

impl RetrieveOptions {
    pub fn new(k: usize) -> Self {
        Self { k, dedup: false }
    }

    pub fn dedup(mut self, dedup: bool) -> Self {
        self.dedup = dedup;
        self
    }
}

/// A retrieved chunk with its provenance and distance to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Retrieved {
    pub text: String,
    pub source: String,
    pub ordinal: usize,
    pub distance: f32,
}

/// Owns the corpus and its index; answers `retrieve` and rebuilds on `reload`.
pub struct CorpusManager {
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    current: RwLock<Arc<CorpusSnapshot>>,
    // Serialises loads so generations are published in order.
    load_lock: Mutex<()>,
}

impl CorpusManager {
    pub fn new(embedder: Arc<dyn Embedder>, chunker: Chunker) -> Self {
        Self {
            embedder,
            chunker,
            current: RwLock::new(Arc::new(CorpusSnapshot::default())),
            load_lock: Mutex::new(()),
        }
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<CorpusSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn state(&self) -> CorpusState {
        if self.snapshot().is_empty() {
            CorpusState::Empty
        } else {
            CorpusState::Loaded
        }
    }

    /// Ingest every document from `source` and publish the resulting corpus.
    ///
    /// Documents that fail to read are logged and skipped. If enumeration or
    /// embedding fails, nothing is published and the previous corpus stays
    /// in place; the cause is returned wrapped in [`Error::IngestionFailed`].
    pub fn load(&self, source: &dyn DocumentSource) -> Result<LoadReport> {
        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let entries = source
            .list_documents()
            .map_err(|e| Error::IngestionFailed(Box::new(e)))?;

        let mut report = LoadReport::default();
        let mut chunks: Vec<Chunk> = Vec::new();

        for entry in entries {
            match entry {
                Ok(document) => {
                    let doc_chunks = self.chunker.chunk_document(&document);
                    tracing::debug!(
                        document = %document.id,
                        chunks = doc_chunks.len(),
                        "chunked document"
                    );
                    chunks.extend(doc_chunks);
                    report.documents += 1;
                }
                Err(e) => {
                    tracing::warn!("skipping document: {e}");
                    report.skipped += 1;
                }
            }
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_checked(self.embedder.as_ref(), &texts)
            .map_err(|e| Error::IngestionFailed(Box::new(e)))?;

        let generation = self.snapshot().generation + 1;
        let snapshot = CorpusSnapshot::new(chunks, &vectors, generation)
            .map_err(|e| Error::IngestionFailed(Box::new(e)))?;

        report.chunks = snapshot.chunks.len();
        report.dimension = snapshot.index.dimension();

        *self.current.write().unwrap_or_else(PoisonError::into_inner) =
            Arc::new(snapshot);

        if report.chunks == 0 {
            tracing::info!(documents = report.documents, "no chunks to index");
        } else {
            tracing::info!(
                documents = report.documents,
                skipped = report.skipped,
                chunks = report.chunks,
                "corpus loaded"
            );
        }

        Ok(report)
    }

    /// Discard the current corpus and load a fresh one from `source`.
    ///
    /// The swap is atomic: concurrent `retrieve` calls observe either the
    /// complete old corpus or the complete new one. On failure the old
    /// corpus is kept.
    pub fn reload(&self, source: &dyn DocumentSource) -> Result<LoadReport> {
        self.load(source)
    }

    /// Texts of the `k` chunks nearest to `query`, closest first.
    pub fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>> {
        Ok(self
            .retrieve_with(query, RetrieveOptions::new(k))?
            .into_iter()
            .map(|r| r.text)
            .collect())
    }

    /// Retrieve with options, returning provenance and distances.
    ///
    /// An empty corpus returns no results without calling the embedder.
    pub fn retrieve_with(
        &self,
        query: &str,
        options: RetrieveOptions,
    ) -> Result<Vec<Retrieved>> {
        let snapshot = self.snapshot();
        if snapshot.is_empty() || options.k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = embed_one_checked(self.embedder.as_ref(), query)?;

        // With dedup, rank everything so k distinct texts can still be found.
        let limit = if options.dedup {
            snapshot.index.len()
        } else {
            options.k
        };
        let neighbors = snapshot.index.search(&query_vector, limit)?;

        let mut seen = HashSet::new();
        let results: Vec<Retrieved> = neighbors
            .into_iter()
            .filter_map(|n| {
                let chunk = snapshot.chunks.get(n.position)?;
                if options.dedup && !seen.insert(chunk.text.as_str()) {
                    return None;
                }
                Some(Retrieved {
                    text: chunk.text.clone(),
                    source: chunk.source.clone(),
                    ordinal: chunk.ordinal,
                    distance: n.distance,
                })
            })
            .take(options.k)
            .collect();

        tracing::debug!(query, results = results.len(), "retrieved chunks");
        Ok(results)
    }

    /// Retrieved chunk texts joined into one context block, or an empty
    /// string when nothing matches.
    pub fn retrieve_context(&self, query: &str, k: usize) -> Result<String> {
        Ok(self.retrieve(query, k)?.join(CONTEXT_SEPARATOR))
    }
}

impl std::fmt::Debug for CorpusManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorpusManager")
            .field("chunker", &self.chunker)
            .finish_non_exhaustive()
    }
}
