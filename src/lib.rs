//! docrag - exact vector retrieval over chunked documents.
//!
//! docrag is the retrieval half of a retrieval-augmented-generation
//! pipeline. It splits documents into overlapping word windows, embeds each
//! window into a fixed-dimension vector, and answers "which `k` chunks are
//! closest to this query" by exact squared-L2 search.
//!
//! # Quick start
//!
//! ```
//! use std::sync::Arc;
//!
//! use docrag::{Chunker, CorpusManager, Document, InMemorySource};
//! use docrag::chunking::ChunkingConfig;
//! use docrag::embedding::HashingEmbedder;
//!
//! let corpus = CorpusManager::new(
//!     Arc::new(HashingEmbedder::default()),
//!     Chunker::new(ChunkingConfig::new(8, 2).unwrap()),
//! );
//!
//! let source = InMemorySource::new(vec![
//!     Document::new("rust.txt", "Rust guarantees memory safety without a garbage collector"),
//!     Document::new("bread.txt", "Sourdough bread needs a lively starter and patience"),
//! ]);
//! corpus.load(&source).unwrap();
//!
//! let hits = corpus.retrieve("memory safety in rust", 1).unwrap();
//! assert_eq!(hits.len(), 1);
//! assert!(hits[0].contains("memory safety"));
//! ```

pub mod chunking;
pub mod config_db;
pub mod corpus;
pub mod data_dir;
pub mod document;
pub mod embedding;
pub mod error;
pub mod index;
pub mod model_manager;
pub mod search;
pub mod walker;

pub use chunking::{Chunk, Chunker};
pub use config_db::ConfigDb;
pub use corpus::CorpusManager;
pub use data_dir::DataDir;
pub use document::{Document, DocumentSource, InMemorySource};
pub use error::{Error, Result};
pub use index::VectorIndex;
pub use model_manager::ModelManager;
pub use walker::DirectorySource;
