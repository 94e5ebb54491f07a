use crate::error::{Error, Result};

/// A source document: an identifier plus its raw text.
///
/// Documents are read once during ingestion and dropped after chunking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Source path or name.
    pub id: String,
    /// Raw text content.
    pub text: String,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Supplies the documents a corpus is built from.
///
/// The outer `Result` covers enumeration itself (e.g. an unreadable root);
/// each inner `Result` covers one document, so a single bad file can be
/// skipped without aborting ingestion of the rest.
pub trait DocumentSource: Send + Sync {
    fn list_documents(&self) -> Result<Vec<Result<Document>>>;
}

/// A fixed, in-memory set of documents.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    documents: Vec<Document>,
}

impl InMemorySource {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    pub fn push(&mut self, document: Document) {
        self.documents.push(document);
    }
}

impl DocumentSource for InMemorySource {
    fn list_documents(&self) -> Result<Vec<Result<Document>>> {
        Ok(self.documents.iter().cloned().map(Ok).collect())
    }
}

impl<T: DocumentSource + ?Sized> DocumentSource for &T {
    fn list_documents(&self) -> Result<Vec<Result<Document>>> {
        (**self).list_documents()
    }
}

/// Shorthand for a per-document read failure.
pub(crate) fn read_failure(id: &str, reason: impl ToString) -> Error {
    Error::DocumentRead {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}
