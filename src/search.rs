use serde::Serialize;

use crate::{
    corpus::{CorpusManager, RetrieveOptions, Retrieved},
    error::Result,
};

/// A retrieval result with its 1-based rank.
#[derive(Debug, Clone, Serialize)]
pub struct RankedChunk {
    pub rank: usize,
    pub distance: f32,
    pub source: String,
    pub ordinal: usize,
    pub text: String,
}

/// Run a query against the corpus and attach ranks.
pub fn execute_search(
    corpus: &CorpusManager,
    query: &str,
    options: RetrieveOptions,
) -> Result<Vec<RankedChunk>> {
    Ok(corpus
        .retrieve_with(query, options)?
        .into_iter()
        .enumerate()
        .map(|(i, r)| to_ranked(i + 1, r))
        .collect())
}

fn to_ranked(rank: usize, r: Retrieved) -> RankedChunk {
    RankedChunk {
        rank,
        distance: r.distance,
        source: r.source,
        ordinal: r.ordinal,
        text: r.text,
    }
}

/// Maximum characters of chunk text shown per result in human output.
pub const PREVIEW_MAX_CHARS: usize = 240;

/// Shorten text for terminal display, cutting on a char boundary.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Format results for human-readable terminal output.
pub fn format_human(results: &[RankedChunk]) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }

    let mut out = String::new();
    for r in results {
        out.push_str(&format!(
            "{:>3}. [{:.4}] {} #{}\n     {}\n",
            r.rank,
            r.distance,
            r.source,
            r.ordinal,
            preview(&r.text, PREVIEW_MAX_CHARS)
        ));
    }
    out.push_str(&format!("\n{} result(s)", results.len()));
    out
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    query: &'a str,
    result_count: usize,
    results: &'a [RankedChunk],
}

/// Format results as a JSON document.
pub fn format_json(results: &[RankedChunk], query: &str) -> Result<String> {
    let output = JsonOutput {
        query,
        result_count: results.len(),
        results,
    };
    serde_json::to_string(&output)
        .map_err(|e| crate::error::Error::Config(format!("failed to encode JSON: {e}")))
}
