use serde::{Deserialize, Serialize};

use crate::normalize::cosine_similarity;

/// A piece of reference text scored against a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub content: String,
    pub similarity: f32,
    pub source_id: String,
}

/// Borrowed view of one rankable candidate.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub source_id: &'a str,
    pub content: &'a str,
    pub vector: &'a [f32],
}

/// Score candidates against `query` and keep the best `top_k`.
///
/// The result is ordered by similarity, highest first; equal scores are
/// ordered by `source_id` so repeated calls return the same sequence.
/// Candidates below `min_similarity` are dropped.
pub fn rank_chunks<'a, I>(
    query: &[f32],
    candidates: I,
    top_k: usize,
    min_similarity: f32,
) -> Vec<RetrievedChunk>
where
    I: IntoIterator<Item = Candidate<'a>>,
{
    if top_k == 0 {
        return Vec::new();
    }

    let mut chunks: Vec<RetrievedChunk> = candidates
        .into_iter()
        .filter_map(|c| {
            let similarity = cosine_similarity(query, c.vector);
            (similarity >= min_similarity).then(|| RetrievedChunk {
                content: c.content.to_string(),
                similarity,
                source_id: c.source_id.to_string(),
            })
        })
        .collect();

    sort_chunks(&mut chunks);
    chunks.truncate(top_k);
    chunks
}

/// Order chunks by descending similarity, ties by ascending source id.
pub fn sort_chunks(chunks: &mut [RetrievedChunk]) {
    chunks.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.source_id.cmp(&b.source_id))
    });
}
