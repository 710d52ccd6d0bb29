use async_trait::async_trait;
use fxhash::hash64;

use crate::normalize::{l2_normalize_in_place, truncate_chars};
use crate::{Embedder, EmbeddingError};

/// Deterministic embedder used offline and in tests.
///
/// Every whitespace-separated token contributes its character unigrams and
/// bigrams, hashed into `dimension` signed buckets. Texts sharing Korean
/// syllable pairs ("역삼", "주거") land close together, which is enough for
/// ranking fixtures without a model.
#[derive(Debug, Clone)]
pub struct StubEmbedder {
    dimension: usize,
    model_name: String,
    max_input_chars: usize,
}

impl StubEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            model_name: format!("stub-bigram-{dimension}"),
            max_input_chars: 2000,
        }
    }

    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    pub fn with_max_input_chars(mut self, max: usize) -> Self {
        self.max_input_chars = max.max(1);
        self
    }

    /// Synchronous core, shared by the async trait methods.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dimension];
        let text = truncate_chars(text, self.max_input_chars).to_lowercase();
        for token in text.split_whitespace() {
            let chars: Vec<char> = token.chars().filter(|c| c.is_alphanumeric()).collect();
            for c in &chars {
                let mut buf = [0u8; 4];
                self.bump(&mut v, c.encode_utf8(&mut buf).as_bytes(), 0.5);
            }
            for pair in chars.windows(2) {
                let gram: String = pair.iter().collect();
                self.bump(&mut v, gram.as_bytes(), 1.0);
            }
        }
        l2_normalize_in_place(&mut v);
        v
    }

    fn bump(&self, v: &mut [f32], feature: &[u8], weight: f32) {
        let h = hash64(feature);
        let idx = (h % self.dimension as u64) as usize;
        let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
        v[idx] += sign * weight;
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
