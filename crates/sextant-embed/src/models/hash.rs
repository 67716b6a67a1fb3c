use crate::error::Result;
use crate::models::EmbeddingModel;
use crate::vector_store::BoxFuture;

/// Offline feature-hashing model.
///
/// Each lowercase word token is hashed with blake3 into one of `dimension`
/// buckets with a hash-derived sign. The result is L2-normalised, so texts
/// sharing vocabulary land close under cosine distance. Deterministic across
/// runs and machines.
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    name: String,
    dimension: usize,
}

impl HashEmbedding {
    #[must_use]
    pub fn new(name: String, dimension: usize) -> Self {
        Self {
            name,
            dimension: dimension.max(1),
        }
    }

    #[must_use]
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
        {
            let digest = blake3::hash(token.as_bytes());
            let bytes = digest.as_bytes();
            let mut word = [0u8; 8];
            word.copy_from_slice(&bytes[..8]);
            let bucket = u64::from_le_bytes(word) % self.dimension as u64;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            #[expect(clippy::cast_possible_truncation)]
            let idx = bucket as usize;
            vector[idx] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl EmbeddingModel for HashEmbedding {
    fn model_type(&self) -> &'static str {
        "hash"
    }

    fn model_name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>> {
        Box::pin(async move { Ok(self.embed_sync(text)) })
    }
}
