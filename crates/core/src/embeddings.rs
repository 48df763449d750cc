use crate::error::GenAiError;
use crate::models::EmbeddedChunk;
use tracing::warn;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;

pub trait Embedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, GenAiError>;
}

/// Embeds every chunk, one request each.
///
/// A failed chunk is logged and left out; survivors keep their relative
/// order. Never fails as a whole, so an all-failing batch yields `[]`.
pub fn embed_chunks<E>(embedder: &E, chunks: Vec<String>) -> Vec<EmbeddedChunk>
where
    E: Embedder + ?Sized,
{
    let total = chunks.len();
    let mut embedded = Vec::with_capacity(total);

    for (index, text) in chunks.into_iter().enumerate() {
        match embedder.embed(&text) {
            Ok(embedding) => embedded.push(EmbeddedChunk { text, embedding }),
            Err(error) => warn!(chunk = index, total, %error, "embedding failed; dropping chunk"),
        }
    }

    embedded
}

/// Offline embedder hashing character trigrams into a fixed-size,
/// L2-normalised vector.
#[derive(Debug, Clone, Copy)]
pub struct LocalNgramEmbedder {
    pub dimensions: usize,
}

impl Default for LocalNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl Embedder for LocalNgramEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, GenAiError> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let chars: Vec<char> = text.to_lowercase().chars().collect();

        for window in chars.windows(3) {
            // FNV-1a over the trigram's UTF-8 bytes
            let mut hash = 0xcbf2_9ce4_8422_2325u64;
            let mut buffer = [0u8; 4];
            for ch in window {
                for byte in ch.encode_utf8(&mut buffer).bytes() {
                    hash ^= u64::from(byte);
                    hash = hash.wrapping_mul(0x0100_0000_01b3);
                }
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vector.iter_mut().for_each(|value| *value /= magnitude);
        }

        Ok(vector)
    }
}
