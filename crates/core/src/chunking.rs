use crate::error::IngestError;
use crate::models::{PipelineOptions, DEFAULT_CHUNK_SIZE};

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl From<&PipelineOptions> for ChunkingConfig {
    fn from(value: &PipelineOptions) -> Self {
        Self {
            chunk_size: value.chunk_size,
        }
    }
}

/// Splits `text` into consecutive slices of `chunk_size` characters.
///
/// Only the last slice may be shorter. Joining the output reproduces the
/// input exactly; empty input yields no chunks.
pub fn chunk_text(text: &str, config: ChunkingConfig) -> Result<Vec<String>, IngestError> {
    if config.chunk_size == 0 {
        return Err(IngestError::InvalidChunkConfig(
            "chunk size must be greater than zero".to_string(),
        ));
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0usize;

    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count == config.chunk_size {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize) -> ChunkingConfig {
        ChunkingConfig { chunk_size }
    }

    #[test]
    fn empty_text_has_no_chunks() -> Result<(), IngestError> {
        assert!(chunk_text("", config(10))?.is_empty());
        Ok(())
    }

    #[test]
    fn chunks_are_fixed_size_with_remainder_last() -> Result<(), IngestError> {
        let chunks = chunk_text("abcdefghij", config(4))?;
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
        Ok(())
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() -> Result<(), IngestError> {
        let chunks = chunk_text("abcdef", config(3))?;
        assert_eq!(chunks, vec!["abc", "def"]);
        Ok(())
    }

    #[test]
    fn chunks_concatenate_to_input_for_multibyte_text() -> Result<(), Box<dyn std::error::Error>> {
        let text = "Comité técnico: señor Núñez, presidente.\n\tAcción ñandú ü".repeat(7);
        for size in [1, 2, 3, 7, 64, 1_000] {
            let chunks = chunk_text(&text, config(size))?;
            assert_eq!(chunks.concat(), text);

            let (last, rest) = chunks.split_last().ok_or("no chunks")?;
            assert!(rest.iter().all(|chunk| chunk.chars().count() == size));
            let last_len = last.chars().count();
            assert!(last_len >= 1 && last_len <= size);
        }
        Ok(())
    }

    #[test]
    fn default_size_is_one_thousand() -> Result<(), IngestError> {
        let text = "x".repeat(2_500);
        let chunks = chunk_text(&text, ChunkingConfig::default())?;
        let lengths: Vec<usize> = chunks.iter().map(String::len).collect();
        assert_eq!(lengths, vec![1_000, 1_000, 500]);
        Ok(())
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(matches!(
            chunk_text("abc", config(0)),
            Err(IngestError::InvalidChunkConfig(_))
        ));
    }
}
