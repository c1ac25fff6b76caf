//! Chunking for the embed stage handler (spec §4.7.4). Grounded on the
//! teacher's `copilot-ingestion::chunking::TextChunker` fixed-size strategy,
//! narrowed to the one strategy the pipeline actually uses (overlapping
//! fixed windows sized in characters) and extended with the title-chunk
//! behavior `KnowledgeBase.title_chunk_enabled` controls.

use tracing::debug;

/// One chunk ready for embedding, before an embedding vector is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOutput {
    pub index: u32,
    pub content: String,
    pub start_char: u64,
    pub end_char: u64,
    pub is_title: bool,
}

pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    /// `chunk_size`/`chunk_overlap` are character counts here (the embed
    /// handler works in characters; token estimation lives with the caller
    /// that picked these values from `KnowledgeBase` config).
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
        }
    }

    /// Splits `text` into overlapping fixed-size windows, then applies the
    /// title-chunk policy from spec §4.7.4: a dedicated title chunk when
    /// `title_chunk_enabled`, otherwise the title prepended into chunk 0.
    pub fn chunk(&self, title: &str, text: &str, title_chunk_enabled: bool) -> Vec<ChunkOutput> {
        let body_chunks = self.chunk_fixed_size(text);

        let mut result = Vec::with_capacity(body_chunks.len() + 1);
        let mut next_index = 0u32;

        if title_chunk_enabled && !title.is_empty() {
            result.push(ChunkOutput {
                index: next_index,
                content: format!("Document Title: {title}"),
                start_char: 0,
                end_char: 0,
                is_title: true,
            });
            next_index += 1;
        }

        for (i, (content, start, end)) in body_chunks.into_iter().enumerate() {
            let content = if i == 0 && !title_chunk_enabled && !title.is_empty() {
                format!("{title}\n\n{content}")
            } else {
                content
            };
            result.push(ChunkOutput {
                index: next_index,
                content,
                start_char: start as u64,
                end_char: end as u64,
                is_title: false,
            });
            next_index += 1;
        }

        debug!(chunk_count = result.len(), "document chunked");
        result
    }

    fn chunk_fixed_size(&self, text: &str) -> Vec<(String, usize, usize)> {
        if text.is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let step = self.chunk_size.saturating_sub(self.chunk_overlap).max(1);

        let mut chunks = Vec::new();
        let mut start = 0;
        while start < total {
            let end = (start + self.chunk_size).min(total);
            let content: String = chars[start..end].iter().collect();
            chunks.push((content, start, end));
            if end >= total {
                break;
            }
            start += step;
        }
        chunks
    }
}
