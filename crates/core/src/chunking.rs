use crate::error::IngestError;
use crate::models::SourceDocument;

/// Chunk sizing, counted in characters.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, IngestError> {
        if chunk_overlap >= chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk_overlap {chunk_overlap} must be smaller than chunk_size {chunk_size}"
            )));
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 150,
            chunk_overlap: 70,
        }
    }
}

/// A chunk of source text awaiting embedding, still tied to its document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub source_id: String,
    pub text: String,
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Splits `text` into windows of at most `chunk_size` characters where each
/// window starts exactly `chunk_overlap` characters before the previous one
/// ends. Window ends prefer a blank line, then a line break or sentence end,
/// then a word boundary, before falling back to a hard cut. A source shorter
/// than one chunk comes back as a single chunk.
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    if chars.len() <= config.chunk_size {
        return vec![text.to_string()];
    }

    // The earliest permissible window end: far enough past the overlap that
    // the next window always advances, and never in the first half of the
    // window, so breakpoint snapping cannot degenerate into slivers.
    let floor_offset = (config.chunk_overlap + 1).max(config.chunk_size / 2);

    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let hard_end = (start + config.chunk_size).min(chars.len());
        let end = if hard_end == chars.len() {
            hard_end
        } else {
            pick_breakpoint(&chars, start + floor_offset, hard_end)
        };

        chunks.push(chars[start..end].iter().collect());

        if end == chars.len() {
            break;
        }
        start = end - config.chunk_overlap;
    }

    chunks
}

fn pick_breakpoint(chars: &[char], floor: usize, hard_end: usize) -> usize {
    for end in (floor..=hard_end).rev() {
        if end >= 2 && chars[end - 1] == '\n' && chars[end - 2] == '\n' {
            return end;
        }
    }

    for end in (floor..=hard_end).rev() {
        let line_break = chars[end - 1] == '\n';
        let sentence_end = end >= 2
            && matches!(chars[end - 2], '.' | '!' | '?')
            && chars[end - 1].is_whitespace();
        if line_break || sentence_end {
            return end;
        }
    }

    for end in (floor..=hard_end).rev() {
        if chars[end - 1].is_whitespace() {
            return end;
        }
    }

    hard_end
}

pub fn chunk_document(document: &SourceDocument, config: &ChunkingConfig) -> Vec<TextChunk> {
    split_text(&document.content, config)
        .into_iter()
        .map(|text| TextChunk {
            source_id: document.source_id.clone(),
            text,
        })
        .collect()
}

pub fn chunk_documents(documents: &[SourceDocument], config: &ChunkingConfig) -> Vec<TextChunk> {
    documents
        .iter()
        .flat_map(|document| chunk_document(document, config))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn char_len(text: &str) -> usize {
        text.chars().count()
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        assert!(ChunkingConfig::new(100, 100).is_err());
        assert!(ChunkingConfig::new(100, 150).is_err());
        assert!(ChunkingConfig::new(100, 99).is_ok());
        assert!(ChunkingConfig::new(1, 0).is_ok());
    }

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof   spacing";
        assert_eq!(normalize_whitespace(input), "A lot of spacing");
    }

    #[test]
    fn short_source_is_a_single_chunk() {
        let config = ChunkingConfig::new(150, 70).unwrap();
        let chunks = split_text("AVAS sound starts when moving in R starts", &config);
        assert_eq!(chunks, vec!["AVAS sound starts when moving in R starts"]);
    }

    #[test]
    fn empty_source_yields_no_chunks() {
        let config = ChunkingConfig::new(150, 70).unwrap();
        assert!(split_text("", &config).is_empty());
    }

    #[test]
    fn chunks_respect_size_and_share_exact_overlap() {
        let config = ChunkingConfig::new(40, 12).unwrap();
        let text = "The audible warning shall operate continuously while the vehicle \
                    is reversing. The sound level shall not exceed the limits laid down \
                    in the annex. The driver shall not be able to disable the warning.";

        let chunks = split_text(text, &config);
        assert!(chunks.len() > 1);

        for chunk in &chunks {
            assert!(char_len(chunk) <= 40, "oversized chunk: {chunk:?}");
        }

        for pair in chunks.windows(2) {
            let left: Vec<char> = pair[0].chars().collect();
            let right: Vec<char> = pair[1].chars().collect();
            let tail: String = left[left.len() - 12..].iter().collect();
            let head: String = right[..12].iter().collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn reassembly_recovers_the_source() {
        let config = ChunkingConfig::new(25, 10).unwrap();
        let text = "one two three four five six seven eight nine ten eleven twelve";

        let chunks = split_text(text, &config);
        let mut rebuilt: Vec<char> = Vec::new();
        for (position, chunk) in chunks.iter().enumerate() {
            let chars: Vec<char> = chunk.chars().collect();
            let skip = if position == 0 { 0 } else { 10 };
            rebuilt.extend_from_slice(&chars[skip..]);
        }

        assert_eq!(rebuilt.into_iter().collect::<String>(), text);
    }

    #[test]
    fn window_ends_prefer_word_boundaries() {
        let config = ChunkingConfig::new(30, 5).unwrap();
        let text = "regulation paragraph sound level limits apply during reversing maneuvers";

        let chunks = split_text(text, &config);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(
                chunk.ends_with(' '),
                "expected a word-boundary cut, got {chunk:?}"
            );
        }
    }

    #[test]
    fn blank_lines_win_over_word_boundaries() {
        let config = ChunkingConfig::new(40, 8).unwrap();
        let text = "first paragraph of the rule text\n\nsecond paragraph follows with more words here";

        let chunks = split_text(text, &config);
        assert!(chunks[0].ends_with("\n\n"));
    }

    #[test]
    fn multibyte_text_chunks_cleanly() {
        let config = ChunkingConfig::new(10, 3).unwrap();
        let text = "звуковой сигнал заднего хода включается автоматически";

        let chunks = split_text(text, &config);
        for chunk in &chunks {
            assert!(char_len(chunk) <= 10);
        }
    }

    #[test]
    fn chunk_documents_keeps_source_ids() {
        let config = ChunkingConfig::new(150, 70).unwrap();
        let documents = vec![
            SourceDocument {
                content: "reversing warning".to_string(),
                source_id: "r151.txt".to_string(),
            },
            SourceDocument {
                content: "wiper sweep".to_string(),
                source_id: "r78.txt".to_string(),
            },
        ];

        let chunks = chunk_documents(&documents, &config);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].source_id, "r151.txt");
        assert_eq!(chunks[1].source_id, "r78.txt");
    }
}
