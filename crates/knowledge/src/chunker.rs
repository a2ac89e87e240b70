//! Paragraph-aware text chunking for index ingestion.

use crate::types::{Document, SOURCE_KEY};

/// Default maximum chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Split text into chunks of at most `chunk_size` bytes.
///
/// Paragraphs (separated by blank lines) are packed together while they fit.
/// A paragraph longer than `chunk_size` is cut at the nearest character
/// boundary below the limit.
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        let needed = if current.is_empty() {
            paragraph.len()
        } else {
            current.len() + 2 + paragraph.len()
        };

        if needed <= chunk_size {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        if paragraph.len() <= chunk_size {
            current.push_str(paragraph);
        } else {
            chunks.extend(split_long(paragraph, chunk_size));
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    tracing::debug!("Chunked text into {} chunks (size: {})", chunks.len(), chunk_size);
    chunks
}

fn split_long(text: &str, chunk_size: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + chunk_size).min(text.len());
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        // A single character wider than the limit.
        if end == start {
            end = start + 1;
            while end < text.len() && !text.is_char_boundary(end) {
                end += 1;
            }
        }

        let piece = text[start..end].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        start = end;
    }

    pieces
}

/// Chunk a text and wrap each chunk in a [`Document`] tagged with its
/// source, position and ingestion time.
pub fn documents_from_text(source: &str, text: &str, chunk_size: usize) -> Vec<Document> {
    let ingested_at = chrono::Utc::now().to_rfc3339();

    chunk_text(text, chunk_size)
        .into_iter()
        .enumerate()
        .map(|(position, chunk)| {
            Document::new(chunk)
                .with_metadata(SOURCE_KEY, source)
                .with_metadata("position", position as u64)
                .with_metadata("ingestedAt", ingested_at.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraphs_are_packed() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = chunk_text(text, 40);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "First paragraph.\n\nSecond paragraph.");
        assert_eq!(chunks[1], "Third paragraph.");
    }

    #[test]
    fn test_long_paragraph_is_split() {
        let text = "a".repeat(250);
        let chunks = chunk_text(&text, 100);

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() <= 100));
    }

    #[test]
    fn test_multibyte_boundaries() {
        let text = "é".repeat(51);
        let chunks = chunk_text(&text, 11);

        assert!(chunks.iter().all(|c| c.len() <= 11));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", 100).is_empty());
        assert!(chunk_text("\n\n  \n\n", 100).is_empty());
    }

    #[test]
    fn test_documents_from_text() {
        let docs = documents_from_text("faq.md", "One.\n\nTwo.", 4);

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].source().as_deref(), Some("faq.md"));
        assert_eq!(docs[1].metadata["position"], 1);
        assert!(docs[0].metadata.contains_key("ingestedAt"));
        assert_ne!(docs[0].id, docs[1].id);
    }
}
