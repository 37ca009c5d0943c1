//! Recursive character text splitting.
//!
//! Text is cut on the coarsest separator present (paragraphs, lines,
//! Chinese and Latin sentence ends, spaces, single characters). Pieces that
//! are still too long are cut again with the finer separators. Pieces are
//! then merged greedily up to `chunk_size` characters, carrying at most
//! `chunk_overlap` characters of the previous chunk into the next one.
//!
//! Separators stay attached to the start of the piece that follows them,
//! so every chunk is a contiguous slice of the input.

use bincode::{Decode, Encode};
use std::collections::{BTreeMap, VecDeque};

/// Separators from coarse to fine. The empty string splits into characters.
pub const DEFAULT_SEPARATORS: [&str; 8] = ["\n\n", "\n", "。", "！", "？", ".", " ", ""];

/// Metadata key: position of the chunk in its document.
pub const META_CHUNK_INDEX: &str = "chunk_index";
/// Metadata key: character offset of the chunk in the split text.
pub const META_START_CHAR: &str = "start_char";
/// Metadata key: source document name.
pub const META_SOURCE: &str = "source";

/// A bounded slice of document text with metadata.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct DocumentChunk {
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

impl DocumentChunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    /// Whether the chunk has any non-whitespace content.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Byte range of a piece of the source text and its length in characters.
#[derive(Debug, Clone, Copy)]
struct Piece {
    start: usize,
    end: usize,
    chars: usize,
}

impl Piece {
    fn new(source: &str, start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            chars: source[start..end].chars().count(),
        }
    }
}

/// Splits text into overlapping chunks.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(500, 50)
    }
}

impl TextSplitter {
    /// Create a splitter.
    ///
    /// `chunk_size` is raised to at least 1 and `chunk_overlap` is clamped
    /// below `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into trimmed, non-empty chunk strings.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_spans(text)
            .into_iter()
            .map(|(start, end)| text[start..end].to_string())
            .collect()
    }

    /// Split `text` into chunks carrying index and offset metadata.
    pub fn create_chunks(&self, text: &str) -> Vec<DocumentChunk> {
        let mut offsets = CharOffsets::new(text);

        self.split_spans(text)
            .into_iter()
            .enumerate()
            .map(|(index, (start, end))| {
                DocumentChunk::new(&text[start..end])
                    .with_metadata(META_CHUNK_INDEX, index)
                    .with_metadata(META_START_CHAR, offsets.char_offset(start))
            })
            .collect()
    }

    /// Byte spans of the trimmed, non-empty chunks.
    fn split_spans(&self, text: &str) -> Vec<(usize, usize)> {
        if text.is_empty() {
            return Vec::new();
        }

        self.split_recursive(text, 0, text.len(), &DEFAULT_SEPARATORS)
            .into_iter()
            .filter_map(|(start, end)| trim_span(text, start, end))
            .collect()
    }

    fn split_recursive(
        &self,
        source: &str,
        start: usize,
        end: usize,
        separators: &[&str],
    ) -> Vec<(usize, usize)> {
        let segment = &source[start..end];

        // Coarsest separator present; the character split is the last resort.
        let position = separators
            .iter()
            .position(|s| s.is_empty() || segment.contains(s))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).copied().unwrap_or("");
        let finer = separators.get(position + 1..).unwrap_or(&[]);

        let mut spans = Vec::new();
        let mut fitting = Vec::new();

        for piece in split_keeping_separator(source, start, end, separator) {
            if piece.chars < self.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                spans.extend(self.merge(&fitting));
                fitting.clear();
            }

            if finer.is_empty() {
                spans.push((piece.start, piece.end));
            } else {
                spans.extend(self.split_recursive(source, piece.start, piece.end, finer));
            }
        }

        if !fitting.is_empty() {
            spans.extend(self.merge(&fitting));
        }

        spans
    }

    /// Greedily merge contiguous pieces into chunks with overlap.
    fn merge(&self, pieces: &[Piece]) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        let mut window: VecDeque<Piece> = VecDeque::new();
        let mut total = 0;

        for &piece in pieces {
            if total + piece.chars > self.chunk_size {
                if let (Some(first), Some(last)) = (window.front(), window.back()) {
                    spans.push((first.start, last.end));
                }

                while total > self.chunk_overlap
                    || (total > 0 && total + piece.chars > self.chunk_size)
                {
                    match window.pop_front() {
                        Some(dropped) => total -= dropped.chars,
                        None => break,
                    }
                }
            }

            window.push_back(piece);
            total += piece.chars;
        }

        if let (Some(first), Some(last)) = (window.front(), window.back()) {
            spans.push((first.start, last.end));
        }

        spans
    }
}

/// Split `source[start..end]` on `separator`, keeping each separator at the
/// start of the following piece. Empty pieces are dropped.
fn split_keeping_separator(source: &str, start: usize, end: usize, separator: &str) -> Vec<Piece> {
    let segment = &source[start..end];

    if separator.is_empty() {
        return segment
            .char_indices()
            .map(|(i, c)| Piece {
                start: start + i,
                end: start + i + c.len_utf8(),
                chars: 1,
            })
            .collect();
    }

    let mut pieces = Vec::new();
    let mut piece_start = 0;

    for (i, _) in segment.match_indices(separator) {
        if i > piece_start {
            pieces.push(Piece::new(source, start + piece_start, start + i));
        }
        piece_start = i;
    }
    if piece_start < segment.len() {
        pieces.push(Piece::new(source, start + piece_start, end));
    }

    pieces
}

/// Shrink a byte span to exclude surrounding whitespace; `None` if nothing is left.
fn trim_span(source: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let slice = &source[start..end];
    let trimmed_start = slice.trim_start();
    if trimmed_start.is_empty() {
        return None;
    }
    let new_start = start + (slice.len() - trimmed_start.len());
    let new_end = new_start + trimmed_start.trim_end().len();
    Some((new_start, new_end))
}

/// Converts byte offsets into character offsets, cheaply for ascending input.
struct CharOffsets<'a> {
    source: &'a str,
    byte: usize,
    chars: usize,
}

impl<'a> CharOffsets<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            byte: 0,
            chars: 0,
        }
    }

    fn char_offset(&mut self, byte: usize) -> usize {
        if byte < self.byte {
            self.byte = 0;
            self.chars = 0;
        }
        self.chars += self.source[self.byte..byte].chars().count();
        self.byte = byte;
        self.chars
    }
}
