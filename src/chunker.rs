//! Splitting extracted text into retrievable chunks
//!
//! Two strategies, both pure and deterministic: recursive boundary
//! splitting for text, and duration-based aggregation for timed audio
//! segments. Offsets always refer to byte positions in the canonical
//! input text, so `piece.text == &text[char_start..char_end]` holds for
//! every textual chunk.

use std::collections::VecDeque;

use crate::extract::{PageBoundary, TranscriptSegment};
use crate::tokenizer;

/// Separators tried in priority order; the empty string is a hard split.
const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// One chunk cut from a document, before persistence
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPiece {
    pub text: String,
    pub chunk_index: usize,
    pub char_start: usize,
    pub char_end: usize,
    pub token_count: usize,
    pub page_start: Option<i32>,
    pub page_end: Option<i32>,
    pub time_start_ms: Option<i64>,
    pub time_end_ms: Option<i64>,
}

/// Recursive character splitter with overlap.
///
/// Sizes are given in tokens; the character target is 4x, matching the
/// rough chars-per-token ratio of the embedding vocabulary.
#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_chars: usize,
    overlap_chars: usize,
}

impl TextChunker {
    pub fn new(chunk_size_tokens: usize, overlap_tokens: usize) -> Self {
        Self {
            chunk_chars: chunk_size_tokens * 4,
            overlap_chars: overlap_tokens * 4,
        }
    }

    /// Split `text` into chunks with positional anchors.
    ///
    /// When `page_boundaries` are supplied, each chunk's `page_start` is the
    /// page whose span contains `char_start` and `page_end` the page
    /// containing the last byte of the chunk.
    pub fn chunk(&self, text: &str, page_boundaries: Option<&[PageBoundary]>) -> Vec<ChunkPiece> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let splits = self.split_text(text, &SEPARATORS);

        let mut pieces = Vec::new();
        let mut search_pos = 0usize;

        for split in splits {
            // Locate the split in the original text so offsets are exact.
            let char_start = match text[search_pos..].find(&split) {
                Some(rel) => search_pos + rel,
                None => search_pos,
            };
            let char_end = char_start + split.len();
            search_pos = next_char_boundary(text, char_start);

            let (page_start, page_end) = match page_boundaries {
                Some(bounds) => locate_pages(bounds, char_start, char_end),
                None => (None, None),
            };

            let token_count = tokenizer::count_tokens(&split);
            pieces.push(ChunkPiece {
                text: split,
                chunk_index: pieces.len(),
                char_start,
                char_end,
                token_count,
                page_start,
                page_end,
                time_start_ms: None,
                time_end_ms: None,
            });
        }

        pieces
    }

    fn split_text(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // Pick the first separator that occurs in the text; "" always does.
        let mut separator = "";
        let mut remaining: &[&str] = &[];
        for (i, sep) in separators.iter().copied().enumerate() {
            if sep.is_empty() || text.contains(sep) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let splits: Vec<String> = if separator.is_empty() {
            text.chars().map(|c| c.to_string()).collect()
        } else {
            text.split(separator).map(|s| s.to_string()).collect()
        };

        let mut final_chunks = Vec::new();
        let mut good: Vec<String> = Vec::new();

        for split in splits {
            if split.len() < self.chunk_chars {
                good.push(split);
            } else {
                if !good.is_empty() {
                    final_chunks.extend(self.merge_splits(std::mem::take(&mut good), separator));
                }
                if remaining.is_empty() {
                    final_chunks.push(split);
                } else {
                    final_chunks.extend(self.split_text(&split, remaining));
                }
            }
        }

        if !good.is_empty() {
            final_chunks.extend(self.merge_splits(good, separator));
        }

        final_chunks
    }

    /// Greedily pack splits into chunks up to the char target, carrying a
    /// tail of at most `overlap_chars` into the next chunk.
    fn merge_splits(&self, splits: Vec<String>, separator: &str) -> Vec<String> {
        let sep_len = separator.len();
        let mut docs = Vec::new();
        let mut current: VecDeque<String> = VecDeque::new();
        let mut total = 0usize;

        for split in splits {
            let len = split.len();
            let sep_cost = if current.is_empty() { 0 } else { sep_len };

            if total + len + sep_cost > self.chunk_chars && !current.is_empty() {
                if let Some(doc) = join_splits(&current, separator) {
                    docs.push(doc);
                }
                while total > self.overlap_chars
                    || (total + len + if current.is_empty() { 0 } else { sep_len }
                        > self.chunk_chars
                        && total > 0)
                {
                    let head = current.pop_front().expect("total > 0 implies splits remain");
                    total -= head.len() + if current.is_empty() { 0 } else { sep_len };
                }
            }

            total += len + if current.is_empty() { 0 } else { sep_len };
            current.push_back(split);
        }

        if let Some(doc) = join_splits(&current, separator) {
            docs.push(doc);
        }

        docs
    }
}

fn join_splits(parts: &VecDeque<String>, separator: &str) -> Option<String> {
    let joined = parts
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn next_char_boundary(text: &str, pos: usize) -> usize {
    match text[pos..].chars().next() {
        Some(c) => pos + c.len_utf8(),
        None => pos,
    }
}

fn locate_pages(
    bounds: &[PageBoundary],
    char_start: usize,
    char_end: usize,
) -> (Option<i32>, Option<i32>) {
    let mut page_start = None;
    let mut page_end = None;
    let last = char_end.saturating_sub(1);

    for b in bounds {
        if b.char_start <= char_start && char_start < b.char_end {
            page_start = Some(b.page);
        }
        if b.char_start <= last && last < b.char_end {
            page_end = Some(b.page);
        }
    }

    if page_start.is_some() && page_end.is_none() {
        page_end = page_start;
    }
    (page_start, page_end)
}

/// Aggregate transcript segments into chunks of roughly `target_duration_ms`.
///
/// Consecutive segments accumulate until the covered span reaches the
/// target, then a chunk is emitted; the final residual segments form the
/// last chunk regardless of duration. Char offsets are synthetic (cumulative
/// over the concatenated transcript) but monotone.
pub fn chunk_segments(segments: &[TranscriptSegment], target_duration_ms: i64) -> Vec<ChunkPiece> {
    if segments.is_empty() {
        return Vec::new();
    }

    let mut pieces = Vec::new();
    let mut current_texts: Vec<&str> = Vec::new();
    let mut current_start_ms: Option<i64> = None;
    let mut current_end_ms = 0i64;
    let mut char_offset = 0usize;

    let emit = |texts: &mut Vec<&str>,
                    start_ms: i64,
                    end_ms: i64,
                    char_offset: &mut usize,
                    pieces: &mut Vec<ChunkPiece>| {
        let text = texts.join(" ");
        let token_count = tokenizer::count_tokens(&text);
        let char_start = *char_offset;
        let char_end = char_start + text.len();
        *char_offset = char_end + 1;
        pieces.push(ChunkPiece {
            text,
            chunk_index: pieces.len(),
            char_start,
            char_end,
            token_count,
            page_start: None,
            page_end: None,
            time_start_ms: Some(start_ms),
            time_end_ms: Some(end_ms),
        });
        texts.clear();
    };

    for segment in segments {
        let seg_text = segment.text.trim();
        if seg_text.is_empty() {
            continue;
        }

        if current_start_ms.is_none() {
            current_start_ms = Some(segment.start_ms);
        }
        current_texts.push(seg_text);
        current_end_ms = segment.end_ms;

        let duration = current_end_ms - current_start_ms.unwrap_or(0);
        if duration >= target_duration_ms {
            emit(
                &mut current_texts,
                current_start_ms.take().unwrap_or(0),
                current_end_ms,
                &mut char_offset,
                &mut pieces,
            );
        }
    }

    if !current_texts.is_empty() {
        emit(
            &mut current_texts,
            current_start_ms.unwrap_or(0),
            current_end_ms,
            &mut char_offset,
            &mut pieces,
        );
    }

    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(text: &str, start_ms: i64, end_ms: i64) -> TranscriptSegment {
        TranscriptSegment {
            text: text.to_string(),
            start_ms,
            end_ms,
        }
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunker = TextChunker::new(500, 50);
        let text = "This is a short note.";
        let pieces = chunker.chunk(text, None);

        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].text, text);
        assert_eq!(pieces[0].char_start, 0);
        assert_eq!(pieces[0].char_end, text.len());
        assert_eq!(pieces[0].chunk_index, 0);
    }

    #[test]
    fn test_empty_text_zero_chunks() {
        let chunker = TextChunker::new(500, 50);
        assert!(chunker.chunk("", None).is_empty());
        assert!(chunker.chunk("   \n\n  ", None).is_empty());
    }

    #[test]
    fn test_chunks_are_exact_substrings() {
        let chunker = TextChunker::new(20, 4);
        let text = "First paragraph talks about storage engines.\n\n\
                    Second paragraph covers vector indexes in some depth. \
                    It keeps going with more detail about recall and latency.\n\n\
                    Third paragraph wraps up.";
        let pieces = chunker.chunk(text, None);

        assert!(pieces.len() > 1);
        for (i, p) in pieces.iter().enumerate() {
            assert_eq!(p.chunk_index, i);
            assert_eq!(p.text, &text[p.char_start..p.char_end]);
            assert!(p.char_start < p.char_end);
            assert!(p.token_count > 0);
        }
    }

    #[test]
    fn test_paragraph_boundary_preferred() {
        let chunker = TextChunker::new(15, 0);
        let text = "Alpha paragraph here with several words.\n\nBeta paragraph also has words.";
        let pieces = chunker.chunk(text, None);

        // The double-newline boundary is the split point, so no chunk
        // straddles the paragraph break.
        for p in &pieces {
            assert!(!p.text.contains("\n\n"));
        }
    }

    #[test]
    fn test_offsets_are_monotone() {
        let chunker = TextChunker::new(12, 3);
        let text = "one two three four five six seven eight nine ten eleven twelve \
                    thirteen fourteen fifteen sixteen seventeen eighteen nineteen twenty";
        let pieces = chunker.chunk(text, None);

        assert!(pieces.len() > 1);
        for w in pieces.windows(2) {
            assert!(w[1].char_start > w[0].char_start);
        }
    }

    #[test]
    fn test_hard_split_on_unbroken_text() {
        let chunker = TextChunker::new(10, 0);
        let text = "a".repeat(200);
        let pieces = chunker.chunk(&text, None);

        assert!(pieces.len() > 1);
        for p in &pieces {
            assert!(p.text.len() <= 40);
            assert_eq!(p.text, &text[p.char_start..p.char_end]);
        }
    }

    #[test]
    fn test_page_assignment() {
        let chunker = TextChunker::new(500, 50);
        // Three "pages" of 30 chars each, contiguous half-open spans.
        let bounds = vec![
            PageBoundary { page: 1, char_start: 0, char_end: 30 },
            PageBoundary { page: 2, char_start: 30, char_end: 60 },
            PageBoundary { page: 3, char_start: 60, char_end: 90 },
        ];

        let (start, end) = locate_pages(&bounds, 5, 25);
        assert_eq!((start, end), (Some(1), Some(1)));

        // A span starting on page 2 and ending on page 3.
        let (start, end) = locate_pages(&bounds, 35, 70);
        assert_eq!((start, end), (Some(2), Some(3)));

        // char_end exactly on a boundary belongs to the earlier page.
        let (start, end) = locate_pages(&bounds, 35, 60);
        assert_eq!((start, end), (Some(2), Some(2)));
    }

    #[test]
    fn test_audio_chunking_target_duration() {
        // 0-75s in 15s segments, 60s target: exactly two chunks.
        let segments = vec![
            seg("first part", 0, 15_000),
            seg("second part", 15_000, 30_000),
            seg("third part", 30_000, 45_000),
            seg("fourth part", 45_000, 60_000),
            seg("the tail", 60_000, 75_000),
        ];
        let pieces = chunk_segments(&segments, 60_000);

        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].time_start_ms, Some(0));
        assert_eq!(pieces[0].time_end_ms, Some(60_000));
        assert_eq!(pieces[1].time_start_ms, Some(60_000));
        assert_eq!(pieces[1].time_end_ms, Some(75_000));
        assert_eq!(
            pieces[0].text,
            "first part second part third part fourth part"
        );
        assert_eq!(pieces[1].text, "the tail");
        // Synthetic offsets stay monotone.
        assert!(pieces[1].char_start > pieces[0].char_end);
    }

    #[test]
    fn test_audio_residual_tail_emitted() {
        let segments = vec![seg("only a short clip", 0, 9_000)];
        let pieces = chunk_segments(&segments, 60_000);

        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].time_start_ms, Some(0));
        assert_eq!(pieces[0].time_end_ms, Some(9_000));
    }

    #[test]
    fn test_audio_empty_segments_skipped() {
        let segments = vec![
            seg("  ", 0, 1_000),
            seg("spoken words", 1_000, 2_000),
        ];
        let pieces = chunk_segments(&segments, 60_000);

        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].text, "spoken words");
        assert_eq!(pieces[0].time_start_ms, Some(1_000));
    }

    #[test]
    fn test_audio_no_segments() {
        assert!(chunk_segments(&[], 60_000).is_empty());
    }
}
