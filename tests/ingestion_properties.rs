//! Cross-module properties of the ingestion and retrieval path

use chrono::{Duration, TimeZone, Utc};
use hindsight::{chunk_segments, PageBoundary, TemporalParser, TextChunker, TranscriptSegment};

#[test]
fn chunks_reconstruct_from_source_offsets() {
    let chunker = TextChunker::new(30, 5);
    let text = "Hindsight keeps everything you capture. Notes, articles, papers and \
                voice memos all land in one place.\n\nEach document is cut into \
                passages that remember exactly where they came from. A passage from \
                a PDF knows its pages; one from a recording knows its timestamps.\n\n\
                Ask a question and the engine searches both by meaning and by words, \
                then cites the passages it used.";

    let pieces = chunker.chunk(text, None);
    assert!(pieces.len() > 2);

    for (i, piece) in pieces.iter().enumerate() {
        assert_eq!(piece.chunk_index, i);
        assert_eq!(
            piece.text,
            &text[piece.char_start..piece.char_end],
            "chunk {} must be an exact substring",
            i
        );
    }
}

#[test]
fn pdf_chunk_spanning_pages_carries_both_anchors() {
    // Three pages of text, boundaries contiguous over the concatenation.
    let page_texts = ["alpha ".repeat(20), "bravo ".repeat(20), "charlie ".repeat(20)];
    let mut text = String::new();
    let mut boundaries = Vec::new();
    for (i, page) in page_texts.iter().enumerate() {
        let start = text.len();
        text.push_str(page);
        boundaries.push(PageBoundary {
            page: (i + 1) as i32,
            char_start: start,
            char_end: text.len(),
        });
    }

    // Chunks sized so that at least one straddles the page 2/3 boundary.
    let chunker = TextChunker::new(45, 0);
    let pieces = chunker.chunk(&text, Some(&boundaries));

    for piece in &pieces {
        assert!(piece.page_start.is_some());
        assert!(piece.page_end.is_some());
        assert!(piece.page_start <= piece.page_end);
    }

    let straddler = pieces
        .iter()
        .find(|p| p.page_start != p.page_end)
        .expect("some chunk should cross a page boundary");
    assert!(straddler.page_start < straddler.page_end);
}

#[test]
fn audio_chunks_cover_transcript_without_overlap() {
    let segments: Vec<TranscriptSegment> = (0..5)
        .map(|i| TranscriptSegment {
            text: format!("segment number {}", i),
            start_ms: i * 15_000,
            end_ms: (i + 1) * 15_000,
        })
        .collect();

    // 0-75s at a 60s target: one full chunk plus the residual tail.
    let pieces = chunk_segments(&segments, 60_000);
    assert_eq!(pieces.len(), 2);

    let first_end = pieces[0].time_end_ms.unwrap();
    let second_start = pieces[1].time_start_ms.unwrap();
    assert!(first_end >= 60_000);
    assert!(first_end < 75_000);
    assert_eq!(pieces[1].time_end_ms, Some(75_000));
    assert!(second_start >= first_end);

    for piece in &pieces {
        assert!(piece.time_start_ms.unwrap() <= piece.time_end_ms.unwrap());
    }
}

#[test]
fn temporal_phrase_routes_a_seven_day_window() {
    let parser = TemporalParser::new();
    let now = Utc.with_ymd_and_hms(2024, 6, 12, 12, 0, 0).unwrap();

    let (residual, interval) = parser.parse("notes from last week", now);
    let (start, end) = interval.expect("phrase should resolve");

    assert_eq!(residual.trim(), "notes from");
    assert_eq!(end - start, Duration::days(7));

    // A document created yesterday is inside the window; one created ten
    // days ago is not.
    let yesterday = now - Duration::days(1);
    let ten_days_ago = now - Duration::days(10);
    assert!(yesterday >= start && yesterday < end);
    assert!(ten_days_ago < start);
}

#[test]
fn temporal_parse_leaves_plain_queries_alone() {
    let parser = TemporalParser::new();
    let now = Utc::now();

    for query in [
        "powerhouse of the cell",
        "what does the contract say about renewal",
        "the weekday schedule",
    ] {
        let (residual, interval) = parser.parse(query, now);
        assert_eq!(residual, query);
        assert!(interval.is_none(), "query {:?} must not match", query);
    }
}
