//! Boundary-aware text chunker with overlap.
//!
//! Splits a document's text into [`Chunk`]s of at most `max_chars` bytes.
//! Boundaries prefer, in order: paragraph breaks (`\n\n`), line breaks,
//! sentence ends (`. `, `! `, `? `), and finally whitespace. Consecutive
//! chunks share up to `overlap_chars` bytes of trailing context so that a
//! fact straddling a boundary is still retrievable from one chunk.
//!
//! # Algorithm
//!
//! 1. Recursively split the text on the separator list until every piece
//!    fits in `max_chars`. Pieces that still do not fit after the last
//!    separator are hard-split at the nearest space (or char boundary).
//! 2. Merge pieces left to right into a sliding window. When the next piece
//!    would overflow the window, flush the window as a chunk and drop pieces
//!    from its front until at most `overlap_chars` remain.
//! 3. Trim each chunk; blank chunks are discarded.
//!
//! The output is a pure function of the input: same document, same limits,
//! same chunks (ids included).
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use ragdesk_core::chunk::chunk_text;
//! use ragdesk_core::models::Document;
//!
//! let doc = Document {
//!     id: 7,
//!     topic: "cinema-x".to_string(),
//!     title: "hours".to_string(),
//!     text: "We are open 10:00-22:00.\n\nParking is free.".to_string(),
//!     created_at: Utc::now(),
//! };
//! let chunks = chunk_text(&doc, 1000, 100);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].topic, "cinema-x");
//! ```

use std::collections::VecDeque;

use sha2::{Digest, Sha256};

use crate::models::{Chunk, Document};

/// Split separators, strongest boundary first.
const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", "! ", "? "];

/// Split a document into overlapping chunks of at most `max_chars` bytes.
///
/// Chunk indices are contiguous from 0. A document whose text is blank
/// produces no chunks.
pub fn chunk_text(document: &Document, max_chars: usize, overlap_chars: usize) -> Vec<Chunk> {
    let max_chars = max_chars.max(1);
    let overlap_chars = overlap_chars.min(max_chars - 1);

    let mut pieces = Vec::new();
    split_pieces(&document.text, max_chars, 0, &mut pieces);

    let mut texts: Vec<String> = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut window_len = 0usize;

    for piece in pieces {
        if window_len + piece.len() > max_chars && !window.is_empty() {
            flush_window(&window, &mut texts);
            while let Some(front) = window.front() {
                if window_len <= overlap_chars && window_len + piece.len() <= max_chars {
                    break;
                }
                window_len -= front.len();
                window.pop_front();
            }
        }
        window.push_back(piece);
        window_len += piece.len();
    }
    if !window.is_empty() {
        flush_window(&window, &mut texts);
    }

    texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| make_chunk(document, i as i64, text))
        .collect()
}

fn split_pieces<'a>(text: &'a str, max_chars: usize, level: usize, out: &mut Vec<&'a str>) {
    if text.len() <= max_chars {
        out.push(text);
        return;
    }
    match SEPARATORS.get(level) {
        Some(sep) => {
            for part in text.split_inclusive(sep) {
                split_pieces(part, max_chars, level + 1, out);
            }
        }
        None => hard_split(text, max_chars, out),
    }
}

/// Last resort: cut at the last space before `max_chars`, or at the char
/// boundary itself when there is no space.
fn hard_split<'a>(text: &'a str, max_chars: usize, out: &mut Vec<&'a str>) {
    let mut remaining = text;
    while !remaining.is_empty() {
        if remaining.len() <= max_chars {
            out.push(remaining);
            break;
        }
        let limit = snap_to_char_boundary(remaining, max_chars);
        let split_at = match remaining[..limit].rfind(' ') {
            Some(pos) if pos > 0 => pos + 1,
            _ => limit,
        };
        let split_at = if split_at == 0 {
            remaining
                .chars()
                .next()
                .map(char::len_utf8)
                .unwrap_or(remaining.len())
        } else {
            split_at
        };
        out.push(&remaining[..split_at]);
        remaining = &remaining[split_at..];
    }
}

fn flush_window(window: &VecDeque<&str>, texts: &mut Vec<String>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        return;
    }
    if texts.last().map(String::as_str) != Some(trimmed) {
        texts.push(trimmed.to_string());
    }
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn make_chunk(document: &Document, index: i64, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: format!("{}:{}", document.id, index),
        document_id: document.id,
        topic: document.topic.clone(),
        title: document.title.clone(),
        chunk_index: index,
        text,
        hash,
    }
}
