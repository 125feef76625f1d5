//! Centralized normalization + segmentation adapter.
//!
//! Contract:
//! - Input: &str raw input (may be received from IME, paste, etc.)
//! - Output: (normalized NFC String, Vec<Segment>) where each segment is a grapheme cluster
//!   with absolute byte offsets into the normalized string and a display width (terminal cells).
//! - Guarantees: Clusters are in order, non-overlapping, cover the entire string when concatenated.
//! - Safety: Does not log content; callers should avoid logging raw text to adhere to logging policy.

use crate::egc_width;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub cluster: String,
    pub start: usize, // byte offset in normalized string (inclusive)
    pub end: usize,   // byte offset in normalized string (exclusive)
    pub width: u16,   // terminal cell width (post width overrides)
}

/// Normalize to NFC and segment into grapheme clusters with widths and byte ranges.
pub fn normalize_and_segment(input: &str) -> (String, Vec<Segment>) {
    let normalized: String = input.nfc().collect();
    let mut out = Vec::new();
    let mut byte = 0usize;
    for g in normalized.graphemes(true) {
        let len = g.len();
        let seg = Segment {
            cluster: g.to_string(),
            start: byte,
            end: byte + len,
            width: egc_width(g),
        };
        out.push(seg);
        byte += len;
    }
    (normalized, out)
}

// -------- Tree-backed grapheme-cluster and wrapped-line segmenters ------------

use crate::rune::RuneIter;
use crate::tree::{Direction, Tree};

/// A grapheme cluster read out of a [`Tree`], with its absolute character span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub text: String,
    pub start_char: u64,
    pub end_char: u64,
}

/// Streaming grapheme-cluster iterator over a tree, per UAX #29.
///
/// Clusters are found by growing a buffer of runes one at a time until the
/// buffer contains at least two clusters (or the underlying rune stream is
/// exhausted), then emitting the settled one. This holds for the bounded
/// adjacent-pair rules (combining marks, CRxLF, Hangul) as well as the
/// locally-scoped sequences (ZWJ chains, regional-indicator pairs), since
/// each emission starts the next buffer at a confirmed cluster boundary.
pub struct GraphemeIter<'t> {
    runes: RuneIter<'t>,
    direction: Direction,
    buf: String,
    buf_chars: u64,
    exhausted: bool,
    pos: u64,
}

impl<'t> GraphemeIter<'t> {
    pub fn forward_at(tree: &'t Tree, start_char: u64) -> Self {
        GraphemeIter {
            runes: RuneIter::forward_at(tree, start_char),
            direction: Direction::Forward,
            buf: String::new(),
            buf_chars: 0,
            exhausted: false,
            pos: start_char,
        }
    }

    pub fn backward_at(tree: &'t Tree, start_char: u64) -> Self {
        GraphemeIter {
            runes: RuneIter::backward_at(tree, start_char),
            direction: Direction::Backward,
            buf: String::new(),
            buf_chars: 0,
            exhausted: false,
            pos: start_char,
        }
    }

    fn pull_one(&mut self) -> bool {
        match self.runes.next() {
            Some(c) => {
                match self.direction {
                    Direction::Forward => self.buf.push(c),
                    Direction::Backward => self.buf.insert(0, c),
                }
                self.buf_chars += 1;
                true
            }
            None => {
                self.exhausted = true;
                false
            }
        }
    }

    fn cluster_count(&self) -> usize {
        self.buf.graphemes(true).count()
    }
}

impl<'t> Iterator for GraphemeIter<'t> {
    type Item = Cluster;

    fn next(&mut self) -> Option<Cluster> {
        loop {
            if self.buf.is_empty() && self.exhausted {
                return None;
            }
            if self.exhausted || self.cluster_count() >= 2 {
                break;
            }
            self.pull_one();
        }

        match self.direction {
            Direction::Forward => {
                let split = {
                    let mut it = self.buf.grapheme_indices(true);
                    let _first = it.next().unwrap();
                    it.next().map(|(i, _)| i).unwrap_or(self.buf.len())
                };
                let first_text = self.buf[..split].to_string();
                let n_chars = first_text.chars().count() as u64;
                self.buf = self.buf[split..].to_string();
                self.buf_chars -= n_chars;
                let start = self.pos;
                let end = start + n_chars;
                self.pos = end;
                Some(Cluster {
                    text: first_text,
                    start_char: start,
                    end_char: end,
                })
            }
            Direction::Backward => {
                let clusters: Vec<&str> = self.buf.graphemes(true).collect();
                let last = clusters.last().copied().unwrap_or("").to_string();
                let split = self.buf.len() - last.len();
                self.buf.truncate(split);
                let n_chars = last.chars().count() as u64;
                self.buf_chars -= n_chars;
                let end = self.pos;
                let start = end - n_chars;
                self.pos = start;
                Some(Cluster {
                    text: last,
                    start_char: start,
                    end_char: end,
                })
            }
        }
    }
}

/// One wrapped line: a maximal run of grapheme clusters ending at an LF or
/// the soft-wrap width, with its absolute character span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedLine {
    pub text: String,
    pub start_char: u64,
    pub end_char: u64,
}

/// Soft-wrapped-line iterator (L2), parameterized by a max display width and
/// a width function `Fn(cluster_text, start_col) -> width`. Implements the
/// four wrapping rules in order: hard break on LF, soft break on overflow,
/// oversize-cluster-as-own-line (absorbing an immediately following LF),
/// otherwise append.
pub struct WrappedLineIter<'t, F> {
    clusters: GraphemeIter<'t>,
    pending: Option<Cluster>,
    max_width: u16,
    width_fn: F,
    line_text: String,
    line_col: u16,
    line_start: Option<u64>,
    line_end: u64,
    done: bool,
}

impl<'t, F> WrappedLineIter<'t, F>
where
    F: FnMut(&str, u16) -> u16,
{
    pub fn new(tree: &'t Tree, start_char: u64, max_width: u16, width_fn: F) -> Self {
        WrappedLineIter {
            clusters: GraphemeIter::forward_at(tree, start_char),
            pending: None,
            max_width: max_width.max(1),
            width_fn,
            line_text: String::new(),
            line_col: 0,
            line_start: None,
            line_end: start_char,
            done: false,
        }
    }

    fn take_next_cluster(&mut self) -> Option<Cluster> {
        self.pending.take().or_else(|| self.clusters.next())
    }

    fn flush(&mut self) -> WrappedLine {
        let line = WrappedLine {
            text: std::mem::take(&mut self.line_text),
            start_char: self.line_start.unwrap_or(self.line_end),
            end_char: self.line_end,
        };
        self.line_col = 0;
        self.line_start = None;
        line
    }
}

impl<'t, F> Iterator for WrappedLineIter<'t, F>
where
    F: FnMut(&str, u16) -> u16,
{
    type Item = WrappedLine;

    fn next(&mut self) -> Option<WrappedLine> {
        if self.done {
            return None;
        }
        loop {
            let Some(cluster) = self.take_next_cluster() else {
                self.done = true;
                if self.line_text.is_empty() {
                    return None;
                }
                return Some(self.flush());
            };

            if self.line_start.is_none() {
                self.line_start = Some(cluster.start_char);
            }
            let is_lf = cluster.text == "\n" || cluster.text == "\r\n";

            if is_lf {
                // Rule 1: hard break, LF included in the line it terminates.
                self.line_text.push_str(&cluster.text);
                self.line_end = cluster.end_char;
                return Some(self.flush());
            }

            let width = (self.width_fn)(&cluster.text, self.line_col);

            if !self.line_text.is_empty() && self.line_col + width > self.max_width {
                // Rule 2: soft break before this cluster.
                let out = self.flush();
                self.pending = Some(cluster);
                return Some(out);
            }

            if self.line_text.is_empty() && width > self.max_width {
                // Rule 3: oversize cluster is its own line; absorb a
                // trailing LF so it doesn't leave a spurious blank line.
                self.line_text.push_str(&cluster.text);
                self.line_end = cluster.end_char;
                if let Some(next) = self.clusters.next() {
                    if next.text == "\n" || next.text == "\r\n" {
                        self.line_text.push_str(&next.text);
                        self.line_end = next.end_char;
                    } else {
                        self.pending = Some(next);
                    }
                }
                return Some(self.flush());
            }

            // Rule 4: append.
            self.line_text.push_str(&cluster.text);
            self.line_col += width;
            self.line_end = cluster.end_char;
        }
    }
}
