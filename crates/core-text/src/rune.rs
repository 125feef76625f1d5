//! L1: rune iterators over a [`crate::tree::Tree`].
//!
//! A rune iterator decodes the byte stream exposed by a [`crate::tree::Reader`]
//! into `char`s, one codepoint at a time, in either direction. Iterators are
//! cheap to clone (a reader is a leaf id + byte offset) so callers can fork
//! one to look ahead without disturbing the original — segment.rs leans on
//! this to peek past a candidate cluster boundary.

use crate::tree::{Direction, Reader, Tree};

/// A cloneable iterator over runes (Unicode scalar values) starting at a
/// given character position and walking in one direction.
#[derive(Clone)]
pub struct RuneIter<'t> {
    reader: Reader<'t>,
    direction: Direction,
}

impl<'t> RuneIter<'t> {
    pub fn forward_at(tree: &'t Tree, char_pos: u64) -> Self {
        RuneIter {
            reader: tree.reader_at_position(char_pos, Direction::Forward),
            direction: Direction::Forward,
        }
    }

    pub fn backward_at(tree: &'t Tree, char_pos: u64) -> Self {
        RuneIter {
            reader: tree.reader_at_position(char_pos, Direction::Backward),
            direction: Direction::Backward,
        }
    }
}

impl<'t> Iterator for RuneIter<'t> {
    type Item = char;

    fn next(&mut self) -> Option<char> {
        match self.direction {
            Direction::Forward => next_rune_forward(&mut self.reader),
            Direction::Backward => next_rune_backward(&mut self.reader),
        }
    }
}

fn next_rune_forward(reader: &mut Reader<'_>) -> Option<char> {
    // Only the very first byte of a rune represents legitimate end of
    // stream; L0 guarantees the tree holds valid UTF-8, so once a lead byte
    // has been read, a missing continuation byte or a failed decode is an
    // invariant violation, not exhaustion, and must abort (spec.md §7).
    let b0 = reader.next_byte()?;
    let mut buf = [0u8; 4];
    buf[0] = b0;
    let len = utf8_lead_len(b0);
    for slot in buf.iter_mut().take(len).skip(1) {
        *slot = reader
            .next_byte()
            .expect("truncated UTF-8 sequence: L0 guarantees byte-valid UTF-8");
    }
    let s = std::str::from_utf8(&buf[..len])
        .expect("invalid UTF-8 sequence read from tree: L0 guarantees byte-valid UTF-8");
    Some(s.chars().next().expect("decoded UTF-8 slice is non-empty"))
}

fn next_rune_backward(reader: &mut Reader<'_>) -> Option<char> {
    // Bytes arrive in reverse order; collect continuation bytes until a
    // lead byte is found, then decode forward. Only the very first byte
    // represents legitimate end of stream, per next_rune_forward above.
    let mut rev = [0u8; 4];
    let mut n = 0usize;
    loop {
        let b = if n == 0 {
            reader.next_byte()?
        } else {
            reader
                .next_byte()
                .expect("truncated UTF-8 sequence: L0 guarantees byte-valid UTF-8")
        };
        rev[n] = b;
        n += 1;
        if b & 0xC0 != 0x80 || n == 4 {
            break;
        }
    }
    let mut buf = [0u8; 4];
    for i in 0..n {
        buf[i] = rev[n - 1 - i];
    }
    let s = std::str::from_utf8(&buf[..n])
        .expect("invalid UTF-8 sequence read from tree: L0 guarantees byte-valid UTF-8");
    Some(s.chars().next().expect("decoded UTF-8 slice is non-empty"))
}

fn utf8_lead_len(b: u8) -> usize {
    if b & 0x80 == 0 {
        1
    } else if b & 0xE0 == 0xC0 {
        2
    } else if b & 0xF0 == 0xE0 {
        3
    } else if b & 0xF8 == 0xF0 {
        4
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn build(s: &str) -> Tree {
        Tree::build_from_reader(Cursor::new(s.as_bytes())).unwrap()
    }

    #[test]
    fn forward_matches_chars() {
        let s = "hi \u{4e16}\u{754c} \u{1f600}!";
        let t = build(s);
        let collected: String = RuneIter::forward_at(&t, 0).collect();
        assert_eq!(collected, s);
    }

    #[test]
    fn backward_matches_reversed_chars() {
        let s = "hi \u{4e16}\u{754c} \u{1f600}!";
        let t = build(s);
        let collected: String = RuneIter::backward_at(&t, t.num_chars()).collect();
        let expected: String = s.chars().rev().collect();
        assert_eq!(collected, expected);
    }

    #[test]
    fn forward_from_middle() {
        let t = build("abcdef");
        let collected: String = RuneIter::forward_at(&t, 2).collect();
        assert_eq!(collected, "cdef");
    }

    #[test]
    fn clone_forks_independently() {
        let t = build("abcdef");
        let mut it = RuneIter::forward_at(&t, 0);
        assert_eq!(it.next(), Some('a'));
        let mut forked = it.clone();
        assert_eq!(it.next(), Some('b'));
        assert_eq!(forked.next(), Some('b'));
        assert_eq!(forked.next(), Some('c'));
        assert_eq!(it.next(), Some('c'));
    }

    #[test]
    fn empty_tree_yields_nothing() {
        let t = build("");
        assert_eq!(RuneIter::forward_at(&t, 0).next(), None);
        assert_eq!(RuneIter::backward_at(&t, 0).next(), None);
    }
}
