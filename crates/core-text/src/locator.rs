//! L3: locators.
//!
//! A locator is a pure value describing *where* to move the cursor; it reads
//! a [`BufferState`](crate::mutator::BufferState) and returns a new
//! [`Cursor`](crate::mutator::Cursor). The variant set is closed and small,
//! so it is a tagged enum with a single `locate` match rather than a trait
//! hierarchy — there is no need for dynamic dispatch over an open set of
//! behaviors here.

use crate::mutator::{BufferState, Cursor};
use crate::segment::GraphemeIter;
use crate::tree::Tree;

/// Which way along the document a locator should move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// A pure cursor-positioning rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator {
    /// Move up to `count` grapheme clusters along `direction` without
    /// crossing a newline. `include_eol` allows landing on the line's
    /// terminating newline (or one past end-of-file).
    CharInLine {
        direction: Direction,
        count: u64,
        include_eol: bool,
    },
    /// Project a cursor sitting on a newline or past end-of-buffer back onto
    /// the preceding line's last on-line cluster.
    OntoLine,
    /// Move `count` lines up or down, preserving horizontal intent via
    /// `logical_offset`.
    RelativeLine { direction: Direction, count: u64 },
    /// Start or end of the current line.
    LineBoundary {
        direction: Direction,
        include_eol: bool,
    },
}

impl Locator {
    /// Evaluate this locator against `state`, returning a new cursor.
    /// Pure: does not mutate `state`.
    pub fn locate(&self, state: &BufferState) -> Cursor {
        match *self {
            Locator::CharInLine {
                direction,
                count,
                include_eol,
            } => char_in_line(&state.tree, state.cursor, direction, count, include_eol),
            Locator::OntoLine => onto_line(&state.tree, state.cursor),
            Locator::RelativeLine { direction, count } => {
                relative_line(&state.tree, state.cursor, direction, count)
            }
            Locator::LineBoundary {
                direction,
                include_eol,
            } => line_boundary(&state.tree, state.cursor, direction, include_eol),
        }
    }
}

/// Character offset of the end of the line containing `pos` (the index of
/// its terminating newline, or `tree.num_chars()` if the line runs to EOF).
fn line_end_char(tree: &Tree, pos: u64) -> u64 {
    let line = tree.line_num_for_position(pos);
    let start = tree.line_start_position(line);
    let mut cursor = start;
    let mut it = GraphemeIter::forward_at(tree, start);
    loop {
        match it.next() {
            Some(c) if c.text.contains('\n') => return c.start_char,
            Some(c) => cursor = c.end_char,
            None => return cursor,
        }
    }
}

fn char_in_line(
    tree: &Tree,
    cursor: Cursor,
    direction: Direction,
    count: u64,
    include_eol: bool,
) -> Cursor {
    let line = tree.line_num_for_position(cursor.position);
    let line_start = tree.line_start_position(line);
    let line_end = line_end_char(tree, cursor.position);
    let limit = if include_eol {
        // Extend past the terminating newline cluster itself so the forward
        // loop below is allowed to consume it, landing one past it (or at
        // EOF if the line has no newline).
        (line_end + 1).min(tree.num_chars())
    } else {
        line_end
    };

    match direction {
        Direction::Forward => {
            let mut pos = cursor.position;
            let mut it = GraphemeIter::forward_at(tree, pos);
            for _ in 0..count {
                match it.next() {
                    Some(c) if c.start_char < limit => pos = c.end_char.min(limit),
                    _ => break,
                }
            }
            let moved = pos != cursor.position;
            Cursor {
                position: pos,
                logical_offset: if moved { 0 } else { cursor.logical_offset },
            }
        }
        Direction::Backward => {
            let mut pos = cursor.position;
            let mut it = GraphemeIter::backward_at(tree, pos);
            for _ in 0..count {
                match it.next() {
                    Some(c) if c.end_char > line_start => pos = c.start_char.max(line_start),
                    _ => break,
                }
            }
            let moved = pos != cursor.position;
            Cursor {
                position: pos,
                logical_offset: if moved { 0 } else { cursor.logical_offset },
            }
        }
    }
}

fn onto_line(tree: &Tree, cursor: Cursor) -> Cursor {
    let at_end = cursor.position >= tree.num_chars();
    let on_newline = !at_end && {
        let mut it = GraphemeIter::forward_at(tree, cursor.position);
        matches!(it.next(), Some(c) if c.text.contains('\n'))
    };
    if !at_end && !on_newline {
        return cursor;
    }
    let target = if at_end { tree.num_chars() } else { cursor.position };
    let mut back = GraphemeIter::backward_at(tree, target);
    match back.next() {
        Some(c) => Cursor {
            position: c.start_char,
            logical_offset: 0,
        },
        None => Cursor {
            position: 0,
            logical_offset: 0,
        },
    }
}

/// Number of grapheme clusters from `line_start` up to (and excluding) `pos`.
fn clusters_before(tree: &Tree, line_start: u64, pos: u64) -> u64 {
    let mut n = 0u64;
    let mut it = GraphemeIter::forward_at(tree, line_start);
    while let Some(c) = it.next() {
        if c.start_char >= pos {
            break;
        }
        n += 1;
    }
    n
}

fn relative_line(tree: &Tree, cursor: Cursor, direction: Direction, count: u64) -> Cursor {
    let line = tree.line_num_for_position(cursor.position);
    let line_start = tree.line_start_position(line);
    let offset_clusters = clusters_before(tree, line_start, cursor.position);

    let target_line = match direction {
        Direction::Forward => {
            let last_line = tree.num_lines() - 1;
            if line >= last_line {
                return cursor;
            }
            (line + count).min(last_line)
        }
        Direction::Backward => {
            if line == 0 {
                return cursor;
            }
            line.saturating_sub(count)
        }
    };
    if target_line == line {
        return cursor;
    }

    let target_start = tree.line_start_position(target_line);
    let target_end = line_end_char(tree, target_start);
    // Number of on-line clusters, excluding the terminating newline.
    let line_clusters = clusters_before(tree, target_start, target_end);

    let advance = |n: u64| -> u64 {
        let mut pos = target_start;
        let mut it = GraphemeIter::forward_at(tree, target_start);
        for _ in 0..n {
            match it.next() {
                Some(c) => pos = c.end_char,
                None => break,
            }
        }
        pos
    };

    let want = offset_clusters + cursor.logical_offset;
    if line_clusters == 0 {
        return Cursor {
            position: target_start,
            logical_offset: want,
        };
    }
    if want < line_clusters {
        Cursor {
            position: advance(want),
            logical_offset: 0,
        }
    } else {
        Cursor {
            position: advance(line_clusters - 1),
            logical_offset: want - (line_clusters - 1),
        }
    }
}

fn line_boundary(tree: &Tree, cursor: Cursor, direction: Direction, include_eol: bool) -> Cursor {
    let line = tree.line_num_for_position(cursor.position);
    match direction {
        Direction::Backward => Cursor {
            position: tree.line_start_position(line),
            logical_offset: 0,
        },
        Direction::Forward => {
            let end = line_end_char(tree, cursor.position);
            let position = if include_eol {
                end.min(tree.num_chars())
            } else {
                onto_line(
                    tree,
                    Cursor {
                        position: end,
                        logical_offset: 0,
                    },
                )
                .position
            };
            Cursor {
                position,
                logical_offset: 0,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutator::{BufferState, Cursor, View};
    use std::io::Cursor as IoCursor;

    fn state(s: &str, pos: u64) -> BufferState {
        let tree = Tree::build_from_reader(IoCursor::new(s.as_bytes())).unwrap();
        BufferState {
            tree,
            cursor: Cursor {
                position: pos,
                logical_offset: 0,
            },
            view: View {
                text_origin: 0,
                width: 80,
                height: 24,
            },
        }
    }

    #[test]
    fn s5_onto_line_projects_off_newline() {
        let st = state("abcd\nefgh", 4);
        let c = Locator::OntoLine.locate(&st);
        assert_eq!(c.position, 3);
    }

    #[test]
    fn s6_relative_line_offset_preservation() {
        let mut st = state("abc\nefghijkl", 2);
        st.cursor = Cursor {
            position: 2,
            logical_offset: 0,
        };
        let down = Locator::RelativeLine {
            direction: Direction::Forward,
            count: 1,
        }
        .locate(&st);
        assert_eq!(down.position, 6);
        assert_eq!(down.logical_offset, 0);

        st.cursor = down;
        let up = Locator::RelativeLine {
            direction: Direction::Backward,
            count: 1,
        }
        .locate(&st);
        assert_eq!(up.position, 2);
        assert_eq!(up.logical_offset, 0);

        st.cursor = Cursor {
            position: 11,
            logical_offset: 5,
        };
        let up2 = Locator::RelativeLine {
            direction: Direction::Backward,
            count: 1,
        }
        .locate(&st);
        assert_eq!(up2.position, 2);
        assert_eq!(up2.logical_offset, 10);
    }

    #[test]
    fn char_in_line_forward_then_backward_is_identity_when_interior() {
        let st = state("abcdef", 2);
        let fwd = Locator::CharInLine {
            direction: Direction::Forward,
            count: 1,
            include_eol: false,
        }
        .locate(&st);
        let mut st2 = state("abcdef", fwd.position);
        st2.cursor.logical_offset = fwd.logical_offset;
        let back = Locator::CharInLine {
            direction: Direction::Backward,
            count: 1,
            include_eol: false,
        }
        .locate(&st2);
        assert_eq!(back.position, 2);
    }

    #[test]
    fn char_in_line_stops_at_newline_unless_include_eol() {
        let st = state("ab\ncd", 0);
        let excl = Locator::CharInLine {
            direction: Direction::Forward,
            count: 10,
            include_eol: false,
        }
        .locate(&st);
        assert_eq!(excl.position, 2);

        let incl = Locator::CharInLine {
            direction: Direction::Forward,
            count: 10,
            include_eol: true,
        }
        .locate(&st);
        assert_eq!(incl.position, 3);
    }

    #[test]
    fn line_boundary_start_and_end() {
        let st = state("abc\ndefgh", 5);
        let start = Locator::LineBoundary {
            direction: Direction::Backward,
            include_eol: false,
        }
        .locate(&st);
        assert_eq!(start.position, 4);
        let end = Locator::LineBoundary {
            direction: Direction::Forward,
            include_eol: false,
        }
        .locate(&st);
        assert_eq!(end.position, 8);
    }

    #[test]
    fn line_boundary_forward_include_eol_lands_on_newline() {
        let st = state("abc\ndefgh", 0);
        let end = Locator::LineBoundary {
            direction: Direction::Forward,
            include_eol: true,
        }
        .locate(&st);
        // `line_end_char` already points at the newline's own index, so
        // include_eol=true lands on it directly, unlike CharInLine (which
        // must advance one past it to have moved there at all).
        assert_eq!(end.position, 3);
    }

    #[test]
    fn relative_line_noop_at_document_edges() {
        let st = state("only one line", 3);
        let down = Locator::RelativeLine {
            direction: Direction::Forward,
            count: 1,
        }
        .locate(&st);
        assert_eq!(down.position, 3);
        let up = Locator::RelativeLine {
            direction: Direction::Backward,
            count: 1,
        }
        .locate(&st);
        assert_eq!(up.position, 3);
    }
}
