//! L3.5: scroll policy.
//!
//! Given the cursor, the tree, the current view origin and viewport size,
//! computes a new view origin satisfying the scroll-margin policy: the
//! cursor should land in the margin-interior band of the viewport whenever
//! possible, never exactly on the first or last `margin` on-screen wrapped
//! lines unless the whole viewport is too small to have an interior.
//!
//! The worked example in the concrete test scenarios fixes the forward-scroll
//! formula as `viewHeight - 2*margin` wrapped lines above the cursor (not the
//! `viewHeight - margin - 1` one might expect from the margin-interior
//! description alone); see the derivation recorded alongside the test below.

use crate::segment::WrappedLineIter;
use crate::tree::Tree;

/// Default scroll margin in wrapped lines.
pub const DEFAULT_SCROLL_MARGIN: u16 = 3;

struct Line {
    start: u64,
    end: u64,
}

fn all_wrapped_lines<F>(tree: &Tree, width: u16, mut width_fn: F) -> Vec<Line>
where
    F: FnMut(&str, u16) -> u16,
{
    WrappedLineIter::new(tree, 0, width, &mut width_fn)
        .map(|l| Line {
            start: l.start_char,
            end: l.end_char,
        })
        .collect()
}

fn line_index_containing(lines: &[Line], pos: u64) -> usize {
    for (i, l) in lines.iter().enumerate() {
        if pos < l.end || i == lines.len() - 1 {
            return i;
        }
    }
    0
}

fn line_index_of_start(lines: &[Line], origin: u64) -> usize {
    lines.iter().position(|l| l.start == origin).unwrap_or(0)
}

/// Compute the new view origin for the scroll-to-cursor policy.
///
/// `width_fn` must behave identically across calls within one invocation
/// (it is used to re-derive wrapped-line boundaries for the whole document).
pub fn scroll<F>(
    tree: &Tree,
    view_origin: u64,
    view_width: u16,
    view_height: u16,
    cursor_pos: u64,
    margin: u16,
    mut width_fn: F,
) -> u64
where
    F: FnMut(&str, u16) -> u16,
{
    tracing::trace!(target: "core_text.scroll", view_origin, cursor_pos, margin, "scroll_to_cursor");
    if tree.num_chars() == 0 {
        return 0;
    }
    let lines = all_wrapped_lines(tree, view_width, &mut width_fn);
    if lines.is_empty() {
        return 0;
    }

    let view_start_idx = line_index_of_start(&lines, view_origin);
    let cur_idx = line_index_containing(&lines, cursor_pos.min(tree.num_chars()));

    let actual_lines = (lines.len() - view_start_idx).min(view_height as usize);
    let margin = margin as usize;
    let effective_margin = if actual_lines > 2 * margin {
        margin
    } else if actual_lines >= 3 {
        1
    } else {
        0
    };
    let lo = effective_margin;
    let hi = actual_lines.saturating_sub(effective_margin + 1);

    let rel_idx = cur_idx as isize - view_start_idx as isize;

    if rel_idx >= 0 && (rel_idx as usize) <= hi && (rel_idx as usize) >= lo {
        // Last visible line's trailing LF is excluded from the visible
        // range: a cursor just past it would render on an invisible row.
        let last = &lines[view_start_idx + hi.min(lines.len() - 1 - view_start_idx)];
        if (rel_idx as usize) == hi && last.end > last.start && cursor_pos >= last.end {
            // fall through to forward scroll below
        } else {
            return view_origin;
        }
    }

    let new_idx = if rel_idx < lo as isize {
        let lines_above_backward = margin.min(view_height.saturating_sub(1) as usize);
        cur_idx.saturating_sub(lines_above_backward)
    } else {
        let lines_above_forward = (view_height as usize).saturating_sub(2 * margin);
        cur_idx.saturating_sub(lines_above_forward)
    };

    lines[new_idx.min(lines.len() - 1)].start
}

/// Move the view origin by `n` wrapped lines (per [`crate::locator::Direction`]
/// via the two bools below to avoid a circular import), clamping so a
/// forward scroll never runs the viewport past the point where fewer than
/// `view_height` lines of content would remain, and a backward scroll never
/// runs before the start of the document.
pub fn scroll_lines<F>(
    tree: &Tree,
    view_origin: u64,
    view_width: u16,
    view_height: u16,
    forward: bool,
    n: u64,
    mut width_fn: F,
) -> u64
where
    F: FnMut(&str, u16) -> u16,
{
    if tree.num_chars() == 0 {
        return 0;
    }
    let lines = all_wrapped_lines(tree, view_width, &mut width_fn);
    if lines.is_empty() {
        return 0;
    }
    let idx = line_index_of_start(&lines, view_origin);
    let total = lines.len();
    let raw = if forward {
        idx + n as usize
    } else {
        idx.saturating_sub(n as usize)
    };
    let max_idx = total.saturating_sub(view_height as usize);
    let new_idx = if forward { raw.min(max_idx) } else { raw };
    lines[new_idx.min(total - 1)].start
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::width::cluster_width_at;
    use std::io::Cursor;

    fn build(s: &str) -> Tree {
        Tree::build_from_reader(Cursor::new(s.as_bytes())).unwrap()
    }

    // S7: 1024 'a's, viewWidth=2, viewHeight=10, cursor at 20, origin 0.
    // Each wrapped line is exactly 2 chars (no newlines in the document), so
    // cursor falls in line index 10. linesAboveForward = 10 - 2*3 = 4, so the
    // new origin is the start of line index 10-4=6, i.e. char 12.
    #[test]
    fn s7_scroll_margin_forward() {
        let t = build(&"a".repeat(1024));
        let origin = scroll(&t, 0, 2, 10, 20, 3, |g, col| cluster_width_at(g, col as usize, 4));
        assert_eq!(origin, 12);
    }

    #[test]
    fn no_scroll_when_cursor_in_interior() {
        let t = build(&"a".repeat(1024));
        // Interior band with margin 3 over a 10-line view is indices 3..=6.
        // Line index 4 covers chars [8,10).
        let origin = scroll(&t, 0, 2, 10, 8, 3, |g, col| cluster_width_at(g, col as usize, 4));
        assert_eq!(origin, 0);
    }

    #[test]
    fn scroll_backward_when_cursor_above_view() {
        let t = build(&"a".repeat(1024));
        // Establish a view starting well into the document, then move the
        // cursor above it.
        let origin = scroll(&t, 40, 2, 10, 0, 3, |g, col| cluster_width_at(g, col as usize, 4));
        // linesAboveBackward = min(3, 9) = 3; cursor is at line 0, so the new
        // origin keeps 3 lines above it, clamped to the start of the doc.
        assert_eq!(origin, 0);
    }

    #[test]
    fn scroll_lines_forward_and_backward() {
        let t = build(&"a".repeat(200));
        let o1 = scroll_lines(&t, 0, 2, 10, true, 5, |g, col| cluster_width_at(g, col as usize, 4));
        assert_eq!(o1, 10); // 5 lines * 2 chars/line
        let o2 = scroll_lines(&t, o1, 2, 10, false, 2, |g, col| cluster_width_at(g, col as usize, 4));
        assert_eq!(o2, 6);
    }

    #[test]
    fn scroll_lines_forward_clamps_at_document_end() {
        let t = build(&"a".repeat(20)); // 10 lines of width 2
        let o = scroll_lines(&t, 0, 2, 10, true, 100, |g, col| cluster_width_at(g, col as usize, 4));
        assert_eq!(o, 0); // total lines == view height, nothing to scroll past
    }

    #[test]
    fn empty_document_scrolls_to_zero() {
        let t = build("");
        let origin = scroll(&t, 0, 80, 24, 0, 3, |g, col| cluster_width_at(g, col as usize, 4));
        assert_eq!(origin, 0);
    }
}
