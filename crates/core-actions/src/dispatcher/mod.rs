//! Dispatcher applying `Action` to mutable editor state.
//!
//! Refactor R3 / Step 1: Module decomposition.
//! -------------------------------------------------
//! This module was previously a single 1000+ line file. It is now
//! decomposed into focused sub-modules:
//! * `motion`  - cursor movement semantics
//! * `mode`    - mode transitions (Normal <-> Insert)
//! * `command` - command line editing & execution (:q, :e, :w)
//! * `edit`    - text mutation (insert/delete/backspace/newline)
//! * `undo`    - undo / redo dispatch
//!
//! The public surface (`dispatch`, `DispatchResult`) remains unchanged.
//! Borrow splitting (raw pointer for `EditorState` + mutable active view
//! borrow) is preserved exactly to avoid accidental semantic drift.
//!
//! Zero behavioral change is intended in this step; tests from the
//! original monolithic module are retained verbatim below to guarantee
//! parity. Subsequent refactor steps (command parser extraction, etc.)
//! will build on this structure.

use crate::{Action, ActionObserver, MotionKind};
use core_model::EditorModel;
use core_state::PasteSource;

mod command;
mod command_parser;
mod edit;
mod mode;
mod motion;
mod undo;

/// Result of dispatching a single `Action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchResult {
    pub dirty: bool,
    pub quit: bool,
    /// Indicates a structural buffer replacement occurred (e.g. :e loaded a new file)
    /// and any partial render caches (line hashes, last cursor line) must be treated
    /// as invalid. The runtime should escalate to a Full render regardless of the
    /// semantic dirty heuristic chosen for ordinary edits/motions.
    pub buffer_replaced: bool,
}

impl DispatchResult {
    pub fn dirty() -> Self {
        Self {
            dirty: true,
            quit: false,
            buffer_replaced: false,
        }
    }
    pub fn clean() -> Self {
        Self {
            dirty: false,
            quit: false,
            buffer_replaced: false,
        }
    }
    pub fn quit() -> Self {
        Self {
            dirty: true,
            quit: true,
            buffer_replaced: false,
        }
    }
    pub fn buffer_replaced() -> Self {
        Self {
            dirty: true,
            quit: false,
            buffer_replaced: true,
        }
    }
}

/// Apply an action to editor state. Returns `DispatchResult` describing whether
/// a render is needed (`dirty`) or the editor should exit (`quit`).
pub fn dispatch(
    action: Action,
    model: &mut EditorModel,
    sticky_visual_col: &mut Option<usize>,
    observers: &[Box<dyn ActionObserver>],
) -> DispatchResult {
    // Safe split borrow (encapsulated unsafety lives in `EditorModel::split_state_and_active_view`).
    let (state, view) = model.split_state_and_active_view();

    // Notify observers (pre-dispatch).
    for obs in observers {
        obs.on_action(&action);
    }

    match action {
        Action::Motion(kind) => motion::handle_motion(kind, state, view, sticky_visual_col),
        Action::MotionWithCount {
            motion: kind,
            count,
        } => {
            let mut result = DispatchResult::clean();
            for _ in 0..count {
                // repeat motion count times
                let r = motion::handle_motion(kind, state, view, sticky_visual_col);
                if r.dirty {
                    result.dirty = true;
                }
            }
            result
        }
        Action::ModeChange(mc) => mode::handle_mode_change(mc, state, view),
        Action::CommandStart
        | Action::CommandChar(_)
        | Action::CommandBackspace
        | Action::CommandCancel
        | Action::CommandExecute(_) => command::handle_command_action(action, state, view),
        Action::Edit(kind) => edit::handle_edit(kind, state, view),
        Action::Undo => undo::handle_undo(state, view),
        Action::Redo => undo::handle_redo(state, view),
        Action::PasteAfter { register } => {
            // Step 7: allow explicit named (a–z/A–Z) and numbered (0–9) registers.
            let source = register
                .and_then(|c| {
                    if c.is_ascii_alphabetic() {
                        Some(PasteSource::Named(c))
                    } else if c.is_ascii_digit() {
                        // Map ASCII digit to ring index; '0' -> 0 newest, '9' -> 9 oldest (if present)
                        Some(PasteSource::Numbered((c as u8 - b'0') as usize))
                    } else {
                        None
                    }
                })
                .unwrap_or(PasteSource::Unnamed);
            match state.paste(source, false, &mut view.cursor) {
                Ok(structural) => {
                    if structural {
                        DispatchResult::buffer_replaced()
                    } else {
                        DispatchResult::dirty()
                    }
                }
                Err(_) => DispatchResult::clean(),
            }
        }
        Action::PasteBefore { register } => {
            let source = register
                .and_then(|c| {
                    if c.is_ascii_alphabetic() {
                        Some(PasteSource::Named(c))
                    } else if c.is_ascii_digit() {
                        Some(PasteSource::Numbered((c as u8 - b'0') as usize))
                    } else {
                        None
                    }
                })
                .unwrap_or(PasteSource::Unnamed);
            match state.paste(source, true, &mut view.cursor) {
                Ok(structural) => {
                    if structural {
                        DispatchResult::buffer_replaced()
                    } else {
                        DispatchResult::dirty()
                    }
                }
                Err(_) => DispatchResult::clean(),
            }
        }
        Action::Quit => DispatchResult::quit(),
        Action::BeginOperator(_) => DispatchResult::clean(),
        Action::ApplyOperator {
            op,
            motion,
            count,
            register,
        } => {
            use crate::OperatorKind;
            use crate::span_resolver::resolve_selection;
            match op {
                OperatorKind::Delete => {
                    let start_pos = view.cursor;
                    let sel = resolve_selection(state, start_pos, motion, count);
                    if sel.start == sel.end {
                        return DispatchResult::clean();
                    }
                    // Convert selection start/end positions to absolute byte indices.
                    let (abs_start, abs_end) = selection_abs_byte_range(state, sel.start, sel.end);
                    if abs_start == abs_end {
                        return DispatchResult::clean();
                    }
                    let mut cursor = view.cursor;
                    let removed = state.delete_span_with_snapshot(&mut cursor, abs_start, abs_end);
                    let structural = removed.contains('\n')
                        || matches!(sel.kind, core_state::SelectionKind::Linewise);
                    {
                        let mut regs = state.registers_facade();
                        regs.write_delete(removed.clone(), register);
                    }
                    view.cursor = cursor;
                    if !state.dirty {
                        state.dirty = true;
                    }
                    if structural {
                        DispatchResult::buffer_replaced()
                    } else {
                        DispatchResult::dirty()
                    }
                }
                OperatorKind::Yank => {
                    let start_pos = view.cursor;
                    let sel = resolve_selection(state, start_pos, motion, count);
                    if sel.start == sel.end {
                        return DispatchResult::clean();
                    }
                    let buffer = state.active_buffer();
                    let collected = if matches!(sel.kind, core_state::SelectionKind::Linewise) {
                        // Linewise selection encodes end as exclusive (end points to start of line after last included line).
                        let mut s = String::new();
                        let line_start = sel.start.line.min(sel.end.line);
                        let line_end_exclusive = sel.start.line.max(sel.end.line);
                        for l in line_start..line_end_exclusive {
                            if let Some(line) = buffer.line(l) {
                                s.push_str(&line);
                            }
                        }
                        s
                    } else {
                        let (abs_start, abs_end) =
                            selection_abs_byte_range(state, sel.start, sel.end);
                        // Iterate lines overlapping range to collect substring (existing logic simplified)
                        let mut collected = String::new();
                        let mut abs = 0usize;
                        for l in 0..buffer.line_count() {
                            let line = buffer.line(l).unwrap();
                            let len = line.len();
                            let end_abs = abs + len;
                            if end_abs <= abs_start {
                                abs = end_abs;
                                continue;
                            }
                            if abs >= abs_end {
                                break;
                            }
                            let local_start = abs_start.saturating_sub(abs);
                            let local_end = (abs_end - abs).min(len);
                            collected.push_str(&line[local_start..local_end]);
                            abs = end_abs;
                        }
                        collected
                    };
                    {
                        let mut regs = state.registers_facade();
                        regs.write_yank(collected.clone(), register);
                    }
                    DispatchResult::dirty()
                }
                OperatorKind::Change => {
                    let start_pos = view.cursor;
                    let sel = resolve_selection(state, start_pos, motion, count);
                    if sel.start == sel.end {
                        return DispatchResult::clean();
                    }
                    let (abs_start, mut abs_end) =
                        selection_abs_byte_range(state, sel.start, sel.end);
                    if abs_start == abs_end {
                        return DispatchResult::clean();
                    }
                    abs_end =
                        adjust_change_range(state.active_buffer(), motion, abs_start, abs_end);
                    if abs_start == abs_end {
                        return DispatchResult::clean();
                    }
                    let mut cursor = view.cursor;
                    let removed = state.delete_span_with_snapshot(&mut cursor, abs_start, abs_end);
                    let structural = removed.contains('\n')
                        || matches!(sel.kind, core_state::SelectionKind::Linewise);
                    {
                        let mut regs = state.registers_facade();
                        regs.write_change(removed.clone(), register);
                    }
                    // Change enters insert at beginning of span (linewise: first line start; charwise: absolute start)
                    view.cursor = sel.start; // sel.start already normalized
                    state.mode = core_state::Mode::Insert;
                    if !state.dirty {
                        state.dirty = true;
                    }
                    if structural {
                        DispatchResult::buffer_replaced()
                    } else {
                        DispatchResult::dirty()
                    }
                }
            }
        }
        Action::VisualOperator { op, register } => {
            use crate::OperatorKind;
            use core_state::SelectionKind;
            if !matches!(state.mode, core_state::Mode::VisualChar) {
                return DispatchResult::clean();
            }
            let Some(span) = state.selection.active else {
                return DispatchResult::clean();
            };
            if span.start == span.end {
                return DispatchResult::clean();
            }
            // Map selection to absolute byte indices. For characterwise selections we
            // must treat the visual representation as inclusive of the last grapheme.
            let (abs_start, abs_end) =
                if matches!(span.kind, core_state::SelectionKind::Characterwise) {
                    span.inclusive_byte_range(state.active_buffer())
                } else {
                    selection_abs_byte_range(state, span.start, span.end)
                };
            if abs_start == abs_end {
                return DispatchResult::clean();
            }
            match op {
                OperatorKind::Delete => {
                    let mut cursor = view.cursor;
                    let removed = state.delete_span_with_snapshot(&mut cursor, abs_start, abs_end);
                    let structural =
                        removed.contains('\n') || matches!(span.kind, SelectionKind::Linewise);
                    {
                        let mut regs = state.registers_facade();
                        regs.write_delete(removed.clone(), register);
                    }
                    // Cursor placement: start of resulting span (normalized span.start)
                    view.cursor = span.start;
                    state.clear_selection();
                    state.mode = core_state::Mode::Normal;
                    if !state.dirty {
                        state.dirty = true;
                    }
                    if structural {
                        DispatchResult::buffer_replaced()
                    } else {
                        DispatchResult::dirty()
                    }
                }
                OperatorKind::Yank => {
                    // Collect text similar to yank path in ApplyOperator
                    let buffer = state.active_buffer();
                    let collected = if matches!(span.kind, SelectionKind::Linewise) {
                        let mut s = String::new();
                        let line_start = span.start.line.min(span.end.line);
                        let line_end_exclusive = span.start.line.max(span.end.line);
                        for l in line_start..line_end_exclusive {
                            if let Some(line) = buffer.line(l) {
                                s.push_str(&line);
                            }
                        }
                        s
                    } else {
                        // Gather substring across lines.
                        let mut collected = String::new();
                        let mut abs = 0usize;
                        for l in 0..buffer.line_count() {
                            let line = buffer.line(l).unwrap();
                            let len = line.len();
                            let end_abs = abs + len;
                            if end_abs <= abs_start {
                                abs = end_abs;
                                continue;
                            }
                            if abs >= abs_end {
                                break;
                            }
                            let local_start = abs_start.saturating_sub(abs);
                            let local_end = (abs_end - abs).min(len);
                            collected.push_str(&line[local_start..local_end]);
                            abs = end_abs;
                        }
                        collected
                    };
                    {
                        let mut regs = state.registers_facade();
                        regs.write_yank(collected.clone(), register);
                    }
                    // Cursor stays at active end? Vim leaves at start for charwise.
                    view.cursor = span.start;
                    state.clear_selection();
                    state.mode = core_state::Mode::Normal;
                    DispatchResult::dirty()
                }
                OperatorKind::Change => {
                    let mut cursor = view.cursor;
                    let removed = state.delete_span_with_snapshot(&mut cursor, abs_start, abs_end);
                    let structural =
                        removed.contains('\n') || matches!(span.kind, SelectionKind::Linewise);
                    {
                        let mut regs = state.registers_facade();
                        regs.write_change(removed.clone(), register);
                    }
                    view.cursor = span.start; // enter insert at start
                    state.clear_selection();
                    state.mode = core_state::Mode::Insert;
                    if !state.dirty {
                        state.dirty = true;
                    }
                    if structural {
                        DispatchResult::buffer_replaced()
                    } else {
                        DispatchResult::dirty()
                    }
                }
            }
        }
    }
}

// Helper: map selection positions to absolute byte indices (inclusive start, exclusive end) via scan.
fn selection_abs_byte_range(
    state: &core_state::EditorState,
    start: core_text::Position,
    end: core_text::Position,
) -> (usize, usize) {
    let buffer = state.active_buffer();
    // Reuse logic similar to span_resolver absolute_index but for both endpoints.
    let to_abs = |pos: core_text::Position| {
        let mut total = 0usize;
        for line in 0..pos.line {
            total += buffer.line_byte_len(line);
            if let Some(l) = buffer.line(line)
                && l.ends_with('\n')
            {
                total += 1;
            }
        }
        total + pos.byte
    };
    let a = to_abs(start);
    let b = to_abs(end);
    if a <= b { (a, b) } else { (b, a) }
}

fn adjust_change_range(
    buffer: &core_text::Buffer,
    motion: MotionKind,
    abs_start: usize,
    abs_end: usize,
) -> usize {
    if abs_start >= abs_end {
        return abs_end;
    }
    match motion {
        MotionKind::WordForward => {
            let slice = buffer.slice_bytes(abs_start, abs_end);
            if slice.is_empty() || slice.chars().all(|c| c.is_whitespace()) {
                return abs_end;
            }
            let trimmed = slice.trim_end_matches(|c: char| c.is_whitespace());
            if trimmed.len() == slice.len() {
                abs_end
            } else {
                abs_start + trimmed.len()
            }
        }
        _ => abs_end,
    }
}
