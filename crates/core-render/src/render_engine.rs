//! RenderEngine abstraction (Refactor R2 Steps 1-2): isolates frame building and renderer
//! dispatch. Step 2 separates content assembly from cursor/status overlay and stores prior
//! cursor span metadata (no behavioral change yet).

use crate::batch_writer::BatchWriter;
use crate::overlay::{build_overlay_lines, overlay_line_count, paint_overlay_rows_batch}; // Step 13 overlay integration
use crate::partial_cache::PartialCache;
use crate::partial_diff::classify_viewport_changes;
use crate::partial_metrics::{RenderPathMetrics, RenderPathMetricsSnapshot};
use crate::style::{StyleAttr, StyleLayer, StyleSpan};
use crate::{CellFlags, Frame};
use anyhow::Result;
use core_model::{Layout, View};
use core_state::EditorState;
use core_terminal::TerminalCapabilities; // Step 10 capabilities stub
use core_text::grapheme;

// Full vs Partial Render Grapheme Parity
// --------------------------------------
// All render paths (full, cursor-only, lines-partial, scroll-shift) emit grapheme clusters
// using the same cluster-width + next-boundary iteration. Wide clusters (CJK, emoji ZWJ
// sequences, combining sequences) are printed exactly once with no synthetic padding cells.
// Partial renders repaint only the minimal set of lines (or cursor cell) but never re-slice
// a cluster boundary differently than a full frame. This invariant guarantees:
//   1. Visual alignment parity across partial vs subsequent full frames.
//   2. Stable prev_text caching for diff/trim logic (cluster boundaries identical).
//   3. Correct cursor overlay placement (compute_cursor_span derives span from same logic).
// If future styling introduces multi-span attributes per cluster, this parity rule must be
// preserved; helper functions (e.g., paint_content_trim) centralize the iteration pattern.
/// Metadata describing the last cursor span painted (for future minimal invalidation logic).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorSpanMeta {
    pub line: Option<usize>,
    pub start_col: Option<u16>,
    pub width: Option<u16>,
}

/// Public facade used by the binary to produce a frame from state and flush it to the terminal.
pub struct RenderEngine {
    last_cursor: CursorSpanMeta,
    cache: PartialCache,
    metrics: RenderPathMetrics,
    capabilities: TerminalCapabilities, // Phase 3 Step 10: terminal feature gates
    // Instrumentation (Phase 3 Step 13): always compiled (lightweight) so integration
    // tests outside the crate (crate/tests) can assert repaint scope & path decisions.
    // Overhead is negligible: small Vec cleared/pushed only for partial paths.
    last_repaint_lines: Vec<usize>, // buffer line indices repainted in last partial frame
    last_repaint_kind: Option<&'static str>,
    /// Cached last rendered status line text for skip optimization (Phase 4 Step 13).
    prev_status: String,
}

/// Phase 3 Step 10: proportion of visible text rows whose inclusion in the
/// candidate repaint set (Lines partial path) triggers escalation to a full
/// frame repaint. Chosen conservatively to preserve most partial wins while
/// avoiding many discrete line clears when the majority changed.
pub const LINES_ESCALATION_THRESHOLD_PCT: f32 = 0.60; // 60%

impl Default for RenderEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderEngine {}

/// Result of a successful trimmed diff heuristic (Phase 4 Step 12).
struct TrimResult {
    prefix_cols: u16,
    interior: String,
    clear_suffix: bool,
    cols_saved: u16,
}

impl RenderEngine {
    fn try_trim_line(&self, old: &str, new: &str, width: u16) -> Option<TrimResult> {
        if old == new || width == 0 {
            return None;
        }
        // Walk forward grapheme clusters to find longest common prefix (byte index).
        let mut prefix_bytes = 0usize;
        let mut b_old = 0usize;
        let mut b_new = 0usize;
        loop {
            if b_old >= old.len() || b_new >= new.len() {
                break; // one exhausted
            }
            let next_old = grapheme::next_boundary(old, b_old);
            let next_new = grapheme::next_boundary(new, b_new);
            let g_old = &old[b_old..next_old];
            let g_new = &new[b_new..next_new];
            if g_old == g_new {
                prefix_bytes = next_old.min(next_new); // advance
                b_old = next_old;
                b_new = next_new;
                continue;
            }
            break;
        }

        // Walk backward grapheme clusters for suffix (exclusive of prefix region).
        let mut suffix_new_bytes = 0usize; // length in bytes of common suffix in new
        let mut eo_old = old.len();
        let mut eo_new = new.len();
        while eo_old > prefix_bytes && eo_new > prefix_bytes {
            // Find previous boundaries
            let prev_old = grapheme::prev_boundary(old, eo_old);
            let prev_new = grapheme::prev_boundary(new, eo_new);
            let g_old = &old[prev_old..eo_old];
            let g_new = &new[prev_new..eo_new];
            if g_old == g_new {
                // Would consuming this suffix remove the entire differing interior? ensure at least one differing cluster remains.
                if prev_old <= prefix_bytes || prev_new <= prefix_bytes {
                    break; // would overlap prefix -> no interior
                }
                suffix_new_bytes += eo_new - prev_new;
                eo_old = prev_old;
                eo_new = prev_new;
                continue;
            }
            break;
        }

        // Interior slices spanning the changed region (prefix..suffix exclusive)
        let new_interior = &new[prefix_bytes..new.len() - suffix_new_bytes];
        if new_interior.is_empty() {
            // For Step 12 we treat pure deletions as full repaint (need clear logic & potential EOL). Simpler fallback.
            return None;
        }
        // Visual width computations.
        let prefix_cols = grapheme::visual_col(old, prefix_bytes) as u16; // same for new at that boundary
        if prefix_cols >= width {
            return None;
        }
        let full_cols_new = grapheme::visual_col(new, new.len()) as u16;
        let interior_cols_new = grapheme::visual_col(new_interior, new_interior.len()) as u16;
        let saved_cols = full_cols_new.saturating_sub(interior_cols_new);
        const TRIM_MIN_SAVINGS_COLS: u16 = 4;
        if saved_cols < TRIM_MIN_SAVINGS_COLS {
            return None;
        }
        let clear_suffix = new.len() < old.len(); // line shrink or deletion beyond interior; safe to clear
        // Phase 5 / Step 0.4: previously disabled trimmed diff for net insertions only.
        // Phase 5 / Step 0.5: broaden guard â€“ disable trimmed diff whenever the line length
        // changes (net insertion OR shrink). Without terminal insert/delete cell ops (ICH/DCH)
        // we rely on full repaints to keep suffix/prefix parity across undo + motion sequences.
        if new.len() != old.len() {
            return None;
        }
        Some(TrimResult {
            prefix_cols,
            interior: new_interior.to_string(),
            clear_suffix,
            cols_saved: saved_cols,
        })
    }
    pub fn new() -> Self {
        Self {
            last_cursor: CursorSpanMeta::default(),
            cache: PartialCache::new(),
            metrics: RenderPathMetrics::default(),
            capabilities: TerminalCapabilities::detect(),
            last_repaint_lines: Vec::new(),
            last_repaint_kind: None,
            prev_status: String::new(),
        }
    }

    /// Cursor-only partial repaint: repaints old + new cursor lines and applies external status line.
    pub fn render_cursor_only(
        &mut self,
        state: &EditorState,
        view: &View,
        _layout: &Layout,
        w: u16,
        h: u16,
        status_line: &str,
    ) -> Result<()> {
        let start_time = std::time::Instant::now();
        if h == 0 {
            return Ok(());
        }
        self.last_repaint_lines.clear();
        self.last_repaint_kind = Some("cursor_only");
        let overlay_lines = overlay_line_count(state, w);
        let text_height = h.saturating_sub(1 + overlay_lines); // reserve overlay + status
        let buf = state.active_buffer();
        let viewport_first = view.viewport_first_line;
        let viewport_last_excl = viewport_first + text_height as usize;
        let mut writer = BatchWriter::new();

        let prev_line_opt = self.cache.last_cursor_line;
        let curr_line = view.cursor.line;

        let mut paint_line = |buf_line: usize| {
            if buf_line < viewport_first || buf_line >= viewport_last_excl {
                return;
            }
            let rel_y = (buf_line - viewport_first) as u16;
            writer.move_to(0, rel_y);
            writer.clear_line(0, rel_y);
            if let Some(raw_line) = buf.line(buf_line) {
                let content_trim: &str = if raw_line.ends_with(['\n', '\r']) {
                    &raw_line[..raw_line.len() - 1]
                } else {
                    raw_line.as_str()
                };
                Self::paint_content_trim(&mut writer, content_trim, w);
            }
        };

        if let Some(prev) = prev_line_opt
            && prev != curr_line
        {
            paint_line(prev);
            self.last_repaint_lines.push(prev);
        }
        paint_line(curr_line);
        if !self.last_repaint_lines.contains(&curr_line) {
            self.last_repaint_lines.push(curr_line);
        }

        if let Some(span) =
            self.compute_cursor_span(state, view, viewport_first, viewport_last_excl)
            && span.start_col < w
        {
            writer.move_to(span.start_col, (span.line - viewport_first) as u16);
            self.print_cursor_with_fallback(&mut writer, state, view);
        }
        // Paint overlay rows (always repaint) then status line.
        paint_overlay_rows_batch(&mut writer, state, w, h);
        self.maybe_apply_external_status_line(&mut writer, status_line, h);
        let (print_cmds, cells) = writer.flush()?;
        let dur = start_time.elapsed().as_nanos() as u64;
        use std::sync::atomic::Ordering::Relaxed;
        self.metrics.partial_frames.fetch_add(1, Relaxed);
        self.metrics.cursor_only_frames.fetch_add(1, Relaxed);
        self.metrics.last_partial_render_ns.store(dur, Relaxed);
        self.metrics.print_commands.fetch_add(print_cmds, Relaxed);
        self.metrics.cells_printed.fetch_add(cells, Relaxed);
        self.cache.last_cursor_line = Some(curr_line);
        Ok(())
    }

    /// Expose terminal capabilities (read-only) for scheduler decisions or tests.
    pub fn capabilities(&self) -> TerminalCapabilities {
        self.capabilities
    }

    /// Build + render a full frame (current behavior; breadth-first guarantee).
    pub fn render_full(
        &mut self,
        state: &EditorState,
        view: &View,
        layout: &Layout,
        w: u16,
        h: u16,
        status_line: &str,
    ) -> Result<()> {
        let start = std::time::Instant::now();
        // Step 5: classify hash differences (still full frame output). We run this
        // before building the frame so the hashing path always executes each frame.
        classify_viewport_changes(state, view, w, h, &mut self.cache, &self.metrics, None);

        let _primary = layout.primary(); // reserved for future multi-region use
        let _caps = self.capabilities; // reserved for scroll-region path gating (future)
        // Overlay integration (Step 13): determine overlay line count (fixed; always repainted).
        let overlay_lines = overlay_line_count(state, w);
        let mut frame = Frame::new(w, h);
        let full_text_height = if h > 0 { h - 1 } else { 0 }; // exclude status
        let effective_text_height = full_text_height.saturating_sub(overlay_lines);
        if effective_text_height > 0 {
            let buf = state.active_buffer();
            let start = view.viewport_first_line;
            let end = (start + effective_text_height as usize).min(buf.line_count());
            for (screen_y, line_idx) in (start..end).enumerate() {
                if (screen_y as u16) >= effective_text_height {
                    break;
                }
                if let Some(line) = buf.line(line_idx) {
                    let content_trim: &str = if line.ends_with(['\n', '\r']) {
                        &line[..line.len() - 1]
                    } else {
                        &line
                    };
                    let mut byte = 0usize;
                    let mut vis_col: u16 = 0;
                    while byte < content_trim.len() && vis_col < w {
                        let next = core_text::grapheme::next_boundary(content_trim, byte);
                        let cluster = &content_trim[byte..next];
                        let width = grapheme::cluster_width(cluster).max(1) as u16;
                        frame.set_cluster(
                            vis_col,
                            screen_y as u16,
                            cluster,
                            width,
                            CellFlags::empty(),
                        );
                        vis_col = vis_col.saturating_add(width);
                        byte = next;
                    }
                }
            }
        }
        // Step 9: compute style layer (cursor span only for now) and apply; update cursor meta.
        let viewport_start = view.viewport_first_line;
        let viewport_end_excl = viewport_start + effective_text_height as usize; // text area excludes overlay + status
        let mut style_layer = StyleLayer::new();
        if let Some(span) = self.compute_cursor_span(state, view, viewport_start, viewport_end_excl)
        {
            let rel_y = (span.line - viewport_start) as u16;
            frame.apply_flags_span(
                span.start_col,
                rel_y,
                span.width(),
                CellFlags::REVERSE | CellFlags::CURSOR,
            );
            self.last_cursor = CursorSpanMeta {
                line: Some(span.line),
                start_col: Some(span.start_col),
                width: Some(span.width()),
            };
            style_layer.push(span);
        } else {
            self.last_cursor = CursorSpanMeta::default();
        }
        // Status line already externally provided; we write it directly (cache stores exact
        // string). Previous note about cell padding reconstruction is obsolete now that
        // full + partial paths share identical cluster emission semantics.
        if h > 0 {
            // Paint overlay rows (always repaint) just above the status line.
            if overlay_lines > 0 && overlay_lines < h {
                // Paint overlay into a temporary batch then replay into frame (simplistic approach):
                // Simplicity: reuse existing cluster emission logic; performance non-critical for fixed small N.
                // For now we duplicate minimal logic: just call build_overlay_lines and set clusters directly.
                let lines = build_overlay_lines(state, w);
                let mut row = h - 1 - overlay_lines;
                for l in lines.iter().take(overlay_lines as usize) {
                    let mut byte = 0usize;
                    let mut x: u16 = 0;
                    while byte < l.len() && x < w {
                        let next = grapheme::next_boundary(l, byte);
                        let cluster = &l[byte..next];
                        let width = grapheme::cluster_width(cluster).max(1) as u16;
                        frame.set_cluster(x, row, cluster, width, CellFlags::empty());
                        x = x.saturating_add(width);
                        byte = next;
                    }
                    row += 1;
                }
            }
            // Paint externally provided status line at bottom.
            apply_external_status_line(status_line, &mut frame, w, h);
            self.prev_status = status_line.to_string();
        } else {
            self.prev_status.clear();
        }
        // Phase 3 Step 6: translate Frame into writer commands (still full repaint)
        let (print_cmds, cells) = self.render_via_writer(&frame)?;
        // Update last cursor line in cache.
        self.cache.last_cursor_line = Some(view.cursor.line);
        // Populate prev_text shadow for all visible lines (text area only) for trimming in subsequent partial frames.
        if h > 0 {
            let text_height = h - 1;
            let buf = state.active_buffer();
            let start = view.viewport_first_line;
            let end = (start + text_height as usize).min(buf.line_count());
            // Ensure prev_text length matches line_hashes length (line_hashes already updated by classify_viewport_changes earlier).
            if self.cache.prev_text.len() != self.cache.line_hashes.len() {
                self.cache
                    .prev_text
                    .resize(self.cache.line_hashes.len(), None);
            }
            for (row, line_idx) in (start..end).enumerate() {
                if let Some(raw) = buf.line(line_idx) {
                    let content_trim: &str = if raw.ends_with(['\n', '\r']) {
                        &raw[..raw.len() - 1]
                    } else {
                        raw.as_str()
                    };
                    if row < self.cache.prev_text.len() {
                        self.cache.set_prev_text(row, content_trim.to_string());
                    }
                }
            }
        }
        let dur = start.elapsed().as_nanos() as u64;
        use std::sync::atomic::Ordering::Relaxed;
        self.metrics.full_frames.fetch_add(1, Relaxed);
        self.metrics.last_full_render_ns.store(dur, Relaxed);
        self.metrics.print_commands.fetch_add(print_cmds, Relaxed);
        self.metrics.cells_printed.fetch_add(cells, Relaxed);
        Ok(())
    }

    /// Phase 3 Step 9: external resize invalidation. Clears partial cache so the next
    /// frame (forced full by caller) rebuilds hashes for the new viewport dimensions.
    /// Metrics record the invalidation event. This keeps responsibility for cache
    /// lifecycle within the render layer while allowing the event loop / terminal size
    /// watcher to trigger a lightweight invalidation without immediately rendering.
    pub fn invalidate_for_resize(&mut self) {
        self.cache.clear();
        use std::sync::atomic::Ordering::Relaxed;
        self.metrics.resize_invalidations.fetch_add(1, Relaxed);
    }

    /// Placeholder for future partial rendering path (Phase 3).
    pub fn render_partial(
        &mut self,
        state: &EditorState,
        view: &View,
        layout: &Layout,
        w: u16,
        h: u16,
    ) -> Result<()> {
        // Step 7 currently only activates for CursorOnly effective decisions.
        // Fallback to full for any other future kinds until Step 8 extends logic.
        let status_line = build_status_line(state, view);
        self.render_full(state, view, layout, w, h, &status_line)
    }

    // (Old internal cursor-only path removed; new implementation earlier in impl uses external status.)

    /// Phase 3 Step 8: lines partial repaint. Repaints only changed lines (hash diff) plus
    /// old & new cursor lines (always) unless escalation threshold exceeded (handled by scheduler decision upstream).
    #[allow(clippy::too_many_arguments)]
    pub fn render_lines_partial(
        &mut self,
        state: &EditorState,
        view: &View,
        _layout: &Layout,
        w: u16,
        h: u16,
        dirty_tracker: &mut crate::dirty::DirtyLinesTracker,
        status_line: &str,
    ) -> Result<()> {
        use std::sync::atomic::Ordering::Relaxed;
        let start_time = std::time::Instant::now();
        if h == 0 {
            return Ok(());
        }
        self.last_repaint_lines.clear();
        self.last_repaint_kind = Some("lines");
        let overlay_lines = overlay_line_count(state, w);
        let text_height = h.saturating_sub(1 + overlay_lines); // reserve overlay + status
        let viewport_first = view.viewport_first_line;
        let visible_rows = text_height as usize;
        let viewport_last_excl = viewport_first + visible_rows;

        // If cache cold (viewport changed or width mismatch) fallback via full render (caller should have escalated).
        if self.cache.viewport_start != viewport_first || self.cache.width != w {
            return self.render_full(state, view, _layout, w, h, status_line);
        }

        let mut writer = BatchWriter::new();
        let buf = state.active_buffer();
        // Collect dirty lines inside viewport.
        let mut candidates = dirty_tracker.take_in_viewport(viewport_first, visible_rows);
        // Always include old cursor line (if different & visible) and current cursor line.
        if let Some(old) = self.cache.last_cursor_line
            && old >= viewport_first
            && old < viewport_last_excl
        {
            candidates.push(old);
        }
        let curr_cursor = view.cursor.line;
        if curr_cursor >= viewport_first && curr_cursor < viewport_last_excl {
            candidates.push(curr_cursor);
        }
        if candidates.is_empty() {
            return Ok(());
        }
        candidates.sort_unstable();
        candidates.dedup();

        if candidates.len() as f32 >= (visible_rows as f32 * LINES_ESCALATION_THRESHOLD_PCT) {
            self.metrics.escalated_large_set.fetch_add(1, Relaxed);
            self.last_repaint_kind = Some("escalated_full");
            self.last_repaint_lines.clear();
            return self.render_full(state, view, _layout, w, h, status_line);
        }

        // Update metrics for candidate set (dirty_lines_marked already counted earlier by diff classifier in full frames; here we just record candidates & repaints).
        self.metrics.partial_frames.fetch_add(1, Relaxed);
        self.metrics.lines_frames.fetch_add(1, Relaxed);
        self.metrics
            .dirty_candidate_lines
            .fetch_add(candidates.len() as u64, Relaxed);

        // Paint each candidate line if content differs or it is a cursor line (always repaint).
        let mut repainted = 0u64;
        for line_idx in candidates.iter().copied() {
            if line_idx < viewport_first || line_idx >= viewport_last_excl {
                continue;
            }
            let rel_y = (line_idx - viewport_first) as u16;
            // Compute hash for this line to compare with cache entry.
            let mut changed = true; // default repaint for safety
            if let Some(raw_line) = buf.line(line_idx) {
                let content_trim: &str = if raw_line.ends_with(['\n', '\r']) {
                    &raw_line[..raw_line.len() - 1]
                } else {
                    raw_line.as_str()
                };
                let vh = crate::partial_cache::PartialCache::compute_hash(content_trim);
                if let Some(entry) = self.cache.line_hashes.get(line_idx - viewport_first)
                    && entry.hash == vh.hash
                    && entry.len == vh.len
                {
                    changed = false;
                }
                // Always repaint if line is cursor line(s)
                if line_idx == curr_cursor || Some(line_idx) == self.cache.last_cursor_line {
                    changed = true;
                }
                if changed {
                    // Step 12: attempt trimmed diff using previously stored text.
                    self.metrics.trim_attempts.fetch_add(1, Relaxed);
                    let cache_row = line_idx - viewport_first;
                    let mut trimmed_success = false;
                    if let Some(old_text) = self.cache.get_prev_text(cache_row)
                        && let Some(tr) = self.try_trim_line(old_text, content_trim, w)
                    {
                        // Emit: move to prefix, print interior, optionally clear suffix, then done.
                        writer.move_to(tr.prefix_cols, rel_y);
                        // Clear to end of line first if we need to guarantee removal of prior tail (line shrink case); conservative.
                        if tr.clear_suffix {
                            writer.clear_line(0, rel_y); // full clear to ensure no artifacts (simple for Phase 4)
                            writer.move_to(tr.prefix_cols, rel_y);
                        }
                        writer.print(tr.interior);
                        self.metrics.trim_success.fetch_add(1, Relaxed);
                        self.metrics
                            .cols_saved_total
                            .fetch_add(tr.cols_saved as u64, Relaxed);
                        trimmed_success = true;
                    }
                    if !trimmed_success {
                        writer.move_to(0, rel_y);
                        writer.clear_line(0, rel_y);
                        Self::paint_content_trim(&mut writer, content_trim, w);
                    }
                    // Update cache hash entry & stored text (store entire new content string).
                    if cache_row < self.cache.line_hashes.len()
                        && let Some(raw) = self.cache.line_hashes.get_mut(cache_row)
                    {
                        raw.hash = vh.hash;
                        raw.len = vh.len;
                        self.cache
                            .set_prev_text(cache_row, content_trim.to_string());
                    }
                    repainted += 1;
                    self.last_repaint_lines.push(line_idx);
                }
            }
        }

        if let Some(span) =
            self.compute_cursor_span(state, view, viewport_first, viewport_last_excl)
            && span.start_col < w
        {
            writer.move_to(span.start_col, (span.line - viewport_first) as u16);
            self.print_cursor_with_fallback(&mut writer, state, view);
        }
        // Paint overlay (always repaint) then status line.
        paint_overlay_rows_batch(&mut writer, state, w, h);
        self.maybe_apply_external_status_line(&mut writer, status_line, h);

        let (print_cmds, cells) = writer.flush()?;
        self.metrics
            .dirty_lines_repainted
            .fetch_add(repainted, Relaxed);
        let dur = start_time.elapsed().as_nanos() as u64;
        self.metrics.last_partial_render_ns.store(dur, Relaxed);
        self.metrics.print_commands.fetch_add(print_cmds, Relaxed);
        self.metrics.cells_printed.fetch_add(cells, Relaxed);
        self.cache.last_cursor_line = Some(curr_cursor);
        Ok(())
    }

    /// Phase 4 Step 10: scroll-region shift partial path. Assumes scheduler has
    /// already gated on small delta (<= SCROLL_SHIFT_MAX). We perform a terminal
    /// scroll (up/down) and repaint only the newly exposed lines plus the cursor line.
    /// If cache is invalid (viewport start/width mismatch) we fallback to full.
    #[allow(clippy::too_many_arguments)]
    pub fn render_scroll_shift(
        &mut self,
        state: &EditorState,
        view: &View,
        _layout: &Layout,
        w: u16,
        h: u16,
        old_first: usize,
        new_first: usize,
        status_line: &str,
    ) -> Result<()> {
        use std::sync::atomic::Ordering::Relaxed;
        if h == 0 || w == 0 {
            return Ok(());
        }
        // Preconditions: small delta & capability; scheduler should have enforced size threshold.
        let delta: i32 = new_first as i32 - old_first as i32;
        if delta == 0 {
            return Ok(()); // nothing to do
        }
        let overlay_lines = overlay_line_count(state, w);
        let text_height = h.saturating_sub(1 + overlay_lines); // reserve overlay + status
        let visible_rows = text_height as usize;
        if delta.unsigned_abs() as usize >= visible_rows {
            // Degenerate (shift exceeds or equals viewport) => full frame simpler.
            self.metrics
                .scroll_shift_degraded_full
                .fetch_add(1, Relaxed);
            return self.render_full(state, view, _layout, w, h, status_line);
        }

        // If cache is cold or mismatched (different width / start), fallback to full (safety first).
        if self.cache.width != w
            || self.cache.viewport_start != old_first
            || self.cache.line_hashes.len() != visible_rows
        {
            self.metrics
                .scroll_shift_degraded_full
                .fetch_add(1, Relaxed);
            return self.render_full(state, view, _layout, w, h, status_line);
        }
        if !self.capabilities.supports_scroll_region {
            self.metrics
                .scroll_shift_degraded_full
                .fetch_add(1, Relaxed);
            return self.render_full(state, view, _layout, w, h, status_line);
        }

        let start_time = std::time::Instant::now();
        self.last_repaint_lines.clear();
        self.last_repaint_kind = Some("scroll_shift");

        let mut writer = BatchWriter::new();
        // 1. Set scroll region to text area (1-indexed rows in ANSI: top=1 bottom=text_height)
        // Reset at end to entire screen (CSI r).
        writer.print(format!("\x1b[1;{}r", text_height));

        // 2. Emit scroll within region (S scrolls up, T scrolls down) based on delta.
        if delta > 0 {
            // viewport moved down => content moves up => scroll up
            writer.print(format!("\x1b[{}S", delta));
        } else {
            // delta < 0 viewport moved up => content moves down => scroll down
            let amt = -delta;
            writer.print(format!("\x1b[{}T", amt));
        }

        let buf = state.active_buffer();
        let entering_count = delta.unsigned_abs() as usize;
        let new_viewport_first = new_first;
        // Track how many lines we explicitly repaint (entering + potential old cursor line)
        let mut repainted_lines_count = entering_count;

        // 3. Repaint entering lines only (bottom segment for scroll down, top segment for scroll up).
        if delta > 0 {
            // New lines appended at bottom.
            for i in 0..entering_count {
                let row = visible_rows - entering_count + i; // viewport row index
                let buf_line = new_viewport_first + row; // buffer line index
                writer.move_to(0, row as u16);
                writer.clear_line(0, row as u16);
                if let Some(raw_line) = buf.line(buf_line) {
                    let content_trim: &str = if raw_line.ends_with(['\n', '\r']) {
                        &raw_line[..raw_line.len() - 1]
                    } else {
                        raw_line.as_str()
                    };
                    Self::paint_content_trim(&mut writer, content_trim, w);
                    if row < self.cache.prev_text.len() {
                        self.cache.set_prev_text(row, content_trim.to_string());
                    }
                }
                self.last_repaint_lines.push(buf_line);
            }
        } else {
            // delta < 0
            let absd = (-delta) as usize;
            for i in 0..absd {
                // repaint top entering lines
                let row = i; // viewport row index
                let buf_line = new_viewport_first + row;
                writer.move_to(0, row as u16);
                writer.clear_line(0, row as u16);
                if let Some(raw_line) = buf.line(buf_line) {
                    let content_trim: &str = if raw_line.ends_with(['\n', '\r']) {
                        &raw_line[..raw_line.len() - 1]
                    } else {
                        raw_line.as_str()
                    };
                    Self::paint_content_trim(&mut writer, content_trim, w);
                    if row < self.cache.prev_text.len() {
                        self.cache.set_prev_text(row, content_trim.to_string());
                    }
                }
                self.last_repaint_lines.push(buf_line);
            }
        }

        // 3b. Repaint old cursor line (if it remains visible and differs from current cursor line)
        // to clear stale reverse-video styling left by previous frame. All other partial paths
        // repaint the old cursor line first; scroll shift must do the same for invariant parity.
        let old_cursor_opt = self.cache.last_cursor_line;
        let cursor_line = view.cursor.line; // (moved earlier from later overlay section)
        if let Some(old_cursor) = old_cursor_opt
            && old_cursor != cursor_line
            && old_cursor >= new_viewport_first
            && old_cursor < new_viewport_first + visible_rows
            && !self.last_repaint_lines.contains(&old_cursor)
        {
            // Repaint full line content (without cursor styling yet) to erase old cursor highlight.
            let rel_y = (old_cursor - new_viewport_first) as u16;
            writer.move_to(0, rel_y);
            writer.clear_line(0, rel_y);
            if let Some(raw_line) = buf.line(old_cursor) {
                let content_trim: &str = if raw_line.ends_with(['\n', '\r']) {
                    &raw_line[..raw_line.len() - 1]
                } else {
                    raw_line.as_str()
                };
                Self::paint_content_trim(&mut writer, content_trim, w);
                let rel_row = old_cursor - new_viewport_first;
                if rel_row < self.cache.prev_text.len() {
                    self.cache.set_prev_text(rel_row, content_trim.to_string());
                }
            }
            self.last_repaint_lines.push(old_cursor);
            repainted_lines_count += 1;
        }

        // 4. Cursor overlay (always ensure current cursor cluster styled on top of scrolled content).
        if let Some(span) = self.compute_cursor_span(
            state,
            view,
            new_viewport_first,
            new_viewport_first + visible_rows,
        ) && span.start_col < w
        {
            writer.move_to(span.start_col, (span.line - new_viewport_first) as u16);
            self.print_cursor_with_fallback(&mut writer, state, view);
        }

        // 5. Status line repaint (cursor column, dirty flag, etc.) with skip logic.
        writer.print("\x1b[r");
        paint_overlay_rows_batch(&mut writer, state, w, h);
        self.maybe_apply_external_status_line(&mut writer, status_line, h);

        let (print_cmds, cells) = writer.flush()?;

        // 6. Metrics & cache updates.
        self.metrics.partial_frames.fetch_add(1, Relaxed);
        self.metrics.scroll_region_shifts.fetch_add(1, Relaxed);
        let lines_saved = (visible_rows - repainted_lines_count) as u64;
        self.metrics
            .scroll_region_lines_saved
            .fetch_add(lines_saved, Relaxed);
        self.metrics
            .dirty_lines_repainted
            .fetch_add(repainted_lines_count as u64, Relaxed);
        let dur = start_time.elapsed().as_nanos() as u64;
        self.metrics.last_partial_render_ns.store(dur, Relaxed);
        self.metrics.print_commands.fetch_add(print_cmds, Relaxed);
        self.metrics.cells_printed.fetch_add(cells, Relaxed);

        // Shift & update cache via dedicated API (Phase 4 Step 11 abstraction).
        self.cache
            .shift_for_scroll(delta, new_viewport_first, visible_rows, |idx| buf.line(idx));
        self.cache.last_cursor_line = Some(cursor_line);
        Ok(())
    }

    pub fn test_last_repaint_lines(&self) -> &[usize] {
        &self.last_repaint_lines
    }
    pub fn test_last_repaint_kind(&self) -> Option<&'static str> {
        self.last_repaint_kind
    }

    /// Phase 4 Step 11 test hook: expose current cache line hashes (immutable) for
    /// verifying shift-for-scroll reuse and recompute behavior.
    pub fn test_cache_hashes(&self) -> &[crate::partial_cache::ViewportLineHash] {
        &self.cache.line_hashes
    }

    /// Phase 4 Step 11 test hook: expose viewport_start for cache parity assertions.
    pub fn test_cache_viewport_start(&self) -> usize {
        self.cache.viewport_start
    }

    /// Phase 4 Step 12 test hook: expose previously painted text for a relative row.
    pub fn test_prev_text(&self, rel_row: usize) -> Option<&str> {
        self.cache.prev_text.get(rel_row).and_then(|o| o.as_deref())
    }

    /// Access a snapshot of current metrics (for tests and future status integration).
    pub fn metrics_snapshot(&self) -> RenderPathMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Expose last cursor line cached (Phase 3 Step 4 test hook).
    pub fn last_cursor_line(&self) -> Option<usize> {
        self.cache.last_cursor_line
    }

    // Step 9: single source of truth for cursor style span.
    fn compute_cursor_span(
        &self,
        state: &EditorState,
        view: &View,
        viewport_start: usize,
        viewport_end_excl: usize,
    ) -> Option<StyleSpan> {
        let buf = state.active_buffer();
        if view.cursor.line < viewport_start
            || view.cursor.line >= viewport_end_excl
            || view.cursor.line >= buf.line_count()
        {
            return None;
        }
        let line_content = buf.line(view.cursor.line)?;
        let content_trim: &str = if line_content.ends_with(['\n', '\r']) {
            &line_content[..line_content.len() - 1]
        } else {
            line_content.as_str()
        };
        let vis_col = grapheme::visual_col(content_trim, view.cursor.byte) as u16;
        let next_byte = core_text::grapheme::next_boundary(content_trim, view.cursor.byte);
        let cluster = &content_trim[view.cursor.byte..next_byte];
        let width = grapheme::cluster_width(cluster).max(1) as u16;
        Some(StyleSpan {
            line: view.cursor.line,
            start_col: vis_col,
            end_col: vis_col + width,
            attr: StyleAttr::InvertCursor,
        })
    }

    // Phase 4 Step 16: helper to emit a trimmed line's content to the BatchWriter.
    // Mirrors logic previously duplicated across partial paths (cursor-only, lines, scroll).
    fn paint_content_trim(writer: &mut BatchWriter, content_trim: &str, w: u16) {
        let mut byte = 0usize;
        let mut vis_col: u16 = 0;
        while byte < content_trim.len() && vis_col < w {
            let next = grapheme::next_boundary(content_trim, byte);
            let cluster = &content_trim[byte..next];
            let width = grapheme::cluster_width(cluster).max(1) as u16;
            // Cluster-aware parity: emit the full cluster exactly once. Wide clusters
            // occupy multiple terminal columns intrinsically; no synthetic space padding.
            writer.print(cluster.to_string());
            vis_col += width;
            byte = next;
        }
    }

    /// Print cursor cluster with fallback reversed space when cluster slice is empty.
    fn print_cursor_with_fallback(
        &self,
        writer: &mut BatchWriter,
        state: &EditorState,
        view: &View,
    ) {
        let buf = state.active_buffer();
        if let Some(line) = buf.line(view.cursor.line) {
            let content_trim: &str = if line.ends_with(['\n', '\r']) {
                &line[..line.len() - 1]
            } else {
                line.as_str()
            };
            let cursor_byte = view.cursor.byte.min(content_trim.len());
            let next = grapheme::next_boundary(content_trim, cursor_byte);
            let cluster = &content_trim[cursor_byte..next];
            let printable = if cluster.is_empty() { " " } else { cluster };
            writer.print(format!("\x1b[7m{printable}\x1b[0m"));
        } else {
            writer.print("\x1b[7m \x1b[0m");
        }
    }

    // Removed overlay_cursor_cluster: partial paths now use compute_cursor_span for parity.

    // Unified external status application (replaces internal build+maybe_repaint_status)
    fn maybe_apply_external_status_line(
        &mut self,
        writer: &mut BatchWriter,
        status_line: &str,
        h: u16,
    ) {
        if h == 0 {
            return;
        }
        let status_y = h - 1;
        if status_line != self.prev_status {
            writer.move_to(0, status_y);
            writer.clear_line(0, status_y);
            writer.print(status_line.to_string());
            self.prev_status = status_line.to_string();
        } else {
            use std::sync::atomic::Ordering::Relaxed;
            self.metrics.status_skipped.fetch_add(1, Relaxed);
        }
    }

    /// Full-frame translation using Writer (originally introduced in Step 6 as a
    /// temporary bridge). Legacy `Renderer` removed in Refactor R3 Step 12; this now
    /// serves as the canonical full-frame emission path (until scroll-region +
    /// diff optimizations arrive). Behavior remains stable and parity-tested.
    fn render_via_writer(&self, frame: &Frame) -> Result<(u64, u64)> {
        // Cluster-aware emission (Unicode Cluster Refactor Step 4): iterate only
        // leader cells per row (skipping continuation cells) and emit each full
        // grapheme cluster exactly once. Any styling (e.g., REVERSE cursor span)
        // is applied to the leader; continuation cells inherit flags during
        // overlay application so no separate emission required.
        //
        // NOTE: We do not emit extra spaces for wide clusters here; terminal
        // width semantics handle multi-column glyphs directly. Partial writer
        // helpers (paint_content_trim) still pad wide clusters with spaces for
        // now; that will be reconciled in the subsequent "Adjust partial paths"
        // step to unify behavior.
        let mut writer = BatchWriter::new();
        for y in 0..frame.height {
            writer.move_to(0, y);
            for (cluster, _w, flags, _x) in frame.row_leaders(y) {
                if flags.contains(CellFlags::REVERSE) {
                    writer.print(format!("\x1b[7m{cluster}\x1b[0m"));
                } else {
                    writer.print(cluster.to_string());
                }
            }
        }
        writer.flush()
    }
}

/// Test-only helper: build full frame (content + cursor + status) without emitting to terminal.
/// Build a full frame (content + cursor + status) for parity verification & tests.
pub fn build_full_frame_for_test(state: &EditorState, view: &View, w: u16, h: u16) -> Frame {
    let eng = RenderEngine::new();
    let mut frame = build_content_frame(state, view, w, h);
    let viewport_start = view.viewport_first_line;
    let viewport_end_excl = viewport_start + h.saturating_sub(1) as usize;
    if let Some(span) = eng.compute_cursor_span(state, view, viewport_start, viewport_end_excl)
        && span.start_col < w
    {
        let rel_y = (span.line - viewport_start) as u16;
        frame.apply_flags_span(
            span.start_col,
            rel_y,
            span.width(),
            CellFlags::REVERSE | CellFlags::CURSOR,
        );
    }
    apply_status_line(state, view, &mut frame, w, h);
    frame
}

/// Build only the content (text lines) portion of the frame; no cursor or status decorations.
pub fn build_content_frame(state: &EditorState, view: &View, w: u16, h: u16) -> Frame {
    let mut frame = Frame::new(w, h);
    let text_height = if h > 0 { h - 1 } else { 0 };
    let buf = state.active_buffer();
    let start = view.viewport_first_line;
    let height = text_height as usize;
    let end = (start + height).min(buf.line_count());
    for (screen_y, line_idx) in (start..end).enumerate() {
        if (screen_y as u16) >= text_height {
            break;
        }
        if let Some(line) = buf.line(line_idx) {
            let content_trim: &str = if line.ends_with('\n') || line.ends_with('\r') {
                &line[..line.len() - 1]
            } else {
                &line
            };
            let mut byte = 0usize;
            let mut vis_col: u16 = 0;
            while byte < content_trim.len() && vis_col < w {
                let next = core_text::grapheme::next_boundary(content_trim, byte);
                let cluster = &content_trim[byte..next];
                let width = grapheme::cluster_width(cluster).max(1) as u16;
                frame.set_cluster(vis_col, screen_y as u16, cluster, width, CellFlags::empty());
                vis_col = vis_col.saturating_add(width);
                byte = next;
            }
        }
    }
    frame
}

fn apply_status_line(state: &EditorState, view: &View, frame: &mut Frame, w: u16, h: u16) {
    if h == 0 {
        return;
    }
    let y = h - 1;
    let buf = state.active_buffer();
    let line_content = buf.line(view.cursor.line).unwrap_or_default();
    let content_trim: &str = if line_content.ends_with("\r\n") {
        &line_content[..line_content.len() - 2]
    } else if line_content.ends_with('\n') || line_content.ends_with('\r') {
        &line_content[..line_content.len() - 1]
    } else {
        &line_content
    };
    let col = grapheme::visual_col(content_trim, view.cursor.byte);
    let status = crate::status::build_status(&crate::status::StatusContext {
        mode: state.mode,
        line: view.cursor.line,
        col,
        command_active: state.command_line.is_active(),
        command_buffer: state.command_line.buffer(),
        file_name: state.file_name.as_deref(),
        dirty: state.dirty,
    });
    for (i, ch) in status.chars().enumerate() {
        if (i as u16) < w {
            let s = ch.to_string();
            frame.set_cluster(i as u16, y, &s, 1, CellFlags::empty());
        }
    }
    if !state.command_line.is_active()
        && let Some(msg) = &state.ephemeral_status
    {
        let text = &msg.text;
        let msg_len = text.chars().count() as u16;
        if msg_len < w {
            let start_col = w - msg_len;
            for (i, ch) in text.chars().enumerate() {
                let col2 = start_col + i as u16;
                if col2 < w {
                    let s = ch.to_string();
                    frame.set_cluster(col2, y, &s, 1, CellFlags::empty());
                }
            }
        }
    }
}

// Step 10 (in-progress): external status line builder (will replace internal usage paths).
pub fn build_status_line(state: &EditorState, view: &View) -> String {
    let buf = state.active_buffer();
    let line_content = buf.line(view.cursor.line).unwrap_or_default();
    let content_trim: &str = if line_content.ends_with("\r\n") {
        &line_content[..line_content.len() - 2]
    } else if line_content.ends_with(['\n', '\r']) {
        &line_content[..line_content.len() - 1]
    } else {
        &line_content
    };
    let col = grapheme::visual_col(content_trim, view.cursor.byte);
    crate::status::build_status(&crate::status::StatusContext {
        mode: state.mode,
        line: view.cursor.line,
        col,
        command_active: state.command_line.is_active(),
        command_buffer: state.command_line.buffer(),
        file_name: state.file_name.as_deref(),
        dirty: state.dirty,
    })
}

pub fn build_status_line_with_ephemeral(state: &EditorState, view: &View, width: u16) -> String {
    // Base status using existing builder (mode, file, position, command buffer).
    let mut base = build_status_line(state, view);
    // If command line active, suppress ephemeral (legacy behavior) to avoid overlap.
    if state.command_line.is_active() {
        return base;
    }
    if let Some(msg) = &state.ephemeral_status {
        let eph = msg.text.as_str();
        let base_len = base.chars().count() as u16; // status is ASCII today; still count chars.
        let eph_len = eph.chars().count() as u16;
        if width > 0 && eph_len < width {
            // Fit rule: base + at least one space + eph must fit within width.
            if base_len + 1 + eph_len <= width {
                // Right-align: position eph so its last char is at width-1.
                let start_col = width - eph_len;
                if start_col > base_len {
                    let pad = start_col - base_len;
                    base.extend(std::iter::repeat_n(' ', pad as usize));
                } else {
                    // If base already overruns alignment start, just append single space then eph (fallback).
                    base.push(' ');
                }
                base.push_str(eph);
            }
            // Else: drop eph silently (too long) matching legacy implicit behavior when space unavailable.
        }
    }
    base
}

pub fn apply_external_status_line(status: &str, frame: &mut Frame, w: u16, h: u16) {
    if h == 0 {
        return;
    }
    let y = h - 1;
    let mut byte = 0usize;
    let mut x: u16 = 0;
    while byte < status.len() && x < w {
        let next = grapheme::next_boundary(status, byte);
        let cluster = &status[byte..next];
        let width = grapheme::cluster_width(cluster).max(1) as u16;
        frame.set_cluster(x, y, cluster, width, CellFlags::empty());
        x = x.saturating_add(width);
        byte = next;
    }
}
