//! L4: mutators and the state they transform.
//!
//! A mutator is a stateless value describing a change to [`BufferState`];
//! applying it advances the editor's state. Like [`crate::locator::Locator`]
//! the variant set is closed, so it is a tagged enum with one `apply`
//! operation rather than a trait hierarchy.

use crate::locator::Locator;
use crate::scroll;
use crate::tree::Tree;
use crate::width::cluster_width_at;

/// `{ position: char-index, logicalOffset }`. `logical_offset` records how
/// far past a shorter line's end the cursor's horizontal intent lies,
/// preserved across vertical moves and cleared on any successful horizontal
/// move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    pub position: u64,
    pub logical_offset: u64,
}

/// `{ textOrigin, width, height }`. `text_origin` is always the character
/// index of the start of a wrapped line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct View {
    pub text_origin: u64,
    pub width: u16,
    pub height: u16,
}

/// Display and scroll configuration recognized by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub tab_width: u16,
    pub scroll_margin: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tab_width: 4,
            scroll_margin: scroll::DEFAULT_SCROLL_MARGIN,
        }
    }
}

impl Config {
    fn width_fn(&self) -> impl FnMut(&str, u16) -> u16 + '_ {
        move |g: &str, col: u16| cluster_width_at(g, col as usize, self.tab_width as usize)
    }
}

/// `{ tree, cursor, view }`. Owns its tree; lifetime spans from document
/// load to document close.
pub struct BufferState {
    pub tree: Tree,
    pub cursor: Cursor,
    pub view: View,
}

impl BufferState {
    pub fn new(tree: Tree, width: u16, height: u16) -> Self {
        BufferState {
            tree,
            cursor: Cursor::default(),
            view: View {
                text_origin: 0,
                width,
                height,
            },
        }
    }
}

/// A stateless description of a change to [`BufferState`]. Composable: a
/// sequence of mutators executes in order.
#[derive(Debug, Clone)]
pub enum Mutator {
    CursorMutator(Locator),
    InsertRuneMutator(char),
    DeleteMutator(Locator),
    ScrollToCursorMutator,
    ScrollLinesMutator { forward: bool, n: u64 },
    ResizeMutator { width: u16, height: u16 },
    CompositeMutator(Vec<Mutator>),
}

impl Mutator {
    /// Apply this mutator to `state`. All-or-nothing is not guaranteed for
    /// [`Mutator::CompositeMutator`]: submutators run in order and any that
    /// fails its own internal precondition simply has no effect, but earlier
    /// submutators' effects are not rolled back.
    pub fn apply(&self, state: &mut BufferState, config: &Config) {
        match self {
            Mutator::CursorMutator(locator) => {
                state.cursor = locator.locate(state);
            }
            Mutator::InsertRuneMutator(r) => {
                if state.tree.insert(state.cursor.position, *r).is_ok() {
                    state.cursor.position += 1;
                    state.cursor.logical_offset = 0;
                }
            }
            Mutator::DeleteMutator(locator) => {
                let other = locator.locate(state);
                let (lo, hi) = if state.cursor.position <= other.position {
                    (state.cursor.position, other.position)
                } else {
                    (other.position, state.cursor.position)
                };
                for _ in lo..hi {
                    state.tree.delete(lo);
                }
                state.cursor = Cursor {
                    position: lo,
                    logical_offset: 0,
                };
            }
            Mutator::ScrollToCursorMutator => {
                state.view.text_origin = scroll::scroll(
                    &state.tree,
                    state.view.text_origin,
                    state.view.width,
                    state.view.height,
                    state.cursor.position,
                    config.scroll_margin,
                    config.width_fn(),
                );
            }
            Mutator::ScrollLinesMutator { forward, n } => {
                state.view.text_origin = scroll::scroll_lines(
                    &state.tree,
                    state.view.text_origin,
                    state.view.width,
                    state.view.height,
                    *forward,
                    *n,
                    config.width_fn(),
                );
            }
            Mutator::ResizeMutator { width, height } => {
                state.view.width = *width;
                state.view.height = *height;
                state.view.text_origin = scroll::scroll(
                    &state.tree,
                    state.view.text_origin,
                    state.view.width,
                    state.view.height,
                    state.cursor.position,
                    config.scroll_margin,
                    config.width_fn(),
                );
            }
            Mutator::CompositeMutator(mutators) => {
                for m in mutators {
                    m.apply(state, config);
                }
            }
        }
    }
}
