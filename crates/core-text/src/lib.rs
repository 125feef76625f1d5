//! The text engine: a character-indexed B+-tree (`tree`) plus the layered
//! algorithms built on it (`rune`, `segment`, `locator`, `scroll`,
//! `mutator`), and a line/byte-oriented `buffer` facade kept for the
//! pre-existing line/byte application layers.

pub mod buffer;
pub mod locator;
pub mod motion;
pub mod mutator;
pub mod rune;
pub mod scroll;
pub mod segment;
pub mod tree;
pub mod width; // unified grapheme width indirection
#[cfg(feature = "term-probe")]
pub mod width_probe; // runtime terminal probe scaffold

pub use buffer::grapheme;
pub use buffer::{Buffer, Position};
pub use width::egc_width;
