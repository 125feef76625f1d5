//! Generates the static grapheme-cluster width override table consulted by
//! `width::egc_width` (see its module doc for the precedence order), from
//! the `SEED` list below.

use std::env;
use std::fs;
use std::path::Path;

// Seed entries for sequences the classifier heuristic cannot derive from a
// single codepoint alone. Table must stay sorted by `seq` for the binary
// search in `width::override_width`.
const SEED: &[(&str, u16)] = &[
    ("1\u{fe0f}\u{20e3}", 2),  // keycap 1
    ("2\u{fe0f}\u{20e3}", 2),  // keycap 2
    ("\u{2708}\u{fe0f}", 2),   // airplane + VS16
    ("\u{1f1ec}\u{1f1e7}", 2), // flag: GB
    ("\u{1f1fa}\u{1f1f8}", 2), // flag: US
    ("\u{1f44d}\u{1f3fb}", 2), // thumbs up + skin tone modifier
    ("\u{1f468}\u{200d}\u{1f469}\u{200d}\u{1f467}\u{200d}\u{1f466}", 2), // family ZWJ sequence
];

fn main() {
    let out_dir = env::var("OUT_DIR").expect("OUT_DIR set by cargo");
    let dest = Path::new(&out_dir).join("generated_width_overrides.rs");
    let mut contents = String::new();
    contents.push_str("pub static OVERRIDES: &[(&str, u16)] = &[\n");
    for (seq, width) in SEED {
        contents.push_str(&format!("    ({seq:?}, {width}),\n"));
    }
    contents.push_str("];\n");
    contents.push_str(&format!("pub const OVERRIDES_COUNT: usize = {};\n", SEED.len()));
    fs::write(&dest, contents).expect("write generated_width_overrides.rs");
    println!("cargo:rerun-if-changed=build.rs");
}
