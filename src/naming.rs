//! Collection naming.
//!
//! Turns an arbitrary uploaded file name into a storage-safe collection name:
//! Unicode letters, digits, `_` and `-` only, starting and ending with a
//! letter or digit, between 3 and 63 characters.

use std::sync::OnceLock;

use regex::Regex;

/// Maximum collection name length, in characters.
pub const MAX_NAME_LEN: usize = 63;
/// Minimum collection name length, in characters.
pub const MIN_NAME_LEN: usize = 3;
/// Appended to names shorter than [`MIN_NAME_LEN`].
pub const SHORT_NAME_SUFFIX: &str = "doc";

struct Patterns {
    extension: Regex,
    duplicate_marker: Regex,
    disallowed: Regex,
    underscores: Regex,
    leading: Regex,
    trailing: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        extension: Regex::new(r"\.[^.]+$").expect("valid regex"),
        duplicate_marker: Regex::new(r"(\s*\(\d+\))+\s*$").expect("valid regex"),
        disallowed: Regex::new(r"[^\p{L}\p{N}_\-]+").expect("valid regex"),
        underscores: Regex::new(r"_{2,}").expect("valid regex"),
        leading: Regex::new(r"^[^\p{L}\p{N}]+").expect("valid regex"),
        trailing: Regex::new(r"[^\p{L}\p{N}]+$").expect("valid regex"),
    })
}

/// Derive the collection name for a document file name.
///
/// ```rust
/// use docket_rag::naming::collection_name;
///
/// assert_eq!(collection_name("My Report (2).pdf"), "My_Report");
/// ```
pub fn collection_name(file_name: &str) -> String {
    let p = patterns();

    let name = p.extension.replace(file_name, "");
    let name = p.duplicate_marker.replace(&name, "");
    let name = p.disallowed.replace_all(&name, "_");
    let name = p.underscores.replace_all(&name, "_");
    let name = p.leading.replace(&name, "");
    let mut name = p.trailing.replace(&name, "").into_owned();

    if let Some((cut, _)) = name.char_indices().nth(MAX_NAME_LEN) {
        name.truncate(cut);
        name = p.trailing.replace(&name, "").into_owned();
    }

    if name.chars().count() < MIN_NAME_LEN {
        name.push_str(SHORT_NAME_SUFFIX);
    }

    name
}
