//! Path normalization for source identity.
//!
//! Compiled output attributes lines to files using whatever spelling the
//! compiler happened to emit: backslashes on Windows, drive letters in either
//! case, mixed case on case-insensitive filesystems. A location must compare
//! equal to another whenever both name the same physical line, so every path
//! is folded into one canonical spelling before it participates in equality
//! or hashing.

/// Fold a path into its canonical spelling: separators become `/` and the
/// whole path is lowercased.
///
/// The folded form is only ever compared against other folded forms; it is
/// never handed back to the filesystem.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/").to_lowercase()
}
