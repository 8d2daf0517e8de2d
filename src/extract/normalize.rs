//! Whitespace canonicalization applied before the document-wide patterns run.

/// Canonicalize line endings and blanks.
///
/// `\r\n` and lone `\r` become `\n`, tabs become a single space, then one
/// left-to-right pass folds each `"  "` into `" "`. The fold is deliberately
/// not repeated: runs of three or more blanks survive as shorter runs.
pub fn normalize(raw: &str) -> String {
    raw.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\t', " ")
        .replace("  ", " ")
}
