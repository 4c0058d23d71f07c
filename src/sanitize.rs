#![forbid(unsafe_code)]

//! Turns arbitrary titles into names that are safe to use as file stems.

/// Keeps word characters (letters, digits, `_`) and whitespace, then trims
/// both ends. Total: a title made only of punctuation becomes `""`.
pub fn sanitize_title(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();
    kept.trim().to_string()
}
