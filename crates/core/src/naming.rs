//! Identifier naming rules for workflow inputs and outputs.
//!
//! Node titles are free text in the ComfyUI editor. The names exposed to
//! callers must be bare identifiers, so titles are either accepted as-is or
//! normalized into a lowercase snake_case slug.

use std::sync::LazyLock;

use regex::Regex;

static NON_IDENT_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_]").expect("static regex"));

static UNDERSCORE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_+").expect("static regex"));

/// Whether `s` is a valid bare identifier.
///
/// The first character must be a letter or `_`, the rest letters, digits
/// or `_`. Non-ASCII letters are accepted.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric())
}

/// Normalize arbitrary text into a lowercase identifier slug.
///
/// Convention:
///
/// - every character outside `[A-Za-z0-9_]` becomes `_`
/// - a leading digit is prefixed with `_`
/// - runs of `_` collapse into one, then leading/trailing `_` are stripped
/// - an empty result becomes `"_"`
///
/// # Examples
///
/// ```
/// use cpack_core::naming::normalize_to_identifier;
///
/// assert_eq!(normalize_to_identifier("Positive Prompt"), "positive_prompt");
/// assert_eq!(normalize_to_identifier("3D view"), "3d_view");
/// assert_eq!(normalize_to_identifier("!!!"), "_");
/// ```
pub fn normalize_to_identifier(s: &str) -> String {
    if s.is_empty() {
        return "_".to_string();
    }

    let mut slug = NON_IDENT_CHARS.replace_all(s, "_").into_owned();

    if slug.starts_with(|c: char| c.is_ascii_digit()) {
        slug.insert(0, '_');
    }

    let slug = UNDERSCORE_RUNS.replace_all(&slug, "_");
    let slug = slug.trim_matches('_');

    if slug.is_empty() {
        "_".to_string()
    } else {
        slug.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- is_identifier ---------------------------------------------------------

    #[test]
    fn plain_names_are_identifiers() {
        assert!(is_identifier("prompt"));
        assert!(is_identifier("_seed"));
        assert!(is_identifier("Image2"));
        assert!(is_identifier("größe"));
    }

    #[test]
    fn titles_with_spaces_or_leading_digits_are_not_identifiers() {
        assert!(!is_identifier(""));
        assert!(!is_identifier("Load Image"));
        assert!(!is_identifier("2nd"));
        assert!(!is_identifier("a-b"));
    }

    // -- normalize_to_identifier -----------------------------------------------

    #[test]
    fn spaces_become_underscores_and_case_is_lowered() {
        assert_eq!(normalize_to_identifier("Load Image"), "load_image");
    }

    #[test]
    fn leading_digit_is_prefixed_then_stripped() {
        // The `_` prefix is added before stripping, so it does not survive.
        assert_eq!(normalize_to_identifier("2nd pass"), "2nd_pass");
    }

    #[test]
    fn underscore_runs_collapse() {
        assert_eq!(normalize_to_identifier("a -- b"), "a_b");
    }

    #[test]
    fn empty_and_symbol_only_inputs_become_underscore() {
        assert_eq!(normalize_to_identifier(""), "_");
        assert_eq!(normalize_to_identifier("()"), "_");
    }

    #[test]
    fn non_ascii_letters_are_replaced() {
        assert_eq!(normalize_to_identifier("Größe"), "gr_e");
    }
}
