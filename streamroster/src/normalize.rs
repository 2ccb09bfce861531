//! Display-name normalization.
//!
//! Viewer names arrive from the platforms full of decoration: emoji,
//! punctuation, fullwidth letters, zero-width junk. These functions turn a
//! raw name into the canonical forms the roster keys and renders by. All of
//! them are pure and total: garbage in yields an empty string, which the
//! roster treats as "not a displayable identity".

use unicode_normalization::UnicodeNormalization;

/// Sanitize a raw display name.
///
/// NFKC-normalizes the input, keeps Unicode letters and whitespace, maps
/// every other code point to a single space, then collapses whitespace runs
/// and trims. `"Ｊｅｎｎｙ_92 🎉"` sanitizes to `"Jenny"`.
#[must_use]
pub fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for c in raw.nfkc() {
        if c.is_alphabetic() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            out.push(c);
            pending_space = false;
        } else {
            // Whitespace and every non-letter both collapse into at most
            // one separating space.
            pending_space = true;
        }
    }
    out
}

/// Return the first whitespace-delimited token of a sanitized name, or the
/// empty string when there is none.
#[must_use]
pub fn first_word(sanitized: &str) -> &str {
    sanitized.split_whitespace().next().unwrap_or("")
}

/// Uppercase the first code point and leave the remainder untouched.
#[must_use]
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
