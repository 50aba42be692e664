//! Release-group detection from filenames — §4.N stage 2 step 6.
//!
//! Priority chain: `[brackets]` tags win over `{braces}` tags, which win
//! over a trailing `-word` suffix. A trailing suffix made entirely of
//! digits is never treated as a release group (track numbers, years).

use regex::Regex;

fn brackets_re() -> Regex {
    Regex::new(r"\[([^\[\]]+)\]").unwrap()
}

fn braces_re() -> Regex {
    Regex::new(r"\{([^{}]+)\}").unwrap()
}

fn trailing_word_re() -> Regex {
    Regex::new(r"-([A-Za-z][A-Za-z0-9]*)$").unwrap()
}

/// `filename` should be the file stem (no directory, no extension).
pub fn detect_release_group(filename: &str) -> Option<String> {
    if let Some(caps) = brackets_re().captures(filename) {
        return Some(caps[1].trim().to_string());
    }
    if let Some(caps) = braces_re().captures(filename) {
        return Some(caps[1].trim().to_string());
    }
    if let Some(caps) = trailing_word_re().captures(filename) {
        let candidate = &caps[1];
        if !candidate.chars().all(|c| c.is_ascii_digit()) {
            return Some(candidate.to_string());
        }
    }
    None
}
