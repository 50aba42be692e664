//! Filename-fallback parsing — canonical patterns for `Author - Title`,
//! optional series, and track numbers, used when embedded tags are absent
//! or unreadable.

use std::path::Path;

use regex::Regex;

use super::NormalizedMetadata;

const SEPARATORS: &[&str] = &[" - ", "_-_", " -_ ", "_ -_", "_- "];

pub fn parse_filename(path: &Path) -> NormalizedMetadata {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");

    let (author, rest) = match parse_author_title_pattern(stem) {
        Some((author, rest)) => (Some(author), rest),
        None => (None, stem.to_string()),
    };

    let (series, title_after_series) = extract_series(&rest);
    let (track, title) = extract_leading_track(&title_after_series);

    NormalizedMetadata {
        title: Some(title).filter(|s| !s.is_empty()),
        artist: author,
        series,
        track,
        used_filename_fallback: true,
        ..Default::default()
    }
}

/// Splits `"Author - Title"` patterns, tolerant of underscore-joined
/// filenames from bulk downloads.
fn parse_author_title_pattern(filename: &str) -> Option<(String, String)> {
    for separator in SEPARATORS {
        let parts: Vec<&str> = filename.split(separator).collect();
        if parts.len() >= 2 {
            let author = parts[0].replace('_', " ").trim().to_string();
            let title = parts[1..].join(separator).replace('_', " ").trim().to_string();
            if !author.is_empty() && !title.is_empty() {
                return Some((author, title));
            }
        }
    }
    None
}

/// Extracts a trailing `"Series Name, Book N"` or leading `"[Series Name]"`
/// marker, returning the remaining title text.
fn extract_series(title: &str) -> (Option<String>, String) {
    let bracketed = Regex::new(r"^\[([^\]]+)\]\s*(.*)$").unwrap();
    if let Some(caps) = bracketed.captures(title.trim()) {
        let series = caps.get(1).unwrap().as_str().trim().to_string();
        let rest = caps.get(2).unwrap().as_str().trim().to_string();
        return (Some(series), rest);
    }

    let trailing = Regex::new(r"^(.*),\s*(.+),\s*Book\s*\d+\s*$").unwrap();
    if let Some(caps) = trailing.captures(title.trim()) {
        let rest = caps.get(1).unwrap().as_str().trim().to_string();
        let series = caps.get(2).unwrap().as_str().trim().to_string();
        return (Some(series), rest);
    }

    (None, title.trim().to_string())
}

/// Extracts a leading `"01 - "` / `"01. "` / `"01_"` track-number marker.
fn extract_leading_track(title: &str) -> (Option<u32>, String) {
    let re = Regex::new(r"^0*(\d{1,3})[\s._-]+(.*)$").unwrap();
    if let Some(caps) = re.captures(title.trim()) {
        let track = caps.get(1).unwrap().as_str().parse().ok();
        let rest = caps.get(2).unwrap().as_str().trim().to_string();
        if track.is_some() && !rest.is_empty() {
            return (track, rest);
        }
    }
    (None, title.trim().to_string())
}
