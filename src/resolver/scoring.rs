//! Candidate scoring — §4.R.score. Deterministic: identical inputs always
//! produce identical outputs.

use std::collections::HashSet;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "that", "this", "are", "was", "were", "been", "have",
    "has", "had", "not", "but", "its", "our", "your", "their", "all", "any", "can", "will", "may",
    "into",
];

const COMPILATION_MARKERS: &[&str] = &[
    "box set",
    "boxset",
    "box-set",
    "collection",
    "complete series",
    "complete collection",
    "books set",
    "book set",
    "omnibus",
    "anthology",
    "compendium",
    "series collection",
    "series set",
];

#[derive(Debug, Clone, Default)]
pub struct CandidateMetadata {
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub narrator: Option<String>,
    pub isbn: Option<String>,
    pub series_position: Option<f64>,
}

/// Lower-cases, strips non-alphanumeric characters and stop-words, per
/// §4.R.score's "significant words" definition (length > 2).
fn significant_words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

fn contains_compilation_marker(title_lower: &str) -> bool {
    if COMPILATION_MARKERS.iter().any(|m| title_lower.contains(m)) {
        return true;
    }
    let words: Vec<&str> = title_lower.split_whitespace().collect();
    words.windows(2).any(|pair| pair[1] == "books" && pair[0].chars().all(|c| c.is_ascii_digit()))
}

/// Scores `candidate_title` against `query`. Returns 0 for an empty query
/// (never NaN, never panics) per §8.3.
pub fn score_title_match(query: &str, candidate_title: &str, metadata: &CandidateMetadata) -> f64 {
    let s = significant_words(query);
    if s.is_empty() {
        return 0.0;
    }
    let c = significant_words(candidate_title);
    if c.is_empty() {
        return 0.0;
    }

    let intersection = s.intersection(&c).count() as f64;
    let recall = intersection / s.len() as f64;
    let precision = intersection / c.len() as f64;
    let mut f1 = if recall + precision == 0.0 { 0.0 } else { 2.0 * recall * precision / (recall + precision) };

    if contains_compilation_marker(&candidate_title.to_lowercase()) {
        f1 *= 0.15;
    }

    if c.len() as f64 > 1.5 * s.len() as f64 {
        f1 *= 1.5 * s.len() as f64 / c.len() as f64;
    }

    let mut bonus: f64 = 0.0;
    if metadata.description.as_deref().is_some_and(|v| !v.is_empty()) {
        bonus += 0.05;
    }
    if metadata.cover_url.as_deref().is_some_and(|v| !v.is_empty()) {
        bonus += 0.05;
    }
    if metadata.narrator.as_deref().is_some_and(|v| !v.is_empty()) {
        bonus += 0.05;
    }
    if metadata.isbn.as_deref().is_some_and(|v| !v.is_empty()) {
        bonus += 0.05;
    }
    f1 + bonus.min(0.15)
}

/// Post-scoring filter: rejects a candidate whose advertised series position
/// contradicts the book's known position. Equal or absent is accepted.
pub fn passes_series_position_filter(book_series_sequence: Option<f64>, candidate_series_position: Option<f64>) -> bool {
    match (book_series_sequence, candidate_series_position) {
        (Some(known), Some(candidate)) => (known - candidate).abs() < f64::EPSILON,
        _ => true,
    }
}
