//! Anthology / box-set detection — §4.R.anthology.

use regex::Regex;

use crate::store::models::{AnthologyReviewStatus, Series};

const TIMEOUT_DAYS: i64 = 60;
const SECS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, PartialEq)]
pub struct AnthologySignal {
    pub name: &'static str,
    pub confidence_base: f64,
}

fn title_pattern() -> Regex {
    Regex::new(r"(?i)(complete|collection|omnibus|box\s*set|books?\s*\d+\s*-\s*\d+|trilogy|quadrilogy|saga)").unwrap()
}

/// Compares the 7-character publisher prefix of an ISBN-13 against every
/// known series' own prefix (when a series carries one via its name-derived
/// ISBN lineage). This repo has no per-series ISBN column, so the check is
/// limited to an exact 7-char prefix match against other books' ISBNs
/// supplied by the caller.
pub fn isbn_prefix_matches(book_isbn13: &str, known_prefixes: &[String]) -> bool {
    if book_isbn13.len() < 10 {
        return false;
    }
    let prefix = &book_isbn13[3..10];
    known_prefixes.iter().any(|p| p == prefix)
}

pub fn title_matches_pattern(title: &str) -> bool {
    title_pattern().is_match(title)
}

pub fn title_references_known_series(title: &str, series_list: &[Series]) -> bool {
    let title_lower = title.to_lowercase();
    series_list.iter().any(|s| s.name.len() >= 3 && title_lower.contains(&s.name.to_lowercase()))
}

/// Evaluates all three signals for one book. Returns `None` if nothing
/// fires.
pub fn detect_signals(
    title: &str,
    book_isbn13: Option<&str>,
    known_series_isbn_prefixes: &[String],
    series_list: &[Series],
    duration_sec: Option<f64>,
    series_average_duration_sec: Option<f64>,
) -> Option<(AnthologyReviewStatus, Vec<AnthologySignal>)> {
    let mut signals = Vec::new();
    let mut high_confidence = false;

    if let Some(isbn) = book_isbn13 {
        if isbn_prefix_matches(isbn, known_series_isbn_prefixes) {
            signals.push(AnthologySignal { name: "isbn_prefix_match", confidence_base: 0.95 });
            high_confidence = true;
        }
    }

    if title_matches_pattern(title) {
        let references_series = title_references_known_series(title, series_list);
        signals.push(AnthologySignal { name: "title_pattern", confidence_base: 0.60 });
        if references_series {
            high_confidence = true;
        }
    }

    if let (Some(duration), Some(avg)) = (duration_sec, series_average_duration_sec) {
        if avg > 0.0 && duration >= 2.0 * avg {
            signals.push(AnthologySignal { name: "duration_threshold", confidence_base: 0.50 });
        }
    }

    if signals.is_empty() {
        return None;
    }

    let status = if high_confidence {
        AnthologyReviewStatus::PendingHighConfidence
    } else {
        AnthologyReviewStatus::PendingNeedsReview
    };
    Some((status, signals))
}

pub fn times_out_at(created_at: i64) -> i64 {
    created_at + TIMEOUT_DAYS * SECS_PER_DAY
}

/// Combines a signal's base confidence with bonuses, clamped to [0,1].
pub fn combined_confidence(base: f64, same_series: bool, same_author: bool, shared_isbn_prefix: bool) -> f64 {
    let mut score = base;
    if same_series {
        score += 0.15;
    }
    if same_author {
        score += 0.10;
    }
    if shared_isbn_prefix {
        score += 0.10;
    }
    score.clamp(0.0, 1.0)
}
