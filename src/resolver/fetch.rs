//! Fetch cascade — §4.R.fetch. Tries sources in configured order, scoring
//! every candidate, stopping at the first one that clears the threshold.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use super::circuit_breaker::CircuitBreaker;
use super::scoring::{passes_series_position_filter, score_title_match};
use super::sources::{Candidate, MetadataSource, SourceError};

pub const SCORE_THRESHOLD: f64 = 0.35;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no metadata found for '{title}' by '{author}' — tried: title, title+author, author-only")]
    NoMatch { title: String, author: String },
}

fn cleaned_title(title: &str) -> String {
    title.split(':').next().unwrap_or(title).trim().to_string()
}

/// One cascade step: a query title plus an optional author to pair with it.
enum Step<'a> {
    Title(&'a str),
    TitleAndAuthor(&'a str, &'a str),
    Author(&'a str),
}

async fn run_step(
    sources: &[Arc<dyn MetadataSource>],
    breakers: &HashMap<String, Arc<CircuitBreaker>>,
    step: &Step<'_>,
    query_for_scoring: &str,
    series_sequence: Option<f64>,
) -> Option<(Candidate, f64)> {
    let mut best: Option<(Candidate, f64)> = None;

    for source in sources {
        let breaker = breakers.get(source.name()).cloned();
        if let Some(breaker) = &breaker {
            if breaker.check().await.is_err() {
                continue;
            }
        }

        let result = match step {
            Step::Title(t) => source.search_by_title(t).await,
            Step::TitleAndAuthor(t, a) => source.search_by_title_and_author(t, a).await,
            Step::Author(a) => source.search_by_author(a).await,
        };

        let candidates = match result {
            Ok(candidates) => {
                if let Some(breaker) = &breaker {
                    breaker.record_success().await;
                }
                candidates
            }
            Err(SourceError::Transient { .. }) => {
                if let Some(breaker) = &breaker {
                    breaker.record_failure().await;
                }
                continue;
            }
            Err(SourceError::Permanent { source_name, message }) => {
                warn!(source_name, message, "permanent error from metadata source, skipping");
                continue;
            }
        };

        for candidate in candidates {
            if !passes_series_position_filter(series_sequence, candidate.series_position) {
                continue;
            }
            let score = score_title_match(query_for_scoring, &candidate.title, &candidate.metadata());
            let is_better = match &best {
                Some((_, best_score)) => score > *best_score,
                None => true,
            };
            if is_better {
                best = Some((candidate, score));
            }
        }
    }

    best
}

/// Runs the full cascade and returns the first candidate clearing
/// [`SCORE_THRESHOLD`], or [`FetchError::NoMatch`] if every step and source
/// is exhausted.
pub async fn fetch_best_candidate(
    sources: &[Arc<dyn MetadataSource>],
    breakers: &HashMap<String, Arc<CircuitBreaker>>,
    raw_title: &str,
    author: Option<&str>,
    series_sequence: Option<f64>,
) -> Result<(Candidate, f64), FetchError> {
    let cleaned = cleaned_title(raw_title);

    let mut steps: Vec<Step> = vec![Step::Title(&cleaned)];
    if cleaned != raw_title {
        steps.push(Step::Title(raw_title));
    }
    if let Some(author) = author {
        steps.push(Step::TitleAndAuthor(&cleaned, author));
        steps.push(Step::TitleAndAuthor(raw_title, author));
        steps.push(Step::Author(author));
    }

    for step in &steps {
        let query = match step {
            Step::Title(t) => t,
            Step::TitleAndAuthor(t, _) => t,
            Step::Author(a) => a,
        };
        if let Some((candidate, score)) = run_step(sources, breakers, step, query, series_sequence).await {
            if score >= SCORE_THRESHOLD {
                return Ok((candidate, score));
            }
        }
    }

    Err(FetchError::NoMatch { title: raw_title.to_string(), author: author.unwrap_or("").to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StubSource {
        name: &'static str,
        candidates: Vec<Candidate>,
    }

    #[async_trait]
    impl MetadataSource for StubSource {
        fn name(&self) -> &str {
            self.name
        }
        async fn search_by_title(&self, _title: &str) -> Result<Vec<Candidate>, SourceError> {
            Ok(self.candidates.clone())
        }
        async fn search_by_title_and_author(&self, _title: &str, _author: &str) -> Result<Vec<Candidate>, SourceError> {
            Ok(self.candidates.clone())
        }
        async fn search_by_author(&self, _author: &str) -> Result<Vec<Candidate>, SourceError> {
            Ok(self.candidates.clone())
        }
    }

    fn candidate(title: &str) -> Candidate {
        Candidate {
            source: "stub".to_string(),
            title: title.to_string(),
            author: None,
            narrator: None,
            publisher: None,
            language: None,
            isbn10: None,
            isbn13: None,
            audiobook_release_year: None,
            print_year: None,
            cover_url: None,
            description: None,
            series_name: None,
            series_position: None,
        }
    }

    #[tokio::test]
    async fn picks_the_qualifying_candidate_and_rejects_box_sets() {
        let source: Arc<dyn MetadataSource> = Arc::new(StubSource {
            name: "stub",
            candidates: vec![
                candidate("The Long Earth Series 5 Books Collection Box Set"),
                candidate("The Long Cosmos"),
            ],
        });
        let sources = vec![source];
        let breakers = HashMap::new();

        let (winner, score) = fetch_best_candidate(&sources, &breakers, "The Long Cosmos", None, None).await.unwrap();
        assert_eq!(winner.title, "The Long Cosmos");
        assert!(score >= SCORE_THRESHOLD);
    }

    #[tokio::test]
    async fn no_qualifying_candidate_returns_no_match() {
        let source: Arc<dyn MetadataSource> =
            Arc::new(StubSource { name: "stub", candidates: vec![candidate("Completely Unrelated Book")] });
        let sources = vec![source];
        let breakers = HashMap::new();

        let result = fetch_best_candidate(&sources, &breakers, "Project Hail Mary", None, None).await;
        assert!(matches!(result, Err(FetchError::NoMatch { .. })));
    }
}
