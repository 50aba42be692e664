//! External metadata source trait — §4.R.fetch.

use async_trait::async_trait;
use thiserror::Error;

use super::scoring::CandidateMetadata;

#[derive(Debug, Clone)]
pub struct Candidate {
    pub source: String,
    pub title: String,
    pub author: Option<String>,
    pub narrator: Option<String>,
    pub publisher: Option<String>,
    pub language: Option<String>,
    pub isbn10: Option<String>,
    pub isbn13: Option<String>,
    pub audiobook_release_year: Option<i32>,
    pub print_year: Option<i32>,
    pub cover_url: Option<String>,
    pub description: Option<String>,
    pub series_name: Option<String>,
    pub series_position: Option<f64>,
}

impl Candidate {
    pub fn metadata(&self) -> CandidateMetadata {
        CandidateMetadata {
            description: self.description.clone(),
            cover_url: self.cover_url.clone(),
            narrator: self.narrator.clone(),
            isbn: self.isbn13.clone().or_else(|| self.isbn10.clone()),
            series_position: self.series_position,
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("transient error from {source_name}: {message}")]
    Transient { source_name: String, message: String },

    #[error("permanent error from {source_name}: {message}")]
    Permanent { source_name: String, message: String },
}

impl crate::error::Transience for SourceError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

#[async_trait]
pub trait MetadataSource: Send + Sync {
    fn name(&self) -> &str;
    async fn search_by_title(&self, title: &str) -> Result<Vec<Candidate>, SourceError>;
    async fn search_by_title_and_author(&self, title: &str, author: &str) -> Result<Vec<Candidate>, SourceError>;
    async fn search_by_author(&self, author: &str) -> Result<Vec<Candidate>, SourceError>;
}
