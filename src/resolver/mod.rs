//! Metadata resolver — §4.R. Fetch cascade, scoring, provenance
//! application, and anthology detection.

pub mod anthology;
pub mod apply;
pub mod circuit_breaker;
pub mod fetch;
pub mod handler;
pub mod scoring;
pub mod sources;

pub use circuit_breaker::CircuitBreaker;
pub use fetch::{fetch_best_candidate, FetchError, SCORE_THRESHOLD};
pub use handler::FetchMetadataHandler;
pub use sources::{Candidate, MetadataSource, SourceError};
