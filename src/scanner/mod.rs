//! Library scanning — §4.N. Stage 1 discovers candidate files under a
//! root directory; stage 2 (driven through the operation queue) extracts
//! metadata, upserts books, and flags anthology candidates.

pub mod checkpoint;
pub mod discovery;
pub mod pipeline;
pub mod release_group;

pub use checkpoint::ScanCheckpoint;
pub use discovery::discover_files;
pub use pipeline::{AiFilenameGuess, AiFilenameParser, ScanHandler};
pub use release_group::detect_release_group;
