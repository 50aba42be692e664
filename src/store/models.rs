//! Entity definitions, §3.1 of the spec.

use serde::{Deserialize, Serialize};

/// Audio container format recognised by the scanner and organiser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    M4b,
    Mp3,
    Flac,
    M4a,
    Opus,
}

impl AudioFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "m4b" => Some(Self::M4b),
            "mp3" => Some(Self::Mp3),
            "flac" => Some(Self::Flac),
            "m4a" => Some(Self::M4a),
            "opus" => Some(Self::Opus),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::M4b => "m4b",
            Self::Mp3 => "mp3",
            Self::Flac => "flac",
            Self::M4a => "m4a",
            Self::Opus => "opus",
        }
    }
}

pub const SUPPORTED_EXTENSIONS: &[&str] = &["m4b", "mp3", "flac", "m4a", "opus"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryState {
    Import,
    Organized,
    NeedsReview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataReviewStatus {
    NoMatch,
    Matched,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub file_path: String,
    pub format: AudioFormat,
    pub duration_sec: Option<f64>,
    pub file_hash: Option<String>,
    pub file_size: Option<u64>,
    pub bitrate_kbps: Option<u32>,
    pub codec: Option<String>,
    pub sample_rate_hz: Option<u32>,
    pub channels: Option<u8>,
    pub author_id: Option<i64>,
    pub narrator: Option<String>,
    pub series_id: Option<i64>,
    pub series_sequence: Option<f64>,
    pub audiobook_release_year: Option<i32>,
    pub print_year: Option<i32>,
    pub isbn10: Option<String>,
    pub isbn13: Option<String>,
    pub publisher: Option<String>,
    pub language: Option<String>,
    pub cover_url: Option<String>,
    pub narrators_json: Option<String>,
    pub library_state: LibraryState,
    pub marked_for_deletion: bool,
    pub marked_for_deletion_at: Option<i64>,
    pub version_group_id: Option<String>,
    pub is_primary_version: bool,
    pub superseded_by: Option<String>,
    pub is_anthology: bool,
    pub metadata_review_status: Option<MetadataReviewStatus>,
    pub release_group: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub metadata_updated_at: Option<i64>,
    pub last_written_at: Option<i64>,
}

/// Fields whose change advances `metadata_updated_at` (§3.2, contracts in §4.S).
pub const USER_VISIBLE_FIELDS: &[&str] = &[
    "title",
    "author_id",
    "series_id",
    "series_sequence",
    "narrator",
    "publisher",
    "language",
    "audiobook_release_year",
    "print_year",
    "isbn10",
    "isbn13",
    "cover_url",
    "narrators_json",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Narrator {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorRole {
    Author,
    CoAuthor,
    Editor,
    Translator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarratorRole {
    Narrator,
    CoNarrator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAuthor {
    pub book_id: String,
    pub author_id: i64,
    pub role: AuthorRole,
    pub position: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookNarrator {
    pub book_id: String,
    pub narrator_id: i64,
    pub role: NarratorRole,
    pub position: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    pub id: i64,
    pub name: String,
    pub author_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSegment {
    pub id: String,
    pub book_numeric_id: i64,
    pub file_path: String,
    pub format: AudioFormat,
    pub size_bytes: u64,
    pub duration_sec: Option<f64>,
    pub track_number: Option<u32>,
    pub total_tracks: Option<u32>,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataSource {
    Manual,
    Fetched,
    File,
    Ai,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    UserEdit,
    Fetch,
    WriteBack,
    AiParse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataFieldState {
    pub book_id: String,
    pub field: String,
    pub file_value: Option<String>,
    pub fetched_value: Option<String>,
    pub stored_value: Option<String>,
    pub override_value: Option<String>,
    pub override_locked: bool,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectiveSource {
    Override,
    Stored,
    Fetched,
    File,
}

impl MetadataFieldState {
    /// `effective(f) = override if override_locked else coalesce(override, stored, fetched, file)`.
    pub fn effective_value(&self) -> Option<&str> {
        if self.override_locked {
            return self.override_value.as_deref();
        }
        self.override_value
            .as_deref()
            .or(self.stored_value.as_deref())
            .or(self.fetched_value.as_deref())
            .or(self.file_value.as_deref())
    }

    pub fn effective_source(&self) -> Option<EffectiveSource> {
        if self.override_locked {
            return self.override_value.is_some().then_some(EffectiveSource::Override);
        }
        if self.override_value.is_some() {
            Some(EffectiveSource::Override)
        } else if self.stored_value.is_some() {
            Some(EffectiveSource::Stored)
        } else if self.fetched_value.is_some() {
            Some(EffectiveSource::Fetched)
        } else if self.file_value.is_some() {
            Some(EffectiveSource::File)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataChangeRecord {
    pub book_id: String,
    pub field: String,
    pub previous_value: Option<String>,
    pub new_value: Option<String>,
    pub source: MetadataSource,
    pub change_type: ChangeType,
    pub changed_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Scan,
    Organize,
    FetchMetadata,
    WriteBack,
    AiBatchParse,
    Transcode,
    ItunesImport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i8)]
pub enum Priority {
    Low = 0,
    Normal = 1,
    High = 2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub op_type: OperationType,
    pub status: OperationStatus,
    pub priority: Priority,
    pub progress_current: u64,
    pub progress_total: u64,
    pub progress_label: Option<String>,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub error_message: Option<String>,
    pub aging_boosted_at: Option<i64>,
    pub created_at: i64,
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationLog {
    pub operation_id: String,
    pub sequence: i64,
    pub timestamp: i64,
    pub level: LogLevel,
    pub message: String,
    pub attributes: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnthologyReviewStatus {
    PendingHighConfidence,
    PendingNeedsReview,
    TimedOut,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnthologyResolution {
    Contains,
    Replaces,
    Dismissed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthologyReview {
    pub id: String,
    pub book_id: String,
    pub status: AnthologyReviewStatus,
    pub resolution: Option<AnthologyResolution>,
    pub detected_signals: Vec<String>,
    pub created_at: i64,
    pub times_out_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Isbn,
    TitlePattern,
    SeriesContext,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthologyBookMapping {
    pub review_id: String,
    pub contained_book_id: String,
    pub match_source: MatchSource,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ITunesLibraryFingerprint {
    pub path: String,
    pub size: u64,
    pub mod_time: i64,
    pub crc32: u32,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadowStatus {
    Active,
    Inactive,
    PendingRemoval,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowRecord {
    pub torrent_id: String,
    pub torrent_name: String,
    pub shadow_dir: String,
    pub created_at: i64,
    pub last_activity_at: i64,
    pub last_upload_bytes: u64,
    pub pause_started_at: Option<i64>,
    pub status: ShadowStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TorrentOverride {
    pub max_lifetime_enabled: Option<bool>,
    pub max_lifetime_days: Option<u32>,
    pub pause_timeout_days: Option<u32>,
    pub inactivity_window_days: Option<u32>,
    pub upload_activity_threshold_pct: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedHash {
    pub hash: String,
    pub reason: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportPath {
    pub id: String,
    pub path: String,
    pub name: String,
    pub enabled: bool,
    pub book_count: u64,
}
