//! Metadata extraction — §4.M.
//!
//! Reads embedded tags via a format-specific driver (id3/metaflac/mp4ameta),
//! falling back to filename parsing when the embedded tags are empty or the
//! format has no native tag reader. Failure policy: an unreadable *file* is
//! an error; unreadable or empty *tags* are not — they just fall back.

mod filename;
pub mod writer;

use std::fs::File;
use std::path::Path;

use thiserror::Error;

use crate::store::models::AudioFormat;

pub use filename::parse_filename;
pub use writer::{write_tags, WriteBackError};

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("cannot read file {0:?}: {1}")]
    Unreadable(std::path::PathBuf, std::io::Error),

    #[error("unrecognised audio format for {0:?}")]
    UnknownFormat(std::path::PathBuf),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub series: Option<String>,
    pub series_index: Option<f64>,
    pub comments: Option<String>,
    pub year: Option<i32>,
    pub narrator: Option<String>,
    pub language: Option<String>,
    pub publisher: Option<String>,
    pub isbn10: Option<String>,
    pub isbn13: Option<String>,
    pub track: Option<u32>,
    pub total_tracks: Option<u32>,
    pub disk: Option<u32>,
    pub total_disks: Option<u32>,
    pub duration_sec: Option<f64>,
    pub used_filename_fallback: bool,
}

impl NormalizedMetadata {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.artist.is_none()
            && self.album.is_none()
            && self.genre.is_none()
            && self.year.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    pub codec: Option<String>,
    pub bitrate_kbps: Option<u32>,
    pub sample_rate_hz: Option<u32>,
    pub channels: Option<u8>,
    pub bit_depth: Option<u8>,
    pub quality_label: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractedMetadata {
    pub tags: NormalizedMetadata,
    pub media_info: MediaInfo,
}

/// Reads embedded tags from `path`, falling back to filename parsing. The
/// only error case is an unreadable file; missing/invalid tags degrade to
/// an empty-plus-fallback record instead.
pub fn extract(path: &Path) -> Result<ExtractedMetadata, MetadataError> {
    File::open(path).map_err(|e| MetadataError::Unreadable(path.to_path_buf(), e))?;

    let format = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(AudioFormat::from_extension);

    let (mut tags, media_info) = match format {
        Some(AudioFormat::Mp3) => read_id3(path),
        Some(AudioFormat::Flac) => read_flac(path),
        Some(AudioFormat::M4b) | Some(AudioFormat::M4a) => read_mp4(path),
        // No native reader is wired up for Opus; fall through to filename fallback.
        Some(AudioFormat::Opus) | None => (NormalizedMetadata::default(), MediaInfo::default()),
    };

    if tags.is_empty() {
        let fallback = parse_filename(path);
        tags.title = tags.title.or(fallback.title);
        tags.series = tags.series.or(fallback.series);
        tags.track = tags.track.or(fallback.track);
        tags.artist = tags.artist.or(fallback.artist);
        tags.used_filename_fallback = true;
    }

    Ok(ExtractedMetadata { tags, media_info })
}

fn read_id3(path: &Path) -> (NormalizedMetadata, MediaInfo) {
    use id3::TagLike;
    let tag = match id3::Tag::read_from_path(path) {
        Ok(t) => t,
        Err(_) => return (NormalizedMetadata::default(), MediaInfo::default()),
    };

    let tags = NormalizedMetadata {
        title: tag.title().map(str::to_owned),
        artist: tag.artist().map(str::to_owned),
        album: tag.album().map(str::to_owned),
        genre: tag.genre().map(str::to_owned),
        comments: tag.comments().next().map(|c| c.text.clone()),
        year: tag.year(),
        track: tag.track(),
        total_tracks: tag.total_tracks(),
        disk: tag.disc(),
        total_disks: tag.total_discs(),
        ..Default::default()
    };

    (tags, MediaInfo { codec: Some("mp3".to_string()), ..Default::default() })
}

fn read_flac(path: &Path) -> (NormalizedMetadata, MediaInfo) {
    let tag = match metaflac::Tag::read_from_path(path) {
        Ok(t) => t,
        Err(_) => return (NormalizedMetadata::default(), MediaInfo::default()),
    };

    let vorbis_first = |key: &str| -> Option<String> {
        tag.get_vorbis(key).and_then(|mut it| it.next()).map(str::to_owned)
    };

    let tags = NormalizedMetadata {
        title: vorbis_first("title"),
        artist: vorbis_first("artist"),
        album: vorbis_first("album"),
        genre: vorbis_first("genre"),
        narrator: vorbis_first("narrator"),
        year: vorbis_first("date").and_then(|s| s.get(..4).and_then(|y| y.parse().ok())),
        track: vorbis_first("tracknumber").and_then(|s| s.parse().ok()),
        disk: vorbis_first("discnumber").and_then(|s| s.parse().ok()),
        ..Default::default()
    };

    let media_info = tag
        .get_streaminfo()
        .map(|info| MediaInfo {
            codec: Some("flac".to_string()),
            sample_rate_hz: Some(info.sample_rate),
            channels: Some(info.num_channels),
            bit_depth: Some(info.bits_per_sample),
            ..Default::default()
        })
        .unwrap_or_default();

    (tags, media_info)
}

fn read_mp4(path: &Path) -> (NormalizedMetadata, MediaInfo) {
    let tag = match mp4ameta::Tag::read_from_path(path) {
        Ok(t) => t,
        Err(_) => return (NormalizedMetadata::default(), MediaInfo::default()),
    };

    let (track, total_tracks) = tag.track();
    let (disk, total_disks) = tag.disc();

    let tags = NormalizedMetadata {
        title: tag.title().map(str::to_owned),
        artist: tag.artist().map(str::to_owned),
        album: tag.album().map(str::to_owned),
        genre: tag.genre().map(str::to_owned),
        year: tag.year().and_then(|s| s.parse().ok()),
        track: track.map(u32::from),
        total_tracks: total_tracks.map(u32::from),
        disk: disk.map(u32::from),
        total_disks: total_disks.map(u32::from),
        duration_sec: Some(tag.duration().as_secs_f64()),
        ..Default::default()
    };

    let media_info = MediaInfo {
        codec: Some("m4b".to_string()),
        bitrate_kbps: tag.avg_bitrate().map(|b| b / 1000),
        sample_rate_hz: tag.sample_rate().map(|r| r.hz()),
        channels: tag.channel_config().map(|c| c as u8),
        ..Default::default()
    };

    (tags, media_info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn unreadable_file_is_an_error() {
        let result = extract(Path::new("/nonexistent/book.m4b"));
        assert!(result.is_err());
    }

    #[test]
    fn unparseable_tags_fall_back_to_filename_not_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Andy Weir - Project Hail Mary.mp3");
        std::fs::write(&path, b"not a real mp3").unwrap();

        let extracted = extract(&path).unwrap();
        assert!(extracted.tags.used_filename_fallback);
        assert_eq!(extracted.tags.title.as_deref(), Some("Project Hail Mary"));
        assert_eq!(extracted.tags.artist.as_deref(), Some("Andy Weir"));
    }

    #[test]
    fn unknown_extension_falls_back_to_filename() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Some Title.opus");
        std::fs::write(&path, b"opus bytes").unwrap();

        let extracted = extract(&path).unwrap();
        assert!(extracted.tags.used_filename_fallback);
        assert_eq!(extracted.tags.title.as_deref(), Some("Some Title"));
    }
}
