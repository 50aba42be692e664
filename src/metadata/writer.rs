//! Write-back: persisting effective database-side metadata into a file's
//! embedded tags — §4.A `EnqueueWriteBack`, glossary "write-back".

use std::path::Path;

use thiserror::Error;

use crate::store::models::AudioFormat;

use super::NormalizedMetadata;

#[derive(Debug, Error)]
pub enum WriteBackError {
    #[error("unrecognised audio format for {0:?}")]
    UnknownFormat(std::path::PathBuf),

    #[error("id3 write failed: {0}")]
    Id3(#[from] id3::Error),

    #[error("flac write failed: {0}")]
    Flac(#[from] metaflac::Error),

    #[error("mp4 write failed: {0}")]
    Mp4(#[from] mp4ameta::Error),
}

/// Writes `tags` into `path`'s embedded format, leaving any field `tags`
/// doesn't set untouched on the existing tag. Opus has no writer wired up
/// (mirrors the read side); writing to an `.opus` file is a no-op.
pub fn write_tags(path: &Path, tags: &NormalizedMetadata) -> Result<(), WriteBackError> {
    let format = path.extension().and_then(|e| e.to_str()).and_then(AudioFormat::from_extension);

    match format {
        Some(AudioFormat::Mp3) => write_id3(path, tags),
        Some(AudioFormat::Flac) => write_flac(path, tags),
        Some(AudioFormat::M4b) | Some(AudioFormat::M4a) => write_mp4(path, tags),
        Some(AudioFormat::Opus) => Ok(()),
        None => Err(WriteBackError::UnknownFormat(path.to_path_buf())),
    }
}

fn write_id3(path: &Path, tags: &NormalizedMetadata) -> Result<(), WriteBackError> {
    use id3::TagLike;
    let mut tag = id3::Tag::read_from_path(path).unwrap_or_default();

    if let Some(title) = &tags.title {
        tag.set_title(title);
    }
    if let Some(artist) = &tags.artist {
        tag.set_artist(artist);
    }
    if let Some(album) = &tags.album {
        tag.set_album(album);
    }
    if let Some(genre) = &tags.genre {
        tag.set_genre(genre);
    }
    if let Some(year) = tags.year {
        tag.set_year(year);
    }
    if let Some(track) = tags.track {
        tag.set_track(track);
    }

    tag.write_to_path(path, id3::Version::Id3v24)?;
    Ok(())
}

fn write_flac(path: &Path, tags: &NormalizedMetadata) -> Result<(), WriteBackError> {
    let mut tag = metaflac::Tag::read_from_path(path).unwrap_or_default();
    let comments = tag.vorbis_comments_mut();

    if let Some(title) = &tags.title {
        comments.set_title(vec![title.clone()]);
    }
    if let Some(artist) = &tags.artist {
        comments.set_artist(vec![artist.clone()]);
    }
    if let Some(album) = &tags.album {
        comments.set_album(vec![album.clone()]);
    }
    if let Some(genre) = &tags.genre {
        comments.set_genre(vec![genre.clone()]);
    }
    if let Some(narrator) = &tags.narrator {
        comments.set("narrator", vec![narrator.clone()]);
    }

    tag.write_to_path(path)?;
    Ok(())
}

fn write_mp4(path: &Path, tags: &NormalizedMetadata) -> Result<(), WriteBackError> {
    let mut tag = mp4ameta::Tag::read_from_path(path).unwrap_or_default();

    if let Some(title) = &tags.title {
        tag.set_title(title);
    }
    if let Some(artist) = &tags.artist {
        tag.set_artist(artist);
    }
    if let Some(album) = &tags.album {
        tag.set_album(album);
    }
    if let Some(genre) = &tags.genre {
        tag.set_genre(genre);
    }

    tag.write_to_path(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opus_write_is_a_harmless_no_op() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("book.opus");
        std::fs::write(&path, b"opus bytes").unwrap();

        let tags = NormalizedMetadata { title: Some("Title".to_string()), ..Default::default() };
        write_tags(&path, &tags).unwrap();
    }

    #[test]
    fn unknown_extension_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("book.xyz");
        std::fs::write(&path, b"bytes").unwrap();

        let result = write_tags(&path, &NormalizedMetadata::default());
        assert!(matches!(result, Err(WriteBackError::UnknownFormat(_))));
    }
}
