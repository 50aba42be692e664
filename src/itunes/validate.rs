//! `Validate(library_path)` — §4.I.

use std::collections::HashSet;
use std::path::Path;

use super::error::ITunesError;
use super::plist_model::parse_tracks;

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub total_tracks: usize,
    pub audiobook_tracks: usize,
    pub files_found: usize,
    pub files_missing: usize,
    pub missing_paths: Vec<String>,
    pub duplicate_count: usize,
    pub estimated_import_time_sec: f64,
}

/// Seconds budgeted per track for the import estimate: a hash + tag read
/// of a multi-hour audiobook file, observed to dominate import time.
const ESTIMATED_SEC_PER_TRACK: f64 = 1.5;

pub fn validate(library_path: &Path) -> Result<ValidationReport, ITunesError> {
    let tracks = parse_tracks(library_path)?;
    let audiobook_tracks: Vec<_> = tracks.iter().filter(|t| t.is_audiobook).collect();

    let mut seen = HashSet::new();
    let mut duplicate_count = 0;
    let mut missing_paths = Vec::new();
    let mut files_found = 0;

    for track in &audiobook_tracks {
        match &track.location {
            Some(path) => {
                if !seen.insert(path.clone()) {
                    duplicate_count += 1;
                }
                if path.exists() {
                    files_found += 1;
                } else {
                    missing_paths.push(path.display().to_string());
                }
            }
            None => missing_paths.push(format!("track {} has no location", track.track_id)),
        }
    }

    Ok(ValidationReport {
        total_tracks: tracks.len(),
        audiobook_tracks: audiobook_tracks.len(),
        files_found,
        files_missing: missing_paths.len(),
        missing_paths,
        duplicate_count,
        estimated_import_time_sec: audiobook_tracks.len() as f64 * ESTIMATED_SEC_PER_TRACK,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_library(dir: &Path, track_xml: &str) -> std::path::PathBuf {
        let path = dir.join("Library.xml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Tracks</key>
    <dict>
        {track_xml}
    </dict>
</dict>
</plist>"#
        )
        .unwrap();
        path
    }

    #[test]
    fn counts_audiobook_tracks_and_flags_missing_files() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("present.m4b");
        std::fs::write(&present, b"data").unwrap();

        let track_xml = format!(
            r#"<key>1</key>
            <dict>
                <key>Name</key><string>Present Book</string>
                <key>Genre</key><string>Audiobook</string>
                <key>Location</key><string>file://localhost{}</string>
            </dict>
            <key>2</key>
            <dict>
                <key>Name</key><string>Missing Book</string>
                <key>Genre</key><string>Audiobook</string>
                <key>Location</key><string>file://localhost/nowhere/gone.m4b</string>
            </dict>
            <key>3</key>
            <dict>
                <key>Name</key><string>Some Song</string>
                <key>Genre</key><string>Pop</string>
            </dict>"#,
            present.display()
        );
        let path = write_library(dir.path(), &track_xml);

        let report = validate(&path).unwrap();
        assert_eq!(report.total_tracks, 3);
        assert_eq!(report.audiobook_tracks, 2);
        assert_eq!(report.files_found, 1);
        assert_eq!(report.files_missing, 1);
        assert_eq!(report.missing_paths, vec!["/nowhere/gone.m4b".to_string()]);
    }
}
