// Metadata extractor using lofty with id3 fallback for problematic MP3 files
use anyhow::Result;
use id3::TagLike;
use lofty::picture::PictureType;
use lofty::prelude::{Accessor, AudioFile, ItemKey, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::Tag;
use std::path::Path;
use std::time::UNIX_EPOCH;

use super::parser::{parse_artists, parse_genres};

/// Everything the library needs from one audio file
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedTrack {
    pub file_path: String,
    pub title: String,
    /// Credited artists, split and de-duplicated, in credit order
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub genres: Vec<String>,
    pub year: Option<i32>,
    pub track_number: Option<i32>,
    pub disc_number: Option<i32>,
    pub duration_ms: Option<i64>,
    /// The file carries embedded cover art
    pub has_artwork: bool,
    /// File mtime, seconds since the epoch
    pub date_modified: i64,
}

// Priority order for picture types (matching foobar2000 behavior)
const PICTURE_PRIORITY: [PictureType; 19] = [
    PictureType::CoverFront,
    PictureType::Media,
    PictureType::CoverBack,
    PictureType::Leaflet,
    PictureType::Other,
    PictureType::Icon,
    PictureType::OtherIcon,
    PictureType::Artist,
    PictureType::Band,
    PictureType::Composer,
    PictureType::Lyricist,
    PictureType::RecordingLocation,
    PictureType::DuringRecording,
    PictureType::DuringPerformance,
    PictureType::ScreenCapture,
    PictureType::BrightFish,
    PictureType::Illustration,
    PictureType::BandLogo,
    PictureType::PublisherLogo,
];

pub struct MetadataExtractor;

impl MetadataExtractor {
    pub fn extract_from_file(file_path: &Path) -> Result<ScannedTrack> {
        let date_modified = Self::modified_secs(file_path)?;

        // Try to read the file with lofty first
        let probed = Probe::open(file_path)
            .map_err(anyhow::Error::from)
            .and_then(|probe| Ok(probe.guess_file_type()?.read()?));
        let tagged_file = match probed {
            Ok(f) => f,
            Err(e) => {
                log::warn!("Failed to read file with lofty: {:?}, error: {}", file_path, e);
                return Self::extract_with_fallback(file_path, date_modified);
            }
        };

        let tag = tagged_file.primary_tag().or(tagged_file.first_tag());
        let duration_ms = tagged_file.properties().duration().as_millis() as i64;

        let mut track = Self::untagged(file_path, date_modified);
        track.duration_ms = (duration_ms > 0).then_some(duration_ms);
        track.has_artwork = tagged_file.tags().iter().any(|t| !t.pictures().is_empty());

        let Some(tag) = tag else {
            return Ok(track);
        };

        if let Some(title) = tag.title() {
            track.title = title.to_string();
        }
        track.artists = parse_artists(tag.get_strings(&ItemKey::TrackArtist));
        track.album = tag.album().map(|s| s.to_string());
        track.album_artist = tag
            .get_string(&ItemKey::AlbumArtist)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        track.genres = parse_genres(tag.get_strings(&ItemKey::Genre));
        track.year = Self::tag_year(tag);
        track.track_number = tag.track().map(|n| n as i32);
        track.disc_number = tag.disk().map(|n| n as i32);

        Ok(track)
    }

    /// Safely handle malformed year tags: fall back to the first four digits of a date
    fn tag_year(tag: &Tag) -> Option<i32> {
        if let Some(y) = tag.year() {
            return Some(y as i32);
        }
        tag.get_string(&ItemKey::Year)
            .or_else(|| tag.get_string(&ItemKey::RecordingDate))
            .and_then(|date| date.chars().take(4).collect::<String>().parse::<i32>().ok())
    }

    /// Fallback extraction method - uses id3 crate for MP3 files, minimal info for others
    fn extract_with_fallback(file_path: &Path, date_modified: i64) -> Result<ScannedTrack> {
        let extension = file_path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase());

        if extension.as_deref() == Some("mp3") {
            match Self::extract_with_id3(file_path, date_modified) {
                Ok(track) => {
                    log::debug!("Extracted metadata using id3 fallback for: {:?}", file_path);
                    return Ok(track);
                }
                Err(e) => log::warn!("id3 fallback failed for {:?}: {}", file_path, e),
            }
        }

        Ok(Self::untagged(file_path, date_modified))
    }

    /// Extract metadata using the id3 crate (more lenient with malformed tags)
    fn extract_with_id3(file_path: &Path, date_modified: i64) -> Result<ScannedTrack> {
        let tag = id3::Tag::read_from_path(file_path)?;
        let mut track = Self::untagged(file_path, date_modified);

        if let Some(title) = tag.title() {
            track.title = title.to_string();
        }
        track.artists = parse_artists(tag.artist());
        track.album = tag.album().map(|s| s.to_string());
        track.album_artist = tag.album_artist().map(|s| s.to_string());
        track.genres = parse_genres(tag.genre_parsed().as_deref());
        track.year = tag.year();
        track.track_number = tag.track().map(|t| t as i32);
        track.disc_number = tag.disc().map(|d| d as i32);
        // id3 has no audio properties; TLEN is the best we get
        track.duration_ms = tag.duration().map(|d| d as i64 * 1000);
        track.has_artwork = tag.pictures().next().is_some();

        Ok(track)
    }

    /// A track entry named after the file, used when no tags can be read
    fn untagged(file_path: &Path, date_modified: i64) -> ScannedTrack {
        let title = file_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown")
            .to_string();

        ScannedTrack {
            file_path: file_path.to_string_lossy().to_string(),
            title,
            artists: Vec::new(),
            album: None,
            album_artist: None,
            genres: Vec::new(),
            year: None,
            track_number: None,
            disc_number: None,
            duration_ms: None,
            has_artwork: false,
            date_modified,
        }
    }

    pub fn modified_secs(file_path: &Path) -> Result<i64> {
        let modified = std::fs::metadata(file_path)?.modified()?;
        Ok(modified.duration_since(UNIX_EPOCH)?.as_secs() as i64)
    }
}

/// Embedded cover art of `file_path`, best picture type first
pub fn read_artwork(file_path: &Path) -> Result<Option<Vec<u8>>> {
    let tagged_file = Probe::open(file_path)?.read()?;

    // Primary tag first, then every other tag
    let tags = tagged_file
        .primary_tag()
        .into_iter()
        .chain(tagged_file.tags().iter());

    for tag in tags {
        for pic_type in &PICTURE_PRIORITY {
            if let Some(picture) = tag.pictures().iter().find(|p| p.pic_type() == *pic_type) {
                return Ok(Some(picture.data().to_vec()));
            }
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreadable_file_falls_back_to_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("01 - Intro.flac");
        std::fs::write(&path, b"definitely not audio").unwrap();

        // Probing garbage either errors or yields an untagged track; never a tagged one
        if let Ok(track) = MetadataExtractor::extract_from_file(&path) {
            assert_eq!(track.title, "01 - Intro");
            assert!(track.artists.is_empty());
            assert!(!track.has_artwork);
            assert!(track.date_modified > 0);
        }
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let missing = Path::new("/definitely/not/here.mp3");
        assert!(MetadataExtractor::extract_from_file(missing).is_err());
        assert!(read_artwork(missing).is_err());
    }

    #[test]
    fn test_untagged_uses_stem() {
        let track = MetadataExtractor::untagged(Path::new("/music/Song Title.ogg"), 5);
        assert_eq!(track.title, "Song Title");
        assert_eq!(track.file_path, "/music/Song Title.ogg");
        assert_eq!(track.date_modified, 5);
    }
}
