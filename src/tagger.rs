#![forbid(unsafe_code)]

//! Writes descriptive ID3 tags and front-cover art into finished audio files.

use anyhow::{Context, Result, bail};
use id3::frame::{Picture, PictureType};
use id3::{ErrorKind, Tag, TagLike, Version};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

const COVER_DESCRIPTION: &str = "Cover";
const DEFAULT_COVER_MIME: &str = "image/jpeg";

/// Embedded image plus its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverArt {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl CoverArt {
    /// Loads a cover from disk. A path that does not exist yields `None`.
    pub fn from_file(path: &Path) -> Result<Option<Self>> {
        if !path.is_file() {
            return Ok(None);
        }
        let data = fs::read(path).with_context(|| format!("reading cover {}", path.display()))?;
        let mime_type = mime_guess::from_path(path)
            .first()
            .filter(|mime| mime.type_() == mime_guess::mime::IMAGE)
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_else(|| DEFAULT_COVER_MIME.to_string());
        Ok(Some(Self { mime_type, data }))
    }
}

/// Everything the tagger writes. Optional fields are skipped when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagSet {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_artist: String,
    pub release_year: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_number: Option<u32>,
    #[serde(skip)]
    pub cover: Option<CoverArt>,
}

impl TagSet {
    /// Attaches the cover at `path` when the file exists.
    pub fn with_cover_file(mut self, path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            self.cover = CoverArt::from_file(path)?;
        }
        Ok(self)
    }
}

fn set_text_opt(tag: &mut Tag, id: &str, value: Option<&str>) {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => tag.set_text(id, text.to_string()),
        _ => {
            let _ = tag.remove(id);
        }
    }
}

/// Rewrites the tag container of `audio_path` in place and hands the path
/// back. The audio payload is left untouched.
pub fn write_tags(audio_path: &Path, tags: &TagSet) -> Result<PathBuf> {
    if !audio_path.is_file() {
        bail!("audio file {} does not exist", audio_path.display());
    }

    let mut tag = read_existing(audio_path)?.unwrap_or_default();

    set_text_opt(&mut tag, "TIT2", Some(&tags.title));
    set_text_opt(&mut tag, "TPE1", Some(&tags.artist));
    set_text_opt(&mut tag, "TALB", Some(&tags.album));
    set_text_opt(&mut tag, "TPE2", Some(&tags.album_artist));
    // Stored as text so placeholders like "Unknown Year" survive.
    set_text_opt(&mut tag, "TDRC", Some(&tags.release_year));

    if let Some(genre) = tags.genre.as_deref().filter(|g| !g.trim().is_empty()) {
        tag.set_genre(genre.trim());
    }
    if let Some(track) = tags.track_number {
        tag.set_track(track);
    }

    if let Some(cover) = &tags.cover {
        tag.remove_all_pictures();
        tag.add_frame(Picture {
            mime_type: cover.mime_type.clone(),
            picture_type: PictureType::CoverFront,
            description: COVER_DESCRIPTION.to_string(),
            data: cover.data.clone(),
        });
    }

    tag.write_to_path(audio_path, Version::Id3v24)
        .with_context(|| format!("writing tags to {}", audio_path.display()))?;

    Ok(audio_path.to_path_buf())
}

/// The file's current tag, or `None` when it carries no ID3 header at all.
/// A header that is present but unreadable is an error.
fn read_existing(audio_path: &Path) -> Result<Option<Tag>> {
    match Tag::read_from_path(audio_path) {
        Ok(tag) => Ok(Some(tag)),
        Err(err) if matches!(err.kind, ErrorKind::NoTag) => Ok(None),
        Err(err) => Err(err)
            .with_context(|| format!("reading existing tags from {}", audio_path.display())),
    }
}

/// Reads back what `write_tags` stored. Missing frames come back empty.
pub fn read_tags(audio_path: &Path) -> Result<TagSet> {
    let tag = Tag::read_from_path(audio_path)
        .with_context(|| format!("reading tags from {}", audio_path.display()))?;
    Ok(tag_set_from(&tag))
}

fn tag_set_from(tag: &Tag) -> TagSet {
    let text = |id: &str| {
        tag.get(id)
            .and_then(|frame| frame.content().text())
            .unwrap_or_default()
            .to_string()
    };

    let cover = tag
        .pictures()
        .find(|picture| picture.picture_type == PictureType::CoverFront)
        .map(|picture| CoverArt {
            mime_type: picture.mime_type.clone(),
            data: picture.data.clone(),
        });

    TagSet {
        title: text("TIT2"),
        artist: text("TPE1"),
        album: text("TALB"),
        album_artist: text("TPE2"),
        release_year: text("TDRC"),
        genre: tag.genre().map(str::to_string),
        track_number: tag.track(),
        cover,
    }
}

/// Hand-edited fields for [`retag`]. `None` keeps what the file has.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagOverrides {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub release_year: Option<String>,
    pub genre: Option<String>,
    pub track_number: Option<u32>,
    pub cover: Option<PathBuf>,
}

/// Applies `overrides` on top of the tags `audio_path` already carries and
/// returns the resulting set. A cover path that does not exist is rejected
/// before anything is written.
pub fn retag(audio_path: &Path, overrides: TagOverrides) -> Result<TagSet> {
    if !audio_path.is_file() {
        bail!("audio file {} does not exist", audio_path.display());
    }
    let cover = match overrides.cover.as_deref() {
        Some(path) => match CoverArt::from_file(path)? {
            Some(cover) => Some(cover),
            None => bail!("cover image {} does not exist", path.display()),
        },
        None => None,
    };

    let current = read_existing(audio_path)?
        .map(|tag| tag_set_from(&tag))
        .unwrap_or_default();
    let tags = TagSet {
        title: overrides.title.unwrap_or(current.title),
        artist: overrides.artist.unwrap_or(current.artist),
        album: overrides.album.unwrap_or(current.album),
        album_artist: overrides.album_artist.unwrap_or(current.album_artist),
        release_year: overrides.release_year.unwrap_or(current.release_year),
        genre: overrides.genre.or(current.genre),
        track_number: overrides.track_number.or(current.track_number),
        cover: cover.or(current.cover),
    };

    write_tags(audio_path, &tags)?;
    Ok(tags)
}
