#![forbid(unsafe_code)]

//! Single-item fetch: one URL in, one local (and for audio, tagged) artifact
//! out.
//!
//! Work happens in two phases. [`Fetcher::stage`] resolves and downloads into
//! a private staging directory, grabs the thumbnail and applies tags; it is
//! safe to run on a worker thread. [`StagedItem::place_audio`] and
//! [`StagedItem::place_video`] then move the results to their final names in
//! the downloads directory. Pipelines always place on the calling thread in
//! manifest order, which keeps collisions deterministic.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::config::RuntimeSettings;
use crate::naming::{artifact_path, normalize_extension, replace_file};
use crate::sanitize::sanitize_title;
use crate::stage::Stage;
use crate::tagger::{TagSet, write_tags};
use crate::thumbnail::{ThumbnailFetcher, is_music_url};
use crate::ytdlp::{AUDIO_CODEC, ExtractOptions, InfoRecord, VIDEO_CONTAINER, YtDlp};

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_YEAR: &str = "Unknown Year";
const TOPIC_SUFFIX: &str = " - Topic";
const STAGING_PREFIX: &str = ".staging-";
const AUDIO_STEM: &str = "audio";
const VIDEO_STEM: &str = "video";
const THUMBNAIL_FILE: &str = "thumbnail.jpg";
const THUMBNAIL_EXT: &str = "jpg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

/// One fetch invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    pub url: String,
    pub kind: MediaKind,
    pub sequence_number: Option<u32>,
}

impl MediaRequest {
    pub fn audio(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: MediaKind::Audio,
            sequence_number: None,
        }
    }

    pub fn video(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: MediaKind::Video,
            sequence_number: None,
        }
    }

    pub fn with_sequence(mut self, sequence_number: u32) -> Self {
        self.sequence_number = Some(sequence_number);
        self
    }
}

/// Descriptive fields pulled from the extractor's metadata record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedMetadata {
    pub title: String,
    pub artist: String,
    pub release_year: String,
    pub thumbnail_url: Option<String>,
    pub source_url: String,
}

impl ExtractedMetadata {
    pub fn from_info(info: &InfoRecord, request_url: &str) -> Self {
        let title = info
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(UNKNOWN_TITLE)
            .to_string();
        Self {
            title,
            artist: artist_name(info.artist(), request_url),
            release_year: release_year(info.upload_date.as_deref()),
            thumbnail_url: info.thumbnail.clone(),
            source_url: info
                .webpage_url
                .clone()
                .unwrap_or_else(|| request_url.to_string()),
        }
    }
}

/// Uploader name, defaulted, with the music service's " - Topic" suffix
/// dropped for music URLs.
pub fn artist_name(uploader: Option<&str>, url: &str) -> String {
    let artist = uploader
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN_ARTIST);
    let artist = if is_music_url(url) {
        artist.strip_suffix(TOPIC_SUFFIX).unwrap_or(artist)
    } else {
        artist
    };
    artist.to_string()
}

/// First four characters of an 8-digit `YYYYMMDD` date.
pub fn release_year(date: Option<&str>) -> String {
    match date.map(str::trim) {
        Some(date) if date.len() == 8 && date.bytes().all(|b| b.is_ascii_digit()) => {
            date[..4].to_string()
        }
        _ => UNKNOWN_YEAR.to_string(),
    }
}

/// Where each artifact of one fetch currently lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArtifactPaths {
    pub audio_path: Option<PathBuf>,
    pub video_path: Option<PathBuf>,
    pub thumbnail_path: Option<PathBuf>,
}

/// Result of a single audio fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchedAudio {
    pub audio_path: PathBuf,
    pub thumbnail_path: Option<PathBuf>,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_artist: String,
    pub release_year: String,
    pub genre: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_number: Option<u32>,
    pub source_url: String,
}

/// Result of a single video fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchedVideo {
    pub video_path: PathBuf,
    pub title: String,
    pub source_url: String,
}

/// Whether a placed audio item keeps its standalone thumbnail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailPolicy {
    Keep,
    Discard,
}

/// Knobs that differ between the single-item path and search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageOptions {
    pub tag: bool,
    pub square_music_thumbnails: bool,
}

impl StageOptions {
    pub const FULL: Self = Self {
        tag: true,
        square_music_thumbnails: true,
    };
    pub const PLAIN: Self = Self {
        tag: false,
        square_music_thumbnails: false,
    };
}

/// A downloaded item still sitting in its private staging directory.
#[derive(Debug)]
pub struct StagedItem {
    staging: TempDir,
    pub request: MediaRequest,
    pub metadata: ExtractedMetadata,
    pub artifacts: ArtifactPaths,
}

impl StagedItem {
    fn sanitized_title(&self) -> String {
        sanitize_title(&self.metadata.title)
    }

    /// Removes the staging directory; a failure is only logged.
    fn discard_staging(self) {
        let path = self.staging.path().to_path_buf();
        if let Err(err) = self.staging.close() {
            warn!(path = %path.display(), error = %err, "could not remove staging dir");
        }
    }

    /// Moves the tagged audio (and, with `ThumbnailPolicy::Keep`, its
    /// thumbnail) into `downloads_dir` under the sanitized title.
    pub fn place_audio(
        self,
        downloads_dir: &Path,
        thumbnails: ThumbnailPolicy,
    ) -> Result<FetchedAudio> {
        let stem = self.sanitized_title();
        let staged_audio = self
            .artifacts
            .audio_path
            .as_deref()
            .with_context(|| format!("no staged audio for {}", self.request.url))?;
        let extension = extension_of(staged_audio, AUDIO_CODEC);
        let audio_path = artifact_path(downloads_dir, &stem, &extension);
        replace_file(staged_audio, &audio_path)
            .with_context(|| Stage::Place.failed(&self.request.url))?;

        let thumbnail_path = match (&self.artifacts.thumbnail_path, thumbnails) {
            (Some(staged), ThumbnailPolicy::Keep) => {
                let target = artifact_path(downloads_dir, &stem, THUMBNAIL_EXT);
                replace_file(staged, &target)
                    .with_context(|| Stage::Place.failed(&self.request.url))?;
                Some(target)
            }
            (Some(staged), ThumbnailPolicy::Discard) => {
                fs::remove_file(staged)
                    .with_context(|| format!("removing thumbnail {}", staged.display()))?;
                debug!(url = %self.request.url, "discarded thumbnail");
                None
            }
            (None, _) => None,
        };

        info!(path = %audio_path.display(), "saved audio");

        let fetched = FetchedAudio {
            audio_path,
            thumbnail_path,
            title: self.metadata.title.clone(),
            artist: self.metadata.artist.clone(),
            album: self.metadata.title.clone(),
            album_artist: self.metadata.artist.clone(),
            release_year: self.metadata.release_year.clone(),
            genre: String::new(),
            track_number: self.request.sequence_number,
            source_url: self.metadata.source_url.clone(),
        };
        self.discard_staging();
        Ok(fetched)
    }

    /// Moves the merged video into `downloads_dir` under the sanitized title.
    pub fn place_video(self, downloads_dir: &Path) -> Result<FetchedVideo> {
        let stem = self.sanitized_title();
        let staged_video = self
            .artifacts
            .video_path
            .as_deref()
            .with_context(|| format!("no staged video for {}", self.request.url))?;
        let extension = extension_of(staged_video, VIDEO_CONTAINER);
        let video_path = artifact_path(downloads_dir, &stem, &extension);
        replace_file(staged_video, &video_path)
            .with_context(|| Stage::Place.failed(&self.request.url))?;

        info!(path = %video_path.display(), "saved video");

        let fetched = FetchedVideo {
            video_path,
            title: self.metadata.title.clone(),
            source_url: self.metadata.source_url.clone(),
        };
        self.discard_staging();
        Ok(fetched)
    }
}

fn extension_of(path: &Path, fallback: &str) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/// Finds the file yt-dlp left in staging: the reported path with its
/// container normalized, the reported path as-is, then `{stem}.{extension}`.
fn locate_output(info: &InfoRecord, stem: &Path, extension: &str) -> Option<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(reported) = info.downloaded_path() {
        candidates.push(normalize_extension(&reported, extension));
        candidates.push(reported);
    }
    candidates.push(stem.with_extension(extension));
    candidates.into_iter().find(|candidate| candidate.is_file())
}

pub struct Fetcher {
    ytdlp: YtDlp,
    thumbnails: ThumbnailFetcher,
    downloads_dir: PathBuf,
    audio_quality: String,
}

impl Fetcher {
    pub fn new(settings: &RuntimeSettings) -> Self {
        Self {
            ytdlp: YtDlp::from_settings(settings),
            thumbnails: ThumbnailFetcher::from_settings(settings),
            downloads_dir: settings.downloads_dir.clone(),
            audio_quality: settings.audio_quality.clone(),
        }
    }

    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    pub fn ytdlp(&self) -> &YtDlp {
        &self.ytdlp
    }

    fn new_staging_dir(&self) -> Result<TempDir> {
        fs::create_dir_all(&self.downloads_dir)
            .with_context(|| format!("creating {}", self.downloads_dir.display()))?;
        tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.downloads_dir)
            .with_context(|| format!("creating staging dir in {}", self.downloads_dir.display()))
    }

    /// Resolves and downloads `request` into a fresh staging directory. Audio
    /// items also get a best-effort thumbnail and, with `options.tag`, tags.
    pub fn stage(&self, request: &MediaRequest, options: StageOptions) -> Result<StagedItem> {
        let staging = self.new_staging_dir()?;
        let (stem, extract) = match request.kind {
            MediaKind::Audio => {
                let stem = staging.path().join(AUDIO_STEM);
                let extract = ExtractOptions::audio(&stem, &self.audio_quality);
                (stem, extract)
            }
            MediaKind::Video => {
                let stem = staging.path().join(VIDEO_STEM);
                let extract = ExtractOptions::video(&stem);
                (stem, extract)
            }
        };
        let extension = extract
            .postprocess()
            .map(|post| post.output_extension().to_string())
            .unwrap_or_default();

        info!(url = %request.url, kind = ?request.kind, "fetching");
        let info = self
            .ytdlp
            .extract(&request.url, &extract)
            .with_context(|| Stage::Download.failed(&request.url))?;
        let staged = locate_output(&info, &stem, &extension)
            .with_context(|| format!("yt-dlp produced no file in {}", staging.path().display()))
            .with_context(|| Stage::Download.failed(&request.url))?;
        let metadata = ExtractedMetadata::from_info(&info, &request.url);

        let mut artifacts = ArtifactPaths::default();
        match request.kind {
            MediaKind::Video => artifacts.video_path = Some(staged),
            MediaKind::Audio => {
                let square = options.square_music_thumbnails && is_music_url(&request.url);
                artifacts.thumbnail_path = self.thumbnails.fetch(
                    metadata.thumbnail_url.as_deref(),
                    &staging.path().join(THUMBNAIL_FILE),
                    square,
                );

                if options.tag {
                    let tags = TagSet {
                        title: metadata.title.clone(),
                        artist: metadata.artist.clone(),
                        album: metadata.title.clone(),
                        album_artist: metadata.artist.clone(),
                        release_year: metadata.release_year.clone(),
                        genre: None,
                        track_number: request.sequence_number,
                        cover: None,
                    }
                    .with_cover_file(artifacts.thumbnail_path.as_deref())?;
                    write_tags(&staged, &tags).with_context(|| Stage::Tag.failed(&request.url))?;
                }
                artifacts.audio_path = Some(staged);
            }
        }

        Ok(StagedItem {
            staging,
            request: request.clone(),
            metadata,
            artifacts,
        })
    }

    /// Full single-item audio path: download, thumbnail, tag, place.
    pub fn fetch_audio(&self, url: &str) -> Result<FetchedAudio> {
        self.stage(&MediaRequest::audio(url), StageOptions::FULL)?
            .place_audio(&self.downloads_dir, ThumbnailPolicy::Keep)
    }

    /// Video-only path: download and merge, then place. No tags, no thumbnail.
    pub fn fetch_video(&self, url: &str) -> Result<FetchedVideo> {
        self.stage(&MediaRequest::video(url), StageOptions::FULL)?
            .place_video(&self.downloads_dir)
    }
}
