#![forbid(unsafe_code)]

//! Video-only downloads: one merged mp4 for a single URL, a zip of them for a
//! collection. No tags and no thumbnails.

use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::archive::write_archive;
use crate::collection::{Classified, CollectionManifest, classify};
use crate::config::RuntimeSettings;
use crate::fetcher::{FetchedVideo, Fetcher, MediaRequest, StageOptions};
use crate::pool::run_ordered;

pub const VIDEO_ARCHIVE: &str = "videos.zip";

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum VideoOutcome {
    Single {
        video: FetchedVideo,
    },
    Collection {
        archive_path: PathBuf,
        videos: Vec<FetchedVideo>,
    },
}

impl VideoOutcome {
    /// The one path handed back to the user: the video or the archive.
    pub fn path(&self) -> &Path {
        match self {
            VideoOutcome::Single { video } => &video.video_path,
            VideoOutcome::Collection { archive_path, .. } => archive_path,
        }
    }
}

/// Classifies `url`, then downloads it as a single video or as a collection
/// bundled into `{downloads}/videos.zip`.
pub fn video_pipeline(settings: &RuntimeSettings, url: &str) -> Result<VideoOutcome> {
    settings.ensure_downloads_dir()?;
    let fetcher = Fetcher::new(settings);
    match classify(fetcher.ytdlp(), url)? {
        Classified::Single(_) => {
            let video = fetcher.fetch_video(url)?;
            Ok(VideoOutcome::Single { video })
        }
        Classified::Collection(manifest) => download_collection(settings, &fetcher, manifest),
    }
}

fn download_collection(
    settings: &RuntimeSettings,
    fetcher: &Fetcher,
    manifest: CollectionManifest,
) -> Result<VideoOutcome> {
    let total = manifest.len();
    let requests: Vec<MediaRequest> = manifest
        .members
        .into_iter()
        .map(MediaRequest::video)
        .collect();

    let staged = run_ordered(requests, settings.jobs, |index, request| {
        info!("[{}/{}] {}", index + 1, total, request.url);
        fetcher.stage(&request, StageOptions::FULL)
    })?;

    let mut videos = Vec::with_capacity(total);
    for item in staged {
        videos.push(item.place_video(fetcher.downloads_dir())?);
    }

    let paths: Vec<PathBuf> = videos.iter().map(|video| video.video_path.clone()).collect();
    let archive_path = write_archive(&settings.downloads_dir.join(VIDEO_ARCHIVE), &paths)?;
    Ok(VideoOutcome::Collection {
        archive_path,
        videos,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::archive::entry_names;
    use crate::testing::stub_settings;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn single_url_yields_one_mp4() -> Result<()> {
        let root = tempdir()?;
        let settings = stub_settings(root.path(), "http://127.0.0.1:9")?;

        let outcome = video_pipeline(&settings, "https://www.youtube.com/watch?v=rick")?;
        let expected = settings
            .downloads_dir
            .join("Rick Astley  Never Gonna Give You Up Official Music Video.mp4");
        assert!(matches!(outcome, VideoOutcome::Single { .. }));
        assert_eq!(outcome.path(), expected.as_path());
        assert!(expected.is_file());
        assert!(!settings.downloads_dir.join(VIDEO_ARCHIVE).exists());
        Ok(())
    }

    #[test]
    fn collection_is_bundled_in_order() -> Result<()> {
        let root = tempdir()?;
        let mut settings = stub_settings(root.path(), "http://127.0.0.1:9")?;
        settings.jobs = 2;

        let outcome = video_pipeline(&settings, "https://www.youtube.com/playlist?list=mix")?;
        let VideoOutcome::Collection { archive_path, videos } = &outcome else {
            panic!("expected a collection outcome");
        };
        assert_eq!(archive_path, &settings.downloads_dir.join("videos.zip"));
        let titles: Vec<_> = videos.iter().map(|v| v.title.as_str()).collect();
        assert_eq!(titles, vec!["Track One", "Track Two", "Track Three"]);

        let mut names = entry_names(archive_path)?;
        names.sort();
        assert_eq!(names, vec!["Track One.mp4", "Track Three.mp4", "Track Two.mp4"]);

        // Video runs never write thumbnails.
        let images = fs::read_dir(&settings.downloads_dir)?
            .flatten()
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "jpg"))
            .count();
        assert_eq!(images, 0);
        Ok(())
    }

    #[test]
    fn removed_video_is_fatal() -> Result<()> {
        let root = tempdir()?;
        let settings = stub_settings(root.path(), "http://127.0.0.1:9")?;
        let err = video_pipeline(&settings, "https://www.youtube.com/watch?v=removed").unwrap_err();
        assert!(format!("{err:#}").contains("resolve failed for"));
        Ok(())
    }
}
