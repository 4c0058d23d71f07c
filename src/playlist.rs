#![forbid(unsafe_code)]

//! Collection URL in, one zip of tagged, track-numbered audio files out.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use crate::archive::write_archive;
use crate::collection::expand;
use crate::config::RuntimeSettings;
use crate::fetcher::{FetchedAudio, Fetcher, MediaRequest, StageOptions, ThumbnailPolicy};
use crate::pool::run_ordered;

pub const PLAYLIST_ARCHIVE: &str = "playlist.zip";

#[derive(Debug, Clone, Serialize)]
pub struct PlaylistOutcome {
    pub archive_path: PathBuf,
    pub tracks: Vec<FetchedAudio>,
}

/// Expands `url`, fetches every member as track `1..=K` and bundles the
/// audio into `{downloads}/playlist.zip`. Any member failure aborts the run.
pub fn process_playlist(settings: &RuntimeSettings, url: &str) -> Result<PlaylistOutcome> {
    settings.ensure_downloads_dir()?;
    let fetcher = Fetcher::new(settings);
    let manifest = expand(fetcher.ytdlp(), url)?;
    let total = manifest.len();

    let mut requests = Vec::with_capacity(total);
    for (index, member) in manifest.members.iter().enumerate() {
        let track = u32::try_from(index + 1).context("playlist too long for track numbers")?;
        requests.push(MediaRequest::audio(member.as_str()).with_sequence(track));
    }

    let staged = run_ordered(requests, settings.jobs, |index, request| {
        info!("[{}/{}] {}", index + 1, total, request.url);
        fetcher.stage(&request, StageOptions::FULL)
    })?;

    // Album art is embedded by now, so the standalone images go.
    let mut tracks = Vec::with_capacity(total);
    for item in staged {
        tracks.push(item.place_audio(fetcher.downloads_dir(), ThumbnailPolicy::Discard)?);
    }

    let audio_paths: Vec<PathBuf> = tracks.iter().map(|track| track.audio_path.clone()).collect();
    let archive_path = write_archive(&settings.downloads_dir.join(PLAYLIST_ARCHIVE), &audio_paths)?;

    Ok(PlaylistOutcome {
        archive_path,
        tracks,
    })
}
