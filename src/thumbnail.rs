#![forbid(unsafe_code)]

//! Best-effort thumbnail retrieval. Nothing in here is allowed to fail a
//! fetch: every problem degrades to "no thumbnail".

use anyhow::{Context, Result, bail};
use image::{DynamicImage, ImageFormat};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RuntimeSettings;
use crate::stage::Stage;

/// Host of the music sub-service whose artwork is square album art.
pub const MUSIC_HOST: &str = "music.youtube.com";
const MAX_THUMBNAIL_BYTES: u64 = 16 * 1024 * 1024;

pub fn is_music_url(url: &str) -> bool {
    url.contains(MUSIC_HOST)
}

/// Center crop to a square whose side is `min(width, height)`.
pub fn crop_to_square(image: &DynamicImage) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    let side = width.min(height);
    let left = (width - side) / 2;
    let top = (height - side) / 2;
    image.crop_imm(left, top, side, side)
}

pub struct ThumbnailFetcher {
    agent: ureq::Agent,
}

impl ThumbnailFetcher {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { agent }
    }

    pub fn from_settings(settings: &RuntimeSettings) -> Self {
        Self::new(settings.http_timeout())
    }

    /// Downloads `url` (if any), optionally squares it, and stores it as JPEG
    /// at `dest`. Returns `None` when there is no URL or anything goes wrong.
    pub fn fetch(&self, url: Option<&str>, dest: &Path, square: bool) -> Option<PathBuf> {
        let Some(url) = url.filter(|url| !url.trim().is_empty()) else {
            debug!("no thumbnail url");
            return None;
        };

        match self.try_fetch(url, dest, square) {
            Ok(()) => Some(dest.to_path_buf()),
            Err(err) => {
                warn!(url, error = %format!("{err:#}"), "thumbnail unavailable");
                None
            }
        }
    }

    fn try_fetch(&self, url: &str, dest: &Path, square: bool) -> Result<()> {
        let response = match self.agent.get(url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => bail!("HTTP {code} from {url}"),
            Err(err) => return Err(err).with_context(|| Stage::Thumbnail.failed(url)),
        };
        if response.status() != 200 {
            bail!("HTTP {} from {url}", response.status());
        }

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_THUMBNAIL_BYTES)
            .read_to_end(&mut bytes)
            .with_context(|| format!("reading thumbnail body from {url}"))?;

        let mut image = image::load_from_memory(&bytes)
            .with_context(|| format!("decoding thumbnail from {url}"))?;
        if square {
            image = crop_to_square(&image);
        }

        DynamicImage::ImageRgb8(image.to_rgb8())
            .save_with_format(dest, ImageFormat::Jpeg)
            .with_context(|| format!("saving thumbnail to {}", dest.display()))?;
        Ok(())
    }
}
