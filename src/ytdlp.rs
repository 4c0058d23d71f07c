#![forbid(unsafe_code)]

//! Thin, typed boundary around the `yt-dlp` command-line tool.
//!
//! Every invocation asks for `--dump-single-json` so the metadata record comes
//! back on stdout, whether or not media is also downloaded. Option handling is
//! explicit: callers build an [`ExtractOptions`] through one of its
//! constructors instead of passing loose flags around.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

use crate::config::RuntimeSettings;

pub const AUDIO_FORMAT: &str = "bestaudio/best";
pub const VIDEO_FORMAT: &str = "bestvideo+bestaudio/best";
pub const AUDIO_CODEC: &str = "mp3";
pub const VIDEO_CONTAINER: &str = "mp4";
const EXT_PLACEHOLDER: &str = "%(ext)s";
const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";

/// Post-download processing handed to yt-dlp (and through it, ffmpeg).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostProcess {
    ExtractAudio { codec: String, quality: String },
    Merge { container: String },
}

impl PostProcess {
    /// Extension of the file the post-processor leaves behind.
    pub fn output_extension(&self) -> &str {
        match self {
            PostProcess::ExtractAudio { codec, .. } => codec,
            PostProcess::Merge { container } => container,
        }
    }
}

/// Recognised yt-dlp options for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    format: Option<String>,
    output_template: Option<PathBuf>,
    postprocess: Option<PostProcess>,
    flat: bool,
    download: bool,
    no_playlist: bool,
}

impl ExtractOptions {
    /// Best audio, transcoded to mp3, written to `{stem}.%(ext)s`.
    pub fn audio(stem: &Path, quality: &str) -> Self {
        Self {
            format: Some(AUDIO_FORMAT.to_string()),
            output_template: Some(template_for(stem)),
            postprocess: Some(PostProcess::ExtractAudio {
                codec: AUDIO_CODEC.to_string(),
                quality: quality.to_string(),
            }),
            flat: false,
            download: true,
            no_playlist: true,
        }
    }

    /// Best video plus best audio merged into an mp4 at `{stem}.%(ext)s`.
    pub fn video(stem: &Path) -> Self {
        Self {
            format: Some(VIDEO_FORMAT.to_string()),
            output_template: Some(template_for(stem)),
            postprocess: Some(PostProcess::Merge {
                container: VIDEO_CONTAINER.to_string(),
            }),
            flat: false,
            download: true,
            no_playlist: true,
        }
    }

    /// Metadata only, without descending into collection members.
    pub fn flat() -> Self {
        Self {
            format: None,
            output_template: None,
            postprocess: None,
            flat: true,
            download: false,
            no_playlist: false,
        }
    }

    /// Full metadata for every hit of a search query, nothing downloaded.
    pub fn search() -> Self {
        Self {
            format: Some(AUDIO_FORMAT.to_string()),
            output_template: None,
            postprocess: None,
            flat: false,
            download: false,
            no_playlist: true,
        }
    }

    pub fn postprocess(&self) -> Option<&PostProcess> {
        self.postprocess.as_ref()
    }

    fn validate(&self) -> Result<()> {
        if self.download && self.output_template.is_none() {
            bail!("downloading requires an output template");
        }
        if self.flat && self.download {
            bail!("flat extraction cannot download media");
        }
        if let Some(template) = &self.output_template
            && !template.to_string_lossy().contains(EXT_PLACEHOLDER)
        {
            bail!(
                "output template {} lacks {EXT_PLACEHOLDER}",
                template.display()
            );
        }
        Ok(())
    }

    /// Renders the yt-dlp argument list, URL excluded.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--dump-single-json".to_string(),
            "--no-warnings".to_string(),
            "--no-progress".to_string(),
        ];

        if self.download {
            args.push("--no-simulate".to_string());
        } else {
            args.push("--skip-download".to_string());
        }
        if self.flat {
            args.push("--flat-playlist".to_string());
        }
        if self.no_playlist {
            args.push("--no-playlist".to_string());
        }
        if let Some(format) = &self.format {
            args.push("--format".to_string());
            args.push(format.clone());
        }
        if let Some(template) = &self.output_template {
            args.push("--output".to_string());
            args.push(template.to_string_lossy().into_owned());
        }
        match &self.postprocess {
            Some(PostProcess::ExtractAudio { codec, quality }) => {
                args.push("--extract-audio".to_string());
                args.push("--audio-format".to_string());
                args.push(codec.clone());
                args.push("--audio-quality".to_string());
                args.push(quality.clone());
            }
            Some(PostProcess::Merge { container }) => {
                args.push("--merge-output-format".to_string());
                args.push(container.clone());
            }
            None => {}
        }

        args
    }
}

fn template_for(stem: &Path) -> PathBuf {
    let mut template = stem.as_os_str().to_owned();
    template.push(".");
    template.push(EXT_PLACEHOLDER);
    PathBuf::from(template)
}

/// A `ytsearch{N}:{keyword}` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    keyword: String,
    count: usize,
}

impl SearchQuery {
    pub fn new(keyword: &str, count: usize) -> Result<Self> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            bail!("search keyword must not be empty");
        }
        if count == 0 {
            bail!("search result count must be at least 1");
        }
        Ok(Self {
            keyword: keyword.to_string(),
            count,
        })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn to_url(&self) -> String {
        format!("ytsearch{}:{}", self.count, self.keyword)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestedDownload {
    pub filepath: Option<String>,
}

/// The subset of yt-dlp's info JSON the pipelines read. Everything is
/// optional because flat entries and older uploads omit most fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InfoRecord {
    pub id: Option<String>,
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub channel: Option<String>,
    pub upload_date: Option<String>,
    pub release_date: Option<String>,
    pub thumbnail: Option<String>,
    pub webpage_url: Option<String>,
    pub url: Option<String>,
    pub filename: Option<String>,
    #[serde(default)]
    pub requested_downloads: Vec<RequestedDownload>,
    #[serde(default)]
    entries: Option<Vec<Option<InfoRecord>>>,
}

impl InfoRecord {
    /// Member records of a collection or search result, unavailable entries
    /// (yt-dlp emits `null`) skipped.
    pub fn entries(&self) -> impl Iterator<Item = &InfoRecord> {
        self.entries.iter().flatten().flatten()
    }

    pub fn has_entries(&self) -> bool {
        self.entries().next().is_some()
    }

    /// Address of this record as a standalone item.
    pub fn item_url(&self) -> Option<String> {
        self.webpage_url
            .clone()
            .or_else(|| self.url.clone())
            .or_else(|| self.id.as_ref().map(|id| format!("{WATCH_URL_PREFIX}{id}")))
    }

    /// Uploader, falling back to the channel name.
    pub fn artist(&self) -> Option<&str> {
        self.uploader.as_deref().or(self.channel.as_deref())
    }

    /// Final file path reported by yt-dlp after post-processing, if any.
    pub fn downloaded_path(&self) -> Option<PathBuf> {
        self.requested_downloads
            .iter()
            .find_map(|download| download.filepath.as_deref())
            .or(self.filename.as_deref())
            .map(PathBuf::from)
    }
}

/// Handle on the yt-dlp executable.
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
    socket_timeout_secs: u32,
    retries: u32,
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            socket_timeout_secs: crate::config::DEFAULT_SOCKET_TIMEOUT_SECS,
            retries: 0,
        }
    }

    pub fn from_settings(settings: &RuntimeSettings) -> Self {
        Self {
            program: settings.yt_dlp.clone(),
            socket_timeout_secs: settings.socket_timeout_secs,
            retries: settings.retries,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Runs `yt-dlp --version` to fail loudly when the tool is missing.
    pub fn ensure_available(&self) -> Result<()> {
        let status = Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(_) => bail!(
                "{} is installed but returned a failure status",
                self.program.display()
            ),
            Err(err) => bail!(
                "{} is not installed or not in PATH: {}",
                self.program.display(),
                err
            ),
        }
    }

    /// Resolves `url` with `options`, retrying failed runs as configured.
    pub fn extract(&self, url: &str, options: &ExtractOptions) -> Result<InfoRecord> {
        options.validate()?;

        let attempts = self.retries + 1;
        let mut attempt = 1;
        loop {
            match self.run_once(url, options) {
                Ok(info) => return Ok(info),
                Err(err) if attempt < attempts => {
                    warn!(url, attempt, error = %err, "yt-dlp failed, retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn run_once(&self, url: &str, options: &ExtractOptions) -> Result<InfoRecord> {
        let mut command = Command::new(&self.program);
        command
            .args(options.to_args())
            .arg("--socket-timeout")
            .arg(self.socket_timeout_secs.to_string())
            .arg("--")
            .arg(url)
            .stdin(Stdio::null());

        debug!(program = %self.program.display(), url, "running yt-dlp");

        let output = command
            .output()
            .with_context(|| format!("running {} for {}", self.program.display(), url))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .unwrap_or("no error output");
            bail!(
                "yt-dlp exited with {} for {}: {}",
                output.status,
                url,
                reason
            );
        }

        serde_json::from_slice(&output.stdout)
            .with_context(|| format!("deserializing yt-dlp metadata for {}", url))
    }
}
