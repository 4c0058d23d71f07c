#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_DOWNLOADS_DIR: &str = "downloads";
pub const DEFAULT_YT_DLP: &str = "yt-dlp";
pub const DEFAULT_JOBS: usize = 1;
pub const DEFAULT_RETRIES: u32 = 0;
pub const DEFAULT_SOCKET_TIMEOUT_SECS: u32 = 30;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_AUDIO_QUALITY: &str = "192K";

/// Everything the pipelines need to know about their environment.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub downloads_dir: PathBuf,
    pub yt_dlp: PathBuf,
    pub jobs: usize,
    pub retries: u32,
    pub socket_timeout_secs: u32,
    pub http_timeout_secs: u64,
    pub audio_quality: String,
}

impl RuntimeSettings {
    /// Settings rooted at `downloads_dir` with every other value defaulted.
    pub fn with_downloads_dir(downloads_dir: impl Into<PathBuf>) -> Self {
        Self {
            downloads_dir: downloads_dir.into(),
            ..Self::default()
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Creates the downloads directory if needed. Safe to call repeatedly.
    pub fn ensure_downloads_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.downloads_dir)
            .with_context(|| format!("creating {}", self.downloads_dir.display()))
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            downloads_dir: PathBuf::from(DEFAULT_DOWNLOADS_DIR),
            yt_dlp: PathBuf::from(DEFAULT_YT_DLP),
            jobs: DEFAULT_JOBS,
            retries: DEFAULT_RETRIES,
            socket_timeout_secs: DEFAULT_SOCKET_TIMEOUT_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            audio_quality: DEFAULT_AUDIO_QUALITY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub downloads_dir: Option<PathBuf>,
    pub yt_dlp: Option<PathBuf>,
    pub jobs: Option<usize>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_runtime_settings(overrides: RuntimeOverrides) -> Result<RuntimeSettings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    Ok(build_runtime_settings_with_overrides(
        &file_vars,
        env_var_string,
        overrides,
    ))
}

#[cfg(test)]
fn build_runtime_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> RuntimeSettings {
    build_runtime_settings_with_overrides(file_vars, env_lookup, RuntimeOverrides::default())
}

fn build_runtime_settings_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> RuntimeSettings {
    let downloads_dir = overrides
        .downloads_dir
        .or_else(|| lookup_value("DYNAMO_DOWNLOADS_DIR", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOADS_DIR));
    let yt_dlp = overrides
        .yt_dlp
        .or_else(|| lookup_value("DYNAMO_YT_DLP", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_YT_DLP));
    let jobs = overrides
        .jobs
        .or_else(|| parsed_value("DYNAMO_JOBS", file_vars, &env_lookup))
        .filter(|jobs| *jobs > 0)
        .unwrap_or(DEFAULT_JOBS);
    let retries =
        parsed_value("DYNAMO_RETRIES", file_vars, &env_lookup).unwrap_or(DEFAULT_RETRIES);
    let socket_timeout_secs = parsed_value("DYNAMO_SOCKET_TIMEOUT", file_vars, &env_lookup)
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_SOCKET_TIMEOUT_SECS);
    let http_timeout_secs = parsed_value("DYNAMO_HTTP_TIMEOUT", file_vars, &env_lookup)
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);
    let audio_quality = lookup_value("DYNAMO_AUDIO_QUALITY", file_vars, &env_lookup)
        .unwrap_or_else(|| DEFAULT_AUDIO_QUALITY.to_string());

    RuntimeSettings {
        downloads_dir,
        yt_dlp,
        jobs,
        retries,
        socket_timeout_secs,
        http_timeout_secs,
        audio_quality,
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key)
        .or_else(|| file_vars.get(key).cloned())
        .filter(|value| !value.trim().is_empty())
}

fn parsed_value<T: std::str::FromStr>(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<T> {
    lookup_value(key, file_vars, env_lookup).and_then(|value| value.trim().parse::<T>().ok())
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
