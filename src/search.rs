#![forbid(unsafe_code)]

//! Keyword search: ask the provider for the top hits, then download each as
//! untagged audio with a best-effort thumbnail next to it.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::RuntimeSettings;
use crate::fetcher::{Fetcher, MediaRequest, StageOptions, ThumbnailPolicy, release_year};
use crate::pool::run_ordered;
use crate::stage::Stage;
use crate::ytdlp::{ExtractOptions, InfoRecord, SearchQuery};

/// Hit count used by the `search` command unless told otherwise.
pub const DEFAULT_RESULT_COUNT: usize = 3;

/// Index-aligned columns, one element per hit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchResults {
    pub titles: Vec<String>,
    pub artists: Vec<String>,
    pub release_years: Vec<String>,
    pub audio_paths: Vec<PathBuf>,
    pub thumbnail_paths: Vec<Option<PathBuf>>,
    pub source_urls: Vec<String>,
}

/// One row of [`SearchResults`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchHit<'a> {
    pub title: &'a str,
    pub artist: &'a str,
    pub release_year: &'a str,
    pub audio_path: &'a Path,
    pub thumbnail_path: Option<&'a Path>,
    pub source_url: &'a str,
}

impl SearchResults {
    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = SearchHit<'_>> {
        (0..self.len()).map(move |i| SearchHit {
            title: &self.titles[i],
            artist: &self.artists[i],
            release_year: &self.release_years[i],
            audio_path: &self.audio_paths[i],
            thumbnail_path: self.thumbnail_paths[i].as_deref(),
            source_url: &self.source_urls[i],
        })
    }
}

/// Release year of a search hit: `release_date` when known, else
/// `upload_date`.
fn hit_release_year(hit: &InfoRecord) -> String {
    release_year(hit.release_date.as_deref().or(hit.upload_date.as_deref()))
}

pub fn search_videos(settings: &RuntimeSettings, keyword: &str) -> Result<SearchResults> {
    search_with_count(settings, keyword, DEFAULT_RESULT_COUNT)
}

pub fn search_with_count(
    settings: &RuntimeSettings,
    keyword: &str,
    count: usize,
) -> Result<SearchResults> {
    let query = SearchQuery::new(keyword, count)?;
    settings.ensure_downloads_dir()?;
    let fetcher = Fetcher::new(settings);

    let info = fetcher
        .ytdlp()
        .extract(&query.to_url(), &ExtractOptions::search())
        .with_context(|| Stage::Search.failed(query.keyword()))?;

    let mut hits = Vec::new();
    for hit in info.entries().take(query.count()) {
        let url = hit
            .item_url()
            .with_context(|| format!("search hit without a url for {}", query.keyword()))?;
        hits.push((MediaRequest::audio(url), hit_release_year(hit)));
    }
    let total = hits.len();
    info!(keyword = query.keyword(), hits = total, "search resolved");

    let staged = run_ordered(hits, settings.jobs, |index, (request, year)| {
        info!("[{}/{}] {}", index + 1, total, request.url);
        Ok((fetcher.stage(&request, StageOptions::PLAIN)?, year))
    })?;

    let mut results = SearchResults::default();
    for (item, year) in staged {
        let fetched = item.place_audio(fetcher.downloads_dir(), ThumbnailPolicy::Keep)?;
        results.titles.push(fetched.title);
        results.artists.push(fetched.artist);
        results.release_years.push(year);
        results.audio_paths.push(fetched.audio_path);
        results.thumbnail_paths.push(fetched.thumbnail_path);
        results.source_urls.push(fetched.source_url);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn release_date_wins_over_upload_date() {
        let mut hit = InfoRecord::default();
        hit.upload_date = Some("20200101".to_string());
        assert_eq!(hit_release_year(&hit), "2020");

        hit.release_date = Some("19991231".to_string());
        assert_eq!(hit_release_year(&hit), "1999");
    }

    #[test]
    fn blank_keyword_is_rejected_before_any_work() {
        let dir = tempdir().unwrap();
        let settings = RuntimeSettings::with_downloads_dir(dir.path().join("downloads"));
        assert!(search_with_count(&settings, "  ", 3).is_err());
        assert!(!settings.downloads_dir.exists());
    }

    #[cfg(unix)]
    #[test]
    fn failed_thumbnail_leaves_a_gap_only_at_its_index() -> Result<()> {
        use crate::tagger::read_tags;
        use crate::testing::{serve_thumbnails, stub_settings};

        let thumbs = serve_thumbnails();
        let root = tempdir()?;
        let settings = stub_settings(root.path(), &thumbs)?;

        let results = search_videos(&settings, "lofi beats")?;

        assert_eq!(results.len(), 3);
        assert_eq!(results.titles, vec!["Video s1", "Bad Thumb", "Video s3"]);
        assert_eq!(results.artists[0], "Uploader s1");
        assert_eq!(results.release_years, vec!["2020", "2020", "2020"]);
        assert_eq!(results.audio_paths[2], settings.downloads_dir.join("Video s3.mp3"));
        assert_eq!(
            results.thumbnail_paths,
            vec![
                Some(settings.downloads_dir.join("Video s1.jpg")),
                None,
                Some(settings.downloads_dir.join("Video s3.jpg")),
            ]
        );
        assert_eq!(results.source_urls[1], "https://www.youtube.com/watch?v=badthumb");

        // Search results are left untagged.
        assert!(read_tags(&results.audio_paths[0]).is_err());

        let rows: Vec<_> = results.rows().collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].title, "Bad Thumb");
        assert_eq!(rows[1].thumbnail_path, None);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn count_limits_hits() -> Result<()> {
        use crate::testing::stub_settings;

        let root = tempdir()?;
        let mut settings = stub_settings(root.path(), "http://127.0.0.1:9")?;
        settings.jobs = 4;

        let results = search_with_count(&settings, "anything", 5)?;
        assert_eq!(results.len(), 5);
        assert_eq!(results.titles[4], "Video s5");
        assert!(results.thumbnail_paths.iter().all(Option::is_none));
        Ok(())
    }
}
