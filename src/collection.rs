#![forbid(unsafe_code)]

//! Collection expansion and the single-vs-collection check.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::stage::Stage;
use crate::ytdlp::{ExtractOptions, InfoRecord, YtDlp};

/// Ordered member URLs of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionManifest {
    pub source_url: String,
    pub title: Option<String>,
    pub members: Vec<String>,
}

impl CollectionManifest {
    fn from_info(source_url: &str, info: &InfoRecord) -> Self {
        Self {
            source_url: source_url.to_string(),
            title: info.title.clone(),
            members: info.entries().filter_map(InfoRecord::item_url).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum Classified {
    Single(InfoRecord),
    Collection(CollectionManifest),
}

/// Flat-extracts `url` into its member URLs. Unavailable members are skipped;
/// any resolution error is returned as-is, never a partial manifest.
pub fn expand(ytdlp: &YtDlp, url: &str) -> Result<CollectionManifest> {
    let info = ytdlp
        .extract(url, &ExtractOptions::flat())
        .with_context(|| Stage::Expand.failed(url))?;
    let manifest = CollectionManifest::from_info(url, &info);
    info!(url, members = manifest.len(), "expanded collection");
    Ok(manifest)
}

/// Probes `url` once with flat extraction. A nonempty member list means
/// collection, anything else is a single item.
pub fn classify(ytdlp: &YtDlp, url: &str) -> Result<Classified> {
    let info = ytdlp
        .extract(url, &ExtractOptions::flat())
        .with_context(|| Stage::Resolve.failed(url))?;
    if info.has_entries() {
        Ok(Classified::Collection(CollectionManifest::from_info(url, &info)))
    } else {
        Ok(Classified::Single(info))
    }
}
