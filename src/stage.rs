#![forbid(unsafe_code)]

use std::fmt;

/// Names the pipeline step an error came from. Rendered inside `anyhow`
/// contexts so failures read like `download failed for <url>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    Download,
    Place,
    Thumbnail,
    Tag,
    Expand,
    Archive,
    Search,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Resolve => "resolve",
            Stage::Download => "download",
            Stage::Place => "place",
            Stage::Thumbnail => "thumbnail",
            Stage::Tag => "tag",
            Stage::Expand => "expand",
            Stage::Archive => "archive",
            Stage::Search => "search",
        }
    }

    /// Context message for a failure of this stage on `subject`.
    pub fn failed(self, subject: impl fmt::Display) -> String {
        format!("{} failed for {}", self.label(), subject)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
