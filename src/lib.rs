#![forbid(unsafe_code)]

//! Fetch audio and video with `yt-dlp`, tag the audio and bundle collections
//! into zip archives.
//!
//! The pipelines ([`playlist`], [`video`], [`search`]) sit on top of the
//! single-item [`fetcher`], which in turn drives [`ytdlp`], [`thumbnail`] and
//! [`tagger`].

pub mod archive;
pub mod collection;
pub mod config;
pub mod fetcher;
pub mod logging;
pub mod naming;
pub mod playlist;
pub mod pool;
pub mod sanitize;
pub mod search;
pub mod stage;
pub mod tagger;
pub mod thumbnail;
pub mod video;
pub mod ytdlp;

#[cfg(test)]
mod testing;
