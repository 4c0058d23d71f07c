#![forbid(unsafe_code)]

//! `dynamo`: command-line front end for the download, tag and bundle
//! pipelines.

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use dynamo_tools::config::{RuntimeOverrides, RuntimeSettings, resolve_runtime_settings};
use dynamo_tools::fetcher::Fetcher;
use dynamo_tools::logging;
use dynamo_tools::playlist::process_playlist;
use dynamo_tools::search::{DEFAULT_RESULT_COUNT, search_with_count};
use dynamo_tools::tagger::{TagOverrides, retag};
use dynamo_tools::video::{VideoOutcome, video_pipeline};
use dynamo_tools::ytdlp::YtDlp;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about = "Download, tag and bundle media with yt-dlp.")]
struct Cli {
    #[arg(
        long = "downloads-dir",
        value_name = "PATH",
        global = true,
        help = "Directory that receives every artifact (default ./downloads)"
    )]
    downloads_dir: Option<PathBuf>,
    #[arg(
        long = "env-file",
        value_name = "PATH",
        global = true,
        help = "Settings file to read (default ./.env)"
    )]
    env_file: Option<PathBuf>,
    #[arg(
        short = 'j',
        long = "jobs",
        value_name = "N",
        global = true,
        help = "Items fetched in parallel by playlist, video and search runs"
    )]
    jobs: Option<usize>,
    #[arg(
        long = "yt-dlp",
        value_name = "PATH",
        global = true,
        help = "yt-dlp executable to run"
    )]
    yt_dlp: Option<PathBuf>,
    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        global = true,
        help = "More log output; repeat for more"
    )]
    verbose: u8,
    #[arg(long = "json", global = true, help = "Print results as JSON")]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download one URL as a tagged mp3 with its thumbnail
    Audio { url: String },
    /// Write tags into an existing audio file
    Tag(TagArgs),
    /// Download a playlist as tagged, numbered mp3s bundled in playlist.zip
    Playlist { url: String },
    /// Download a video, or every video of a playlist into videos.zip
    Video { url: String },
    /// Search and download the top hits as mp3
    Search {
        keyword: String,
        #[arg(short = 'n', long = "count", default_value_t = DEFAULT_RESULT_COUNT)]
        count: usize,
    },
}

#[derive(Args, Debug)]
struct TagArgs {
    file: PathBuf,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    artist: Option<String>,
    #[arg(long)]
    album: Option<String>,
    #[arg(long = "album-artist")]
    album_artist: Option<String>,
    #[arg(long = "year")]
    year: Option<String>,
    #[arg(long)]
    genre: Option<String>,
    #[arg(long = "track")]
    track: Option<u32>,
    #[arg(long, value_name = "IMAGE")]
    cover: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    let settings = resolve_runtime_settings(RuntimeOverrides {
        downloads_dir: cli.downloads_dir.clone(),
        yt_dlp: cli.yt_dlp.clone(),
        jobs: cli.jobs,
        env_path: cli.env_file.clone(),
    })?;
    let json = cli.json;

    // Tagging is local; everything else needs a working yt-dlp.
    if !matches!(cli.command, Command::Tag(_)) {
        YtDlp::from_settings(&settings).ensure_available()?;
    }

    match cli.command {
        Command::Audio { url } => run_audio(&settings, &url, json),
        Command::Tag(args) => run_tag(args, json),
        Command::Playlist { url } => run_playlist(&settings, &url, json),
        Command::Video { url } => run_video(&settings, &url, json),
        Command::Search { keyword, count } => run_search(&settings, &keyword, count, json),
    }
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce(&T)) -> Result<()> {
    if json {
        let rendered =
            serde_json::to_string_pretty(value).context("Failed to serialize result")?;
        println!("{rendered}");
    } else {
        text(value);
    }
    Ok(())
}

fn optional_path(path: Option<&Path>) -> String {
    path.map(|path| path.display().to_string())
        .unwrap_or_else(|| "none".to_string())
}

fn run_audio(settings: &RuntimeSettings, url: &str, json: bool) -> Result<()> {
    let fetched = Fetcher::new(settings).fetch_audio(url)?;
    emit(json, &fetched, |fetched| {
        println!("Audio: {}", fetched.audio_path.display());
        println!("Thumbnail: {}", optional_path(fetched.thumbnail_path.as_deref()));
        println!("Title: {}", fetched.title);
        println!("Artist: {}", fetched.artist);
        println!("Album: {}", fetched.album);
        println!("Year: {}", fetched.release_year);
    })
}

fn run_playlist(settings: &RuntimeSettings, url: &str, json: bool) -> Result<()> {
    let outcome = process_playlist(settings, url)?;
    emit(json, &outcome, |outcome| {
        for track in &outcome.tracks {
            println!(
                "{:>3}. {}",
                track.track_number.unwrap_or_default(),
                track.audio_path.display()
            );
        }
        println!("Archive: {}", outcome.archive_path.display());
    })
}

fn run_video(settings: &RuntimeSettings, url: &str, json: bool) -> Result<()> {
    let outcome = video_pipeline(settings, url)?;
    emit(json, &outcome, |outcome| match outcome {
        VideoOutcome::Single { video } => println!("Video: {}", video.video_path.display()),
        VideoOutcome::Collection {
            archive_path,
            videos,
        } => {
            for video in videos {
                println!("  {}", video.video_path.display());
            }
            println!("Archive: {}", archive_path.display());
        }
    })
}

fn run_search(settings: &RuntimeSettings, keyword: &str, count: usize, json: bool) -> Result<()> {
    let results = search_with_count(settings, keyword, count)?;
    emit(json, &results, |results| {
        if results.is_empty() {
            println!("No results for {keyword}");
        }
        for (index, hit) in results.rows().enumerate() {
            println!("{}. {} - {} ({})", index + 1, hit.title, hit.artist, hit.release_year);
            println!("   Audio: {}", hit.audio_path.display());
            println!("   Thumbnail: {}", optional_path(hit.thumbnail_path));
            println!("   Source: {}", hit.source_url);
        }
    })
}

fn run_tag(args: TagArgs, json: bool) -> Result<()> {
    let overrides = TagOverrides {
        title: args.title,
        artist: args.artist,
        album: args.album,
        album_artist: args.album_artist,
        release_year: args.year,
        genre: args.genre,
        track_number: args.track,
        cover: args.cover,
    };
    let tags = retag(&args.file, overrides)?;
    emit(json, &tags, |tags| {
        println!("Tagged: {}", args.file.display());
        println!("Title: {}", tags.title);
        println!("Artist: {}", tags.artist);
        println!("Album: {} ({})", tags.album, tags.album_artist);
        println!("Year: {}", tags.release_year);
    })
}
