//! Test doubles shared by the module tests: a scripted `yt-dlp` and a tiny
//! HTTP server for thumbnails.

use anyhow::Result;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::fs;
use std::io::{BufRead, BufReader, Cursor, Write};
use std::net::TcpListener;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::Duration;

use crate::config::RuntimeSettings;

pub const THUMB_WIDTH: u32 = 16;
pub const THUMB_HEIGHT: u32 = 8;
#[cfg(unix)]
const ETXTBSY: i32 = 26;

/// Writes an executable bash script that mimics the yt-dlp calls the
/// pipelines make. `thumbs` is the base URL thumbnails point at.
pub fn install_ytdlp_stub(dir: &Path, thumbs: &str) -> Result<PathBuf> {
    let script_path = dir.join("yt-dlp");
    let script = r#"#!/usr/bin/env bash
set -eu
args=("$@")
url="${args[${#args[@]}-1]}"
output=""
merge=""
audio=""
flat=""
download=""
while [[ $# -gt 0 ]]; do
  case "$1" in
    --output) shift; output="$1" ;;
    --merge-output-format) shift; merge="$1" ;;
    --audio-format) shift; audio="$1" ;;
    --flat-playlist) flat="1" ;;
    --no-simulate) download="1" ;;
    --version) echo "2025.01.01"; exit 0 ;;
  esac
  shift
done

if [[ "$url" == *removed* ]]; then
  echo "ERROR: [youtube] removed: Video unavailable" >&2
  exit 1
fi

record() {
  local id="$1"
  local page="https://www.youtube.com/watch?v=$id"
  local title="Video $id" uploader="Uploader $id" date="20200101" thumb="__THUMBS__/ok/$id.jpg"
  case "$id" in
    charter) page="https://music.youtube.com/watch?v=charter"; title="Charter Cities"; uploader="Epic Mountain - Topic"; date="20240115" ;;
    rick) title="Rick Astley - Never Gonna Give You Up (Official Music Video)"; uploader="Rick Astley"; date="20091025" ;;
    badthumb) title="Bad Thumb"; thumb="__THUMBS__/missing/$id.jpg" ;;
    t1) title="Track One" ;;
    t2) title="Track Two" ;;
    t3) title="Track Three" ;;
    dup*) title="Same Title" ;;
  esac
  if [[ "$id" == "nothumb" ]]; then
    printf '{"id":"%s","title":"No Thumb!","webpage_url":"%s"' "$id" "$page"
    return
  fi
  printf '{"id":"%s","title":"%s","uploader":"%s","upload_date":"%s","release_date":"%s","thumbnail":"%s","webpage_url":"%s"' \
    "$id" "$title" "$uploader" "$date" "$date" "$thumb" "$page"
}

if [[ "$url" == ytsearch* ]]; then
  count="${url%%:*}"
  count="${count#ytsearch}"
  printf '{"_type":"playlist","title":"search","entries":['
  i=0
  for id in s1 badthumb s3 s4 s5; do
    if [[ $i -ge $count ]]; then break; fi
    if [[ $i -gt 0 ]]; then printf ','; fi
    record "$id"
    printf '}'
    i=$((i+1))
  done
  printf ']}\n'
  exit 0
fi

if [[ "$url" == *list=* ]]; then
  if [[ -n "$flat" ]]; then
    case "$url" in
      *list=empty*) printf '{"_type":"playlist","title":"Empty","entries":[]}\n' ;;
      *list=dups*) printf '{"_type":"playlist","title":"Dups","entries":[{"url":"https://www.youtube.com/watch?v=dup1"},{"url":"https://www.youtube.com/watch?v=dup2"}]}\n' ;;
      *list=broken*) printf '{"_type":"playlist","title":"Broken","entries":[{"url":"https://www.youtube.com/watch?v=t1"},{"url":"https://www.youtube.com/watch?v=removed"},{"url":"https://www.youtube.com/watch?v=t3"}]}\n' ;;
      *) printf '{"_type":"playlist","title":"Mix","entries":[{"url":"https://www.youtube.com/watch?v=t1"},null,{"url":"https://www.youtube.com/watch?v=t2"},{"id":"t3"}]}\n' ;;
    esac
    exit 0
  fi
fi

id="${url##*v=}"
id="${id%%&*}"

if [[ -n "$download" ]]; then
  mkdir -p "$(dirname "$output")"
  if [[ -n "$audio" ]]; then
    target="${output//%(ext)s/$audio}"
    # MPEG frame sync first, so the file never looks like an ID3 header.
    printf '\xFF\xFBfake audio for %s' "$id" > "$target"
    record "$id"
    printf ',"filename":"%s","requested_downloads":[{"filepath":"%s"}]}\n' "${output//%(ext)s/webm}" "$target"
  else
    target="${output//%(ext)s/$merge}"
    printf 'fake video for %s' "$id" > "$target"
    record "$id"
    printf ',"filename":"%s"}\n' "${output//%(ext)s/webm}"
  fi
  exit 0
fi

record "$id"
printf '}\n'
exit 0
"#
    .replace("__THUMBS__", thumbs);

    fs::write(&script_path, script)?;
    #[cfg(unix)]
    {
        let mut perms = fs::metadata(&script_path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script_path, perms)?;

        // A child forked by a parallel test while the script was open for
        // writing keeps it busy until that child execs.
        for _ in 0..50 {
            match Command::new(&script_path).arg("--version").output() {
                Err(err) if err.raw_os_error() == Some(ETXTBSY) => {
                    thread::sleep(Duration::from_millis(20));
                }
                _ => break,
            }
        }
    }
    Ok(script_path)
}

/// Settings rooted at `{root}/downloads` that run the stub instead of the
/// real yt-dlp.
pub fn stub_settings(root: &Path, thumbs: &str) -> Result<RuntimeSettings> {
    let mut settings = RuntimeSettings::with_downloads_dir(root.join("downloads"));
    settings.yt_dlp = install_ytdlp_stub(root, thumbs)?;
    settings.http_timeout_secs = 5;
    Ok(settings)
}

/// JPEG bytes of a solid `THUMB_WIDTH` x `THUMB_HEIGHT` image.
pub fn sample_jpeg() -> Vec<u8> {
    let img = RgbImage::from_pixel(THUMB_WIDTH, THUMB_HEIGHT, Rgb([200, 40, 40]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .unwrap();
    buf
}

/// Serves `sample_jpeg()` under `/ok/...` and 404 everywhere else. Returns the
/// base URL. The server thread lives until the test process exits.
pub fn serve_thumbnails() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let body = sample_jpeg();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let Ok(reader_stream) = stream.try_clone() else {
                continue;
            };
            let mut reader = BufReader::new(reader_stream);
            let mut request_line = String::new();
            if reader.read_line(&mut request_line).is_err() {
                continue;
            }
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) if line == "\r\n" || line == "\n" => break,
                    Ok(_) => {}
                    Err(_) => break,
                }
            }

            let path = request_line.split_whitespace().nth(1).unwrap_or("/");
            let response = if path.starts_with("/ok/") {
                let mut head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                )
                .into_bytes();
                head.extend_from_slice(&body);
                head
            } else {
                b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec()
            };
            let _ = stream.write_all(&response);
            let _ = stream.flush();
        }
    });

    format!("http://{addr}")
}
