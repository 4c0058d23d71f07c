#![forbid(unsafe_code)]

//! Bundles finished artifacts into a single deflated zip.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::Builder;
use tracing::{debug, info};
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

use crate::stage::Stage;

const TMP_PREFIX: &str = ".archive-";
const TMP_SUFFIX: &str = ".zip.tmp";

/// Writes every file in `paths` into a zip at `dest`, one entry per file
/// named after its base name. A base name seen twice is stored once.
///
/// The archive is assembled in a temporary file next to `dest` and persisted
/// over it at the end. On any error the temporary file is dropped, so a
/// failed run never leaves a truncated bundle behind.
pub fn write_archive(dest: &Path, paths: &[PathBuf]) -> Result<PathBuf> {
    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;

    let tmp = Builder::new()
        .prefix(TMP_PREFIX)
        .suffix(TMP_SUFFIX)
        .tempfile_in(parent)
        .with_context(|| format!("creating temporary archive in {}", parent.display()))?;
    let mut zip = ZipWriter::new(tmp);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut seen = HashSet::new();
    for path in paths {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .with_context(|| format!("{} has no file name", path.display()))?;
        if !seen.insert(name.clone()) {
            debug!(entry = %name, "skipping duplicate archive entry");
            continue;
        }

        zip.start_file(name.as_str(), options)
            .with_context(|| format!("starting archive entry {name}"))?;
        let mut source =
            File::open(path).with_context(|| format!("opening {}", path.display()))?;
        io::copy(&mut source, &mut zip)
            .with_context(|| format!("compressing {}", path.display()))?;
    }

    let tmp = zip
        .finish()
        .with_context(|| Stage::Archive.failed(dest.display()))?;
    tmp.persist(dest)
        .map_err(|err| err.error)
        .with_context(|| format!("moving archive into {}", dest.display()))?;

    info!(archive = %dest.display(), entries = seen.len(), "archive written");
    Ok(dest.to_path_buf())
}

#[cfg(test)]
pub(crate) fn entry_names(path: &Path) -> Result<Vec<String>> {
    let archive = zip::ZipArchive::new(File::open(path)?)?;
    Ok(archive.file_names().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    fn leftover_temporaries(dir: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if name.ends_with(TMP_SUFFIX) {
                names.push(name);
            }
        }
        Ok(names)
    }

    #[test]
    fn stores_base_names_and_contents() -> Result<()> {
        let dir = tempdir()?;
        let a = dir.path().join("One.mp3");
        let b = dir.path().join("nested").join("Two.mp3");
        fs::create_dir_all(b.parent().unwrap())?;
        fs::write(&a, b"first")?;
        fs::write(&b, b"second")?;

        let dest = dir.path().join("playlist.zip");
        let written = write_archive(&dest, &[a, b])?;
        assert_eq!(written, dest);

        let mut names = entry_names(&dest)?;
        names.sort();
        assert_eq!(names, vec!["One.mp3", "Two.mp3"]);

        let mut archive = zip::ZipArchive::new(File::open(&dest)?)?;
        let mut contents = String::new();
        archive.by_name("Two.mp3")?.read_to_string(&mut contents)?;
        assert_eq!(contents, "second");
        assert!(leftover_temporaries(dir.path())?.is_empty());
        Ok(())
    }

    #[test]
    fn duplicate_names_are_stored_once() -> Result<()> {
        let dir = tempdir()?;
        let a = dir.path().join("Same.mp3");
        fs::write(&a, b"x")?;
        let dest = dir.path().join("out.zip");
        write_archive(&dest, &[a.clone(), a])?;
        assert_eq!(entry_names(&dest)?, vec!["Same.mp3"]);
        Ok(())
    }

    #[test]
    fn empty_input_writes_empty_archive() -> Result<()> {
        let dir = tempdir()?;
        let dest = dir.path().join("empty.zip");
        write_archive(&dest, &[])?;
        assert!(entry_names(&dest)?.is_empty());
        Ok(())
    }

    #[test]
    fn missing_source_fails_without_leaving_files() -> Result<()> {
        let dir = tempdir()?;
        let present = dir.path().join("ok.mp3");
        fs::write(&present, b"ok")?;
        let dest = dir.path().join("playlist.zip");

        let err = write_archive(&dest, &[present, dir.path().join("gone.mp3")]).unwrap_err();
        assert!(format!("{err:#}").contains("gone.mp3"));

        assert!(!dest.exists());
        assert!(leftover_temporaries(dir.path())?.is_empty());
        let mut names: Vec<_> = fs::read_dir(dir.path())?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<io::Result<_>>()?;
        names.sort();
        assert_eq!(names, vec!["ok.mp3"]);
        Ok(())
    }

    #[test]
    fn rewrite_replaces_previous_archive() -> Result<()> {
        let dir = tempdir()?;
        let a = dir.path().join("A.mp3");
        let b = dir.path().join("B.mp3");
        fs::write(&a, b"a")?;
        fs::write(&b, b"b")?;
        let dest = dir.path().join("playlist.zip");

        write_archive(&dest, &[a])?;
        write_archive(&dest, &[b])?;
        assert_eq!(entry_names(&dest)?, vec!["B.mp3"]);
        Ok(())
    }
}
