// Bulk ingestion: directory walks and zip archives with per-item isolation

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::melody::Melody;
use crate::reader::MelodyReader;

use super::{CollectionError, MelodyCollection};

/// Load every accepted file under `path` into the collection.
///
/// The source must be an existing directory or `.zip` archive; anything else
/// is a construction error. Failures inside the source (unparseable files,
/// broken archive entries, duplicate ids) are logged and skipped so one bad
/// item never aborts the batch.
pub(super) fn load_source(
    collection: &mut MelodyCollection,
    path: &Path,
    readers: &[Box<dyn MelodyReader>],
) -> Result<(), CollectionError> {
    if !path.exists() {
        return Err(CollectionError::SourceNotFound(path.to_path_buf()));
    }

    if path.is_dir() {
        load_directory(collection, path, readers)
    } else if path.is_file() && has_zip_extension(path) {
        load_archive(collection, path, readers)
    } else {
        Err(CollectionError::InvalidSource(path.to_path_buf()))
    }
}

fn has_zip_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("zip"))
}

/// First registered reader accepting the file name, if any.
fn reader_for<'r>(
    readers: &'r [Box<dyn MelodyReader>],
    file_name: &str,
) -> Option<&'r dyn MelodyReader> {
    readers
        .iter()
        .find(|reader| reader.accept(file_name))
        .map(Box::as_ref)
}

fn load_directory(
    collection: &mut MelodyCollection,
    dir: &Path,
    readers: &[Box<dyn MelodyReader>],
) -> Result<(), CollectionError> {
    let mut files = Vec::new();
    collect_accepted_files(dir, readers, &mut files)?;

    if files.is_empty() {
        log::warn!("no melody files found in directory: {}", dir.display());
        return Ok(());
    }
    log::info!("found {} melody files in directory: {}", files.len(), dir.display());

    for file_path in files {
        let file_name = match file_path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => continue,
        };
        let melody_id = file_stem(&file_name);
        // collect_accepted_files only kept files some reader accepts
        let Some(reader) = reader_for(readers, &file_name) else {
            continue;
        };

        match reader.read(&melody_id, &file_path) {
            Ok(melody) => add_loaded(collection, melody, &file_path),
            Err(e) => log::error!("failed to parse {}: {e:#}", file_path.display()),
        }
    }
    Ok(())
}

/// Recursive walk collecting accepted files. Entries are visited in sorted
/// filename order so insertion order is reproducible across platforms.
fn collect_accepted_files(
    dir: &Path,
    readers: &[Box<dyn MelodyReader>],
    files: &mut Vec<PathBuf>,
) -> Result<(), CollectionError> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .collect();
    entries.sort();

    for path in entries {
        if path.is_dir() {
            collect_accepted_files(&path, readers, files)?;
        } else if let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) {
            if reader_for(readers, &name).is_some() {
                files.push(path);
            }
        }
    }
    Ok(())
}

fn load_archive(
    collection: &mut MelodyCollection,
    path: &Path,
    readers: &[Box<dyn MelodyReader>],
) -> Result<(), CollectionError> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let accepted = archive
        .file_names()
        .filter(|name| reader_for(readers, base_name(name)).is_some())
        .count();
    if accepted == 0 {
        log::warn!("no melody files found in archive: {}", path.display());
        return Ok(());
    }
    log::info!("found {accepted} melody files in archive: {}", path.display());

    // Scratch directory for extracted entries; removed on drop, on every
    // exit path
    let scratch = tempfile::tempdir()?;

    for index in 0..archive.len() {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                log::error!("unreadable archive entry #{index} in {}: {e}", path.display());
                continue;
            }
        };
        if entry.is_dir() {
            continue;
        }

        let entry_name = entry.name().to_string();
        let base = base_name(&entry_name).to_string();
        let Some(reader) = reader_for(readers, &base) else {
            continue;
        };
        let melody_id = file_stem(&base);

        // Extract to a flat, collision-free scratch path; the entry's own
        // directories are irrelevant past id derivation
        let extracted = scratch.path().join(format!("{index}_{base}"));
        let result = File::create(&extracted)
            .and_then(|mut out| std::io::copy(&mut entry, &mut out))
            .map_err(anyhow::Error::from)
            .and_then(|_| reader.read(&melody_id, &extracted));

        match result {
            Ok(melody) => add_loaded(collection, melody, Path::new(&entry_name)),
            Err(e) => log::error!("failed to extract and parse {entry_name}: {e:#}"),
        }
    }
    Ok(())
}

/// Add a bulk-loaded melody, demoting a duplicate id to a logged skip: the
/// first melody under an id wins, and nothing is overwritten.
fn add_loaded(collection: &mut MelodyCollection, melody: Melody, source: &Path) {
    let id = melody.id().to_string();
    match collection.add(melody) {
        Ok(()) => log::debug!("loaded melody: {id}"),
        Err(e) => log::warn!("skipping {}: {e}", source.display()),
    }
}

/// Final path component of an archive entry name.
fn base_name(entry_name: &str) -> &str {
    entry_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(entry_name)
}

/// File name with the final extension stripped, the melody id rule.
fn file_stem(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string())
}
