// Keyed melody collections with bulk loading from directories and archives

mod loader;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::melody::Melody;
use crate::reader::{default_readers, MelodyReader};

/// Error type for collection operations
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error("source path does not exist: {0}")]
    SourceNotFound(PathBuf),

    #[error("source is neither a directory nor a zip archive: {0}")]
    InvalidSource(PathBuf),

    #[error("failed to open archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("melody id already present: {0}")]
    DuplicateId(String),

    #[error("no melody with id: {0}")]
    NotFound(String),
}

/// A set of melodies keyed by unique id, iterated in insertion order.
///
/// Built either empty via [`MelodyCollection::new`] or by bulk-loading a
/// directory tree or `.zip` archive via [`MelodyCollection::load`]. Loading
/// isolates per-file failures: a corrupt file is logged and skipped, never
/// aborting the batch. Ids are unique; `add` refuses duplicates rather than
/// overwriting.
///
/// Not synchronized; callers sharing a collection across threads wrap it in
/// their own lock.
#[derive(Debug)]
pub struct MelodyCollection {
    name: String,
    melodies: HashMap<String, Melody>,
    // Insertion order of melody ids, the iteration contract
    order: Vec<String>,
}

impl MelodyCollection {
    /// Create an empty collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            melodies: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Bulk-load a collection from a directory tree or `.zip` archive using
    /// the default reader set. The collection is named after the source
    /// path's stem unless `name` is given.
    ///
    /// Fails when the path does not exist, is neither a directory nor a zip
    /// archive, or is an archive that cannot be opened. Failures of
    /// individual files inside a valid source are logged and skipped.
    pub fn load(path: impl AsRef<Path>, name: Option<&str>) -> Result<Self, CollectionError> {
        Self::load_with_readers(path, name, &default_readers())
    }

    /// [`MelodyCollection::load`] with a caller-supplied reader set,
    /// consulted in order (first `accept` wins).
    pub fn load_with_readers(
        path: impl AsRef<Path>,
        name: Option<&str>,
        readers: &[Box<dyn MelodyReader>],
    ) -> Result<Self, CollectionError> {
        let path = path.as_ref();
        let name = name
            .map(String::from)
            .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_default();

        let mut collection = Self::new(name);
        loader::load_source(&mut collection, path, readers)?;
        Ok(collection)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a melody under its id. Ids are unique; an already-present id is
    /// an error and leaves the collection unchanged.
    pub fn add(&mut self, melody: Melody) -> Result<(), CollectionError> {
        let id = melody.id().to_string();
        if self.melodies.contains_key(&id) {
            return Err(CollectionError::DuplicateId(id));
        }
        self.melodies.insert(id.clone(), melody);
        self.order.push(id);
        Ok(())
    }

    pub fn get(&self, melody_id: &str) -> Result<&Melody, CollectionError> {
        self.melodies
            .get(melody_id)
            .ok_or_else(|| CollectionError::NotFound(melody_id.to_string()))
    }

    /// Remove and return a melody by id.
    pub fn remove(&mut self, melody_id: &str) -> Result<Melody, CollectionError> {
        let melody = self
            .melodies
            .remove(melody_id)
            .ok_or_else(|| CollectionError::NotFound(melody_id.to_string()))?;
        self.order.retain(|id| id != melody_id);
        Ok(melody)
    }

    /// Remove every melody. Never fails.
    pub fn clear(&mut self) {
        self.melodies.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.melodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.melodies.is_empty()
    }

    pub fn contains(&self, melody_id: &str) -> bool {
        self.melodies.contains_key(melody_id)
    }

    /// Melody ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Melodies in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Melody> {
        self.order.iter().map(|id| &self.melodies[id])
    }
}

impl<'a> IntoIterator for &'a MelodyCollection {
    type Item = &'a Melody;
    type IntoIter = Box<dyn Iterator<Item = &'a Melody> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
