//! Inputs supplied by collaborators: directory listings, resolved directives and decoded
//! pixels. The CLI implements these over the filesystem; [`MemoryTree`] and
//! [`MemorySprites`] serve in-memory callers and tests.

use crate::error::{AtlasError, Result};
use crate::tree::Directives;
use image::RgbaImage;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
        }
    }
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
        }
    }
}

/// Lists directories by their slash-separated tree path.
pub trait DirectorySource {
    /// Entries directly inside `path`, in any order. An error omits the subtree.
    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>>;
    /// Directives declared on `path`. An error aborts the scan.
    fn directives(&self, path: &str) -> Result<Directives>;
}

/// In-memory directory tree built from a flat listing of paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryTree {
    dirs: BTreeMap<String, BTreeSet<(bool, String)>>,
    directives: HashMap<String, Directives>,
    unreadable: BTreeSet<String>,
}

impl MemoryTree {
    pub fn new(root: &str) -> Self {
        let mut t = Self::default();
        t.dirs.insert(root.to_string(), BTreeSet::new());
        t
    }

    /// Adds a directory and any missing ancestors.
    pub fn dir(mut self, path: &str) -> Self {
        self.insert(path, true);
        self
    }

    /// Adds a file and any missing ancestor directories.
    pub fn file(mut self, path: &str) -> Self {
        self.insert(path, false);
        self
    }

    pub fn files<'a>(mut self, paths: impl IntoIterator<Item = &'a str>) -> Self {
        for p in paths {
            self.insert(p, false);
        }
        self
    }

    pub fn with_directives(mut self, path: &str, d: Directives) -> Self {
        self.insert(path, true);
        self.directives.insert(path.to_string(), d);
        self
    }

    /// Makes `read_dir(path)` fail.
    pub fn unreadable(mut self, path: &str) -> Self {
        self.insert(path, true);
        self.unreadable.insert(path.to_string());
        self
    }

    fn insert(&mut self, path: &str, is_dir: bool) {
        if is_dir {
            self.dirs.entry(path.to_string()).or_default();
        }
        if let Some((parent, name)) = path.rsplit_once('/') {
            self.insert(parent, true);
            if let Some(entries) = self.dirs.get_mut(parent) {
                entries.insert((is_dir, name.to_string()));
            }
        }
    }
}

impl DirectorySource for MemoryTree {
    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        if self.unreadable.contains(path) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, path.to_string()));
        }
        let entries = self
            .dirs
            .get(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))?;
        Ok(entries
            .iter()
            .map(|(is_dir, name)| {
                if *is_dir {
                    DirEntry::dir(name.clone())
                } else {
                    DirEntry::file(name.clone())
                }
            })
            .collect())
    }

    fn directives(&self, path: &str) -> Result<Directives> {
        Ok(self.directives.get(path).copied().unwrap_or_default())
    }
}

/// Decoded pixels of one source image.
#[derive(Debug, Clone)]
pub enum DecodedSprite {
    Static(RgbaImage),
    /// Frames in playback order.
    Animated(Vec<RgbaImage>),
}

/// Decodes source images by key (tree path).
///
/// Implementations must be shareable across threads; decoding may run on a worker pool.
pub trait SpriteSource: Sync {
    /// Decodes `key`. For animations at most `max_frames` frames are returned.
    /// An error drops the unit from packing.
    fn load(&self, key: &str, animated: bool, max_frames: u32) -> Result<DecodedSprite>;
}

/// Pre-decoded sprites keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemorySprites {
    sprites: HashMap<String, DecodedSprite>,
}

impl MemorySprites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, sprite: DecodedSprite) {
        self.sprites.insert(key.into(), sprite);
    }

    pub fn with(mut self, key: impl Into<String>, sprite: DecodedSprite) -> Self {
        self.insert(key, sprite);
        self
    }
}

impl SpriteSource for MemorySprites {
    fn load(&self, key: &str, _animated: bool, max_frames: u32) -> Result<DecodedSprite> {
        match self.sprites.get(key) {
            Some(DecodedSprite::Animated(frames)) => Ok(DecodedSprite::Animated(
                frames.iter().take(max_frames as usize).cloned().collect(),
            )),
            Some(s) => Ok(s.clone()),
            None => Err(AtlasError::CorruptSource {
                key: key.to_string(),
                reason: "no decoded pixels".into(),
            }),
        }
    }
}
