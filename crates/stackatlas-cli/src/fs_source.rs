//! Filesystem implementations of the core's input traits.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, ImageReader, RgbaImage};
use stackatlas_core::{
    AtlasError, DecodedSprite, DirEntry, DirectorySource, Directives, GridShape, SpriteSource,
    GRID_LAYOUT_MARKER, NO_ACCUMULATE_MARKER, STOP_ACCUMULATE_MARKER,
};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Maps slash-separated tree paths (`<root name>/a/b`) onto a directory on disk.
#[derive(Debug, Clone)]
pub struct TreeRoot {
    dir: PathBuf,
    name: String,
}

impl TreeRoot {
    pub fn new(input: &Path) -> anyhow::Result<Self> {
        let dir = input.canonicalize()?;
        if !dir.is_dir() {
            anyhow::bail!("input {} is not a directory", input.display());
        }
        let name = dir
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("root")
            .to_string();
        Ok(Self { dir, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path below the root, without the root name (`""` for the root itself).
    fn relative<'a>(&self, tree_path: &'a str) -> &'a str {
        tree_path
            .strip_prefix(self.name.as_str())
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(tree_path)
    }

    pub fn resolve(&self, tree_path: &str) -> PathBuf {
        let rel = self.relative(tree_path);
        if rel.is_empty() {
            self.dir.clone()
        } else {
            self.dir.join(rel)
        }
    }
}

/// Directory listings and marker-file directives read from disk.
pub struct FsTree {
    root: TreeRoot,
    exclude: Option<GlobSet>,
}

impl FsTree {
    /// `exclude` globs are matched against paths relative to the input directory.
    pub fn new(root: TreeRoot, exclude: &[String]) -> anyhow::Result<Self> {
        let exclude = if exclude.is_empty() {
            None
        } else {
            let mut b = GlobSetBuilder::new();
            for pat in exclude {
                b.add(Glob::new(pat)?);
            }
            Some(b.build()?)
        };
        Ok(Self { root, exclude })
    }

    fn excluded(&self, rel: &str) -> bool {
        self.exclude.as_ref().is_some_and(|set| set.is_match(rel))
    }
}

impl DirectorySource for FsTree {
    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        let dir = self.root.resolve(path);
        let rel_dir = self.root.relative(path);
        let mut out = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) if e.depth() == 0 => {
                    return Err(e
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::other(format!("cannot list {}", dir.display()))));
                }
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "skip entry");
                    continue;
                }
            };
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(path = %entry.path().display(), "skip non UTF-8 name");
                continue;
            };
            let rel = if rel_dir.is_empty() {
                name.clone()
            } else {
                format!("{rel_dir}/{name}")
            };
            if self.excluded(&rel) {
                debug!(%rel, "excluded");
                continue;
            }
            // follows symlinks when classifying
            if entry.path().is_dir() {
                out.push(DirEntry::dir(name));
            } else {
                out.push(DirEntry::file(name));
            }
        }
        Ok(out)
    }

    fn directives(&self, path: &str) -> stackatlas_core::Result<Directives> {
        let dir = self.root.resolve(path);
        let marker = dir.join(GRID_LAYOUT_MARKER);
        let grid_shape = if marker.is_file() {
            let raw = std::fs::read_to_string(&marker).map_err(|e| {
                AtlasError::InvalidConfig(format!(
                    "cannot read {GRID_LAYOUT_MARKER} of {path} ({}): {e}",
                    marker.display()
                ))
            })?;
            Some(GridShape::parse(path, &raw)?)
        } else {
            None
        };
        Ok(Directives {
            grid_shape,
            no_accumulate: dir.join(NO_ACCUMULATE_MARKER).exists(),
            stop_accumulate: dir.join(STOP_ACCUMULATE_MARKER).exists(),
        })
    }
}

/// Decodes images from disk; GIFs yield their frames in playback order.
pub struct FsSprites {
    root: TreeRoot,
}

impl FsSprites {
    pub fn new(root: TreeRoot) -> Self {
        Self { root }
    }
}

impl SpriteSource for FsSprites {
    fn load(&self, key: &str, animated: bool, max_frames: u32) -> stackatlas_core::Result<DecodedSprite> {
        let path = self.root.resolve(key);
        if animated {
            let decoder = GifDecoder::new(BufReader::new(File::open(&path)?))?;
            let frames: Vec<RgbaImage> = decoder
                .into_frames()
                .take(max_frames as usize)
                .map(|f| f.map(|frame| frame.into_buffer()))
                .collect::<Result<_, _>>()?;
            return Ok(DecodedSprite::Animated(frames));
        }
        let img = ImageReader::open(&path)?.with_guessed_format()?.decode()?;
        Ok(DecodedSprite::Static(img.to_rgba8()))
    }
}
