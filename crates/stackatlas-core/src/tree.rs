//! Folder-tree aggregation.
//!
//! [`aggregate_tree`] walks a [`DirectorySource`] post-order and builds a [`TreeNode`] per
//! directory. Each node carries its own images/documents and an aggregated view that rolls
//! up its descendants:
//!
//! - images always propagate upward;
//! - a child with `stop_accumulate` contributes no text at all to its parent;
//! - a child with `no_accumulate` keeps its own texts out of its parent's view, while texts
//!   it received from its own children still pass through.

use crate::error::{AtlasError, Result};
use crate::source::{DirEntry, DirectorySource, EntryKind};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use tracing::{instrument, warn};

/// Marker file names read as directives; never classified as content.
pub const GRID_LAYOUT_MARKER: &str = ".grid_layout";
pub const NO_ACCUMULATE_MARKER: &str = ".no_accum";
pub const STOP_ACCUMULATE_MARKER: &str = ".stop_accum";

/// Names skipped at every depth unless overridden in [`ScanOptions`].
pub const DEFAULT_IGNORED: &[&str] = &[
    "venv",
    "__pycache__",
    ".git",
    "spritesheets",
    "images",
    "backup",
];

/// What a file contributes, derived from its extension alone.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContentClass {
    Image,
    /// Multi-frame container (GIF).
    AnimatedImage,
    Document,
}

impl ContentClass {
    /// Classifies `name` by its extension (case-insensitive). Unknown extensions yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "png" | "jpg" | "jpeg" | "webp" | "bmp" | "tga" => Some(Self::Image),
            "gif" => Some(Self::AnimatedImage),
            "html" | "htm" | "txt" | "md" => Some(Self::Document),
            _ => None,
        }
    }
}

/// Explicit `cols x rows` grid declared on a directory.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct GridShape {
    pub cols: u32,
    pub rows: u32,
}

impl GridShape {
    pub fn new(cols: u32, rows: u32) -> Self {
        Self { cols, rows }
    }

    /// Parses `COLSxROWS` (e.g. `3x2`) as declared for the directory at `path`.
    pub fn parse(path: &str, raw: &str) -> Result<Self> {
        let invalid = || AtlasError::InvalidGridShape {
            path: path.to_string(),
            value: raw.to_string(),
        };
        let lowered = raw.trim().to_ascii_lowercase();
        let (c, r) = lowered.split_once('x').ok_or_else(invalid)?;
        let cols: u32 = c.trim().parse().map_err(|_| invalid())?;
        let rows: u32 = r.trim().parse().map_err(|_| invalid())?;
        if cols == 0 || rows == 0 {
            return Err(invalid());
        }
        Ok(Self { cols, rows })
    }

    pub fn cells(&self) -> u64 {
        self.cols as u64 * self.rows as u64
    }
}

impl fmt::Display for GridShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// Per-directory directives, already resolved by the loader.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Directives {
    pub grid_shape: Option<GridShape>,
    pub no_accumulate: bool,
    pub stop_accumulate: bool,
}

/// An image file referenced from the tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageEntry {
    pub path: String,
    pub animated: bool,
}

/// Roll-up of a node's aggregated view.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Empty,
    Images,
    Text,
    Mixed,
}

/// One directory of the source hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TreeNode {
    pub name: String,
    /// Slash-separated; `parent.path + "/" + name`, the root's path is its name.
    pub path: String,
    pub own_images: Vec<ImageEntry>,
    pub own_texts: Vec<String>,
    pub aggregated_images: Vec<ImageEntry>,
    pub aggregated_texts: Vec<String>,
    pub no_accumulate: bool,
    pub stop_accumulate: bool,
    pub grid_shape: Option<GridShape>,
    /// Subdirectories, in sibling order.
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn content_type(&self) -> ContentType {
        match (
            self.aggregated_images.is_empty(),
            self.aggregated_texts.is_empty(),
        ) {
            (true, true) => ContentType::Empty,
            (false, true) => ContentType::Images,
            (true, false) => ContentType::Text,
            (false, false) => ContentType::Mixed,
        }
    }

    /// Texts this node hands to its parent during roll-up.
    pub fn upward_texts(&self) -> &[String] {
        if self.stop_accumulate {
            &[]
        } else if self.no_accumulate {
            &self.aggregated_texts[self.own_texts.len()..]
        } else {
            &self.aggregated_texts
        }
    }

    /// Pre-order iteration over this node and all descendants.
    pub fn iter(&self) -> TreeIter<'_> {
        TreeIter { stack: vec![self] }
    }

    pub fn find(&self, path: &str) -> Option<&TreeNode> {
        self.iter().find(|n| n.path == path)
    }

    /// All image entries of the subtree in global ingestion order (natural path order).
    pub fn ingestion_order(&self) -> Vec<ImageEntry> {
        let mut all: Vec<ImageEntry> = self
            .iter()
            .flat_map(|n| n.own_images.iter().cloned())
            .collect();
        all.sort_by(|a, b| natural_cmp(&a.path, &b.path));
        all
    }
}

pub struct TreeIter<'a> {
    stack: Vec<&'a TreeNode>,
}

impl<'a> Iterator for TreeIter<'a> {
    type Item = &'a TreeNode;
    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Controls for a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Entry names skipped at every depth, before classification.
    pub ignored: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            ignored: DEFAULT_IGNORED.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ScanOptions {
    fn is_ignored(&self, name: &str) -> bool {
        name == GRID_LAYOUT_MARKER
            || name == NO_ACCUMULATE_MARKER
            || name == STOP_ACCUMULATE_MARKER
            || self.ignored.iter().any(|i| i == name)
    }
}

/// Structural problems absorbed during a scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateReport {
    /// Directories that could not be read and were left out of the tree.
    pub unreadable_dirs: Vec<String>,
    pub directories: usize,
    pub images: usize,
    pub texts: usize,
}

#[instrument(skip_all, fields(root = %root))]
/// Builds the tree rooted at `root` from `source`.
///
/// Unreadable directories are omitted (the root becomes an empty node); directive errors
/// such as a malformed grid shape abort the scan.
pub fn aggregate_tree<S: DirectorySource + ?Sized>(
    source: &S,
    root: &str,
    opts: &ScanOptions,
) -> Result<(TreeNode, AggregateReport)> {
    let mut report = AggregateReport::default();
    let name = root.rsplit('/').next().unwrap_or(root).to_string();
    let node = match scan_dir(source, name.clone(), root.to_string(), opts, &mut report)? {
        Some(node) => node,
        None => empty_node(name, root.to_string(), Directives::default()),
    };
    Ok((node, report))
}

fn scan_dir<S: DirectorySource + ?Sized>(
    source: &S,
    name: String,
    path: String,
    opts: &ScanOptions,
    report: &mut AggregateReport,
) -> Result<Option<TreeNode>> {
    let mut entries = match source.read_dir(&path) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %path, error = %e, "directory unreadable, omitting subtree");
            report.unreadable_dirs.push(path);
            return Ok(None);
        }
    };
    let directives = source.directives(&path)?;
    sort_entries(&mut entries);

    let mut node = empty_node(name, path, directives);
    for entry in entries {
        if opts.is_ignored(&entry.name) {
            continue;
        }
        let child_path = format!("{}/{}", node.path, entry.name);
        match entry.kind {
            EntryKind::Directory => {
                if let Some(child) = scan_dir(source, entry.name, child_path, opts, report)? {
                    node.children.push(child);
                }
            }
            EntryKind::File => match ContentClass::from_name(&entry.name) {
                Some(ContentClass::Image) => node.own_images.push(ImageEntry {
                    path: child_path,
                    animated: false,
                }),
                Some(ContentClass::AnimatedImage) => node.own_images.push(ImageEntry {
                    path: child_path,
                    animated: true,
                }),
                Some(ContentClass::Document) => node.own_texts.push(child_path),
                None => {}
            },
        }
    }

    node.aggregated_images = node.own_images.clone();
    node.aggregated_texts = node.own_texts.clone();
    for child in &node.children {
        node.aggregated_images
            .extend(child.aggregated_images.iter().cloned());
        node.aggregated_texts
            .extend(child.upward_texts().iter().cloned());
    }

    report.directories += 1;
    report.images += node.own_images.len();
    report.texts += node.own_texts.len();
    Ok(Some(node))
}

fn empty_node(name: String, path: String, d: Directives) -> TreeNode {
    TreeNode {
        name,
        path,
        own_images: Vec::new(),
        own_texts: Vec::new(),
        aggregated_images: Vec::new(),
        aggregated_texts: Vec::new(),
        no_accumulate: d.no_accumulate,
        stop_accumulate: d.stop_accumulate,
        grid_shape: d.grid_shape,
        children: Vec::new(),
    }
}

/// Directories first, then natural order of names.
fn sort_entries(entries: &mut [DirEntry]) {
    entries.sort_by(|a, b| {
        let a_file = a.kind == EntryKind::File;
        let b_file = b.kind == EntryKind::File;
        a_file
            .cmp(&b_file)
            .then_with(|| natural_cmp(&a.name, &b.name))
    });
}

/// Natural ordering: embedded digit runs compare numerically ("img2" < "img10").
/// Falls back to byte order so distinct strings never compare equal.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a_chars = a.chars().peekable();
    let mut b_chars = b.chars().peekable();

    loop {
        match (a_chars.peek(), b_chars.peek()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(&ac), Some(&bc)) => {
                if ac.is_ascii_digit() && bc.is_ascii_digit() {
                    let a_num = collect_number(&mut a_chars);
                    let b_num = collect_number(&mut b_chars);
                    match a_num.cmp(&b_num) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
                match ac.cmp(&bc) {
                    Ordering::Equal => {
                        a_chars.next();
                        b_chars.next();
                    }
                    other => return other,
                }
            }
        }
    }
}

fn collect_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> u128 {
    let mut n: u128 = 0;
    while let Some(&c) = chars.peek() {
        let Some(d) = c.to_digit(10) else { break };
        n = n.saturating_mul(10).saturating_add(d as u128);
        chars.next();
    }
    n
}
