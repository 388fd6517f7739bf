//! Core library for turning a folder tree of images into sprite atlases and a scene layout.
//!
//! - Aggregation: `aggregate_tree` folds a directory listing into `TreeNode`s with
//!   accumulation flags (`.no_accum`, `.stop_accum`) applied to text roll-up
//! - Packing: `pack_sprites` / `pack_sprites_into` write every image and animation frame into
//!   fixed-size slots across fixed-size sheets, never splitting an animation
//! - Layout: `layout_tree` places folder groups on an integer grid (explicit shapes or spiral search)
//! - Descriptor: `build_descriptor` joins tree, placements and layouts into one JSON value
//!
//! Quick example:
//! ```ignore
//! use stackatlas_core::prelude::*;
//! # fn main() -> anyhow::Result<()> {
//! let tree_src = MemoryTree::new("root").file("root/a.png").file("root/b.png");
//! let (tree, _report) = aggregate_tree(&tree_src, "root", &ScanOptions::default())?;
//! let sprites = MemorySprites::new()
//!     .with("root/a.png", DecodedSprite::Static(image::RgbaImage::new(128, 64)))
//!     .with("root/b.png", DecodedSprite::Static(image::RgbaImage::new(32, 32)));
//! let cfg = AtlasConfig::builder().sheet_size(256).slot_size(64).build();
//! let out = pack_sprites(&ingest(&tree), &sprites, &cfg)?;
//! let layouts = layout_tree(&tree, &cfg)?;
//! let doc = build_descriptor(&tree, &out.atlas, &layouts, &cfg);
//! println!("{} sheets, {}", out.sheets.len(), doc["sprite_config"]);
//! # Ok(()) }
//! ```

pub mod compositing;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod filters;
pub mod layout;
pub mod model;
pub mod packer;
pub mod pipeline;
pub mod source;
pub mod tree;

pub use config::*;
pub use descriptor::*;
pub use error::*;
pub use layout::*;
pub use model::*;
pub use packer::*;
pub use pipeline::*;
pub use source::*;
pub use tree::*;

/// Convenience prelude for common types and functions.
/// Importing `stackatlas_core::prelude::*` brings the primary APIs into scope.
pub mod prelude {
    pub use crate::config::{
        AtlasConfig, AtlasConfigBuilder, ChromaKeyColor, DitherMethod, DitherMode, FilterChain,
        ResizeFilter,
    };
    pub use crate::descriptor::build_descriptor;
    pub use crate::layout::{layout_tree, LayoutMode, NodeLayout, PlacementGroup};
    pub use crate::model::{Atlas, PackStats, Placement, SlotSpan, UvRect};
    pub use crate::source::{DecodedSprite, DirectorySource, MemorySprites, MemoryTree, SpriteSource};
    pub use crate::tree::{aggregate_tree, GridShape, ScanOptions, TreeNode};
    pub use crate::{ingest, pack_sprites, pack_sprites_into, PackOutput, SpriteRequest};
}
