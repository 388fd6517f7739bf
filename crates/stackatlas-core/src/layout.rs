//! Grid placement of folder groups.
//!
//! Every directory gets a [`NodeLayout`] describing where its visible content sits on an
//! integer grid:
//!
//! - a directory with its own grid shape lays out its direct members (image-bearing
//!   subdirectories, then its own images) row-major inside that shape;
//! - otherwise its subtree is split into [`PlacementGroup`]s which are placed one by one
//!   with a spiral search over an occupancy set, nearest to the origin first.
//!
//! Ring scan order for radius `r`: start at `(r, 0)`, walk `+y` to `(r, r)`, `-x` to
//! `(-r, r)`, `-y` to `(-r, -r)`, `+x` to `(r, -r)` and `+y` back up to `(r, -1)`.

use crate::config::AtlasConfig;
use crate::error::{AtlasError, Result};
use crate::tree::{GridShape, TreeNode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    /// Nothing to show.
    Empty,
    /// The node's own grid shape governs its direct members.
    Explicit,
    /// Groups placed by spiral search.
    Spiral,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    /// A folder whose images are drawn as one stack of planes.
    Stack,
    /// A single image.
    Image,
}

/// One member drawn at a grid cell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayoutCell {
    pub member: String,
    pub kind: MemberKind,
    pub grid_x: i32,
    pub grid_y: i32,
    /// Centered world offset (`grid * spacing - center`).
    pub world_x: f32,
    pub world_z: f32,
}

/// A rectangular block of cells reserved for one folder subtree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlacementGroup {
    /// Directory that owns the group.
    pub path: String,
    pub footprint: GridShape,
    pub grid_x: i32,
    pub grid_y: i32,
    pub world_x: f32,
    pub world_z: f32,
    /// Image-bearing folders covered by the group, in traversal order.
    pub members: Vec<String>,
}

/// Inclusive bounding box of all occupied cells.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GridBounds {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeLayout {
    pub path: String,
    pub mode: LayoutMode,
    /// Spiral mode only.
    pub groups: Vec<PlacementGroup>,
    pub cells: Vec<LayoutCell>,
    pub bounds: GridBounds,
    /// World-space center subtracted from every offset.
    pub center: [f32; 2],
}

/// Set of occupied integer cells on an unbounded plane. Cells are never released.
#[derive(Debug, Clone, Default)]
pub struct OccupancyGrid {
    cells: HashSet<(i32, i32)>,
}

impl OccupancyGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_occupied(&self, x: i32, y: i32) -> bool {
        self.cells.contains(&(x, y))
    }

    /// True when no cell of the `shape` footprint anchored at (x, y) is taken.
    pub fn fits(&self, x: i32, y: i32, shape: GridShape) -> bool {
        footprint(x, y, shape).all(|c| !self.cells.contains(&c))
    }

    pub fn occupy(&mut self, x: i32, y: i32, shape: GridShape) {
        self.cells.extend(footprint(x, y, shape));
    }

    /// First anchor for `shape`: the origin on an empty grid, otherwise the first fitting
    /// cell of rings `1..=max_radius` in ring scan order.
    pub fn spiral_search(&self, shape: GridShape, max_radius: u32) -> Option<(i32, i32)> {
        if self.cells.is_empty() {
            return Some((0, 0));
        }
        (1..=max_radius as i32)
            .flat_map(ring)
            .find(|&(x, y)| self.fits(x, y, shape))
    }
}

fn footprint(x: i32, y: i32, shape: GridShape) -> impl Iterator<Item = (i32, i32)> {
    let (cols, rows) = (shape.cols as i32, shape.rows as i32);
    (0..rows).flat_map(move |dy| (0..cols).map(move |dx| (x + dx, y + dy)))
}

/// The `8r` cells at Chebyshev distance `r` from the origin, in ring scan order.
pub fn ring(r: i32) -> impl Iterator<Item = (i32, i32)> {
    let east_up = (0..=r).map(move |y| (r, y));
    let top = (-r..r).rev().map(move |x| (x, r));
    let west = (-r..r).rev().map(move |y| (-r, y));
    let bottom = (-r + 1..=r).map(move |x| (x, -r));
    let east_rest = (-r + 1..0).map(move |y| (r, y));
    east_up.chain(top).chain(west).chain(bottom).chain(east_rest)
}

#[instrument(skip_all, fields(root = %root.path))]
/// Computes a layout for every directory of the tree, keyed by path.
pub fn layout_tree(root: &TreeNode, cfg: &AtlasConfig) -> Result<BTreeMap<String, NodeLayout>> {
    let mut out = BTreeMap::new();
    for node in root.iter() {
        out.insert(node.path.clone(), layout_node(node, cfg)?);
    }
    Ok(out)
}

/// Computes the layout shown when `node` is the current node.
pub fn layout_node(node: &TreeNode, cfg: &AtlasConfig) -> Result<NodeLayout> {
    if let Some(shape) = node.grid_shape {
        check_shape(&node.path, shape)?;
        return Ok(explicit_layout(node, shape, cfg.grid_spacing));
    }
    let seeds = discover_groups(node, cfg)?;
    if seeds.is_empty() {
        return Ok(NodeLayout {
            path: node.path.clone(),
            mode: LayoutMode::Empty,
            groups: Vec::new(),
            cells: Vec::new(),
            bounds: GridBounds::default(),
            center: [0.0, 0.0],
        });
    }
    spiral_layout(&node.path, seeds, cfg)
}

struct GroupSeed {
    path: String,
    footprint: GridShape,
    members: Vec<String>,
}

/// Groups of `node` in traversal order: its own images first, then one group per
/// directive-bearing or image-bearing descendant, not descending past a group.
fn discover_groups(node: &TreeNode, cfg: &AtlasConfig) -> Result<Vec<GroupSeed>> {
    let mut seeds = Vec::new();
    if !node.own_images.is_empty() {
        seeds.push(GroupSeed {
            path: node.path.clone(),
            footprint: GridShape::new(1, 1),
            members: vec![node.path.clone()],
        });
    }
    for child in &node.children {
        collect_groups(child, cfg, &mut seeds)?;
    }
    Ok(seeds)
}

fn collect_groups(n: &TreeNode, cfg: &AtlasConfig, seeds: &mut Vec<GroupSeed>) -> Result<()> {
    match n.grid_shape {
        Some(shape) if !n.aggregated_images.is_empty() => {
            check_shape(&n.path, shape)?;
            let footprint = if cfg.ordered_grid_layout {
                shape
            } else {
                GridShape::new(1, 1)
            };
            seeds.push(GroupSeed {
                path: n.path.clone(),
                footprint,
                members: stack_folders(n),
            });
        }
        _ if !n.own_images.is_empty() => seeds.push(GroupSeed {
            path: n.path.clone(),
            footprint: GridShape::new(1, 1),
            members: stack_folders(n),
        }),
        _ => {
            for child in &n.children {
                collect_groups(child, cfg, seeds)?;
            }
        }
    }
    Ok(())
}

/// Folders of the subtree with their own images, pre-order.
fn stack_folders(n: &TreeNode) -> Vec<String> {
    n.iter()
        .filter(|d| !d.own_images.is_empty())
        .map(|d| d.path.clone())
        .collect()
}

fn check_shape(path: &str, shape: GridShape) -> Result<()> {
    if shape.cols == 0 || shape.rows == 0 {
        return Err(AtlasError::InvalidGridShape {
            path: path.to_string(),
            value: shape.to_string(),
        });
    }
    Ok(())
}

/// Cell of member `i` inside a group footprint: row-major, wrapping back to the first row
/// (stacking) once all `cols x rows` cells are used, so a group never leaves its footprint.
fn member_cell(i: usize, shape: GridShape) -> (i32, i32) {
    let cols = shape.cols as usize;
    let rows = shape.rows as usize;
    ((i % cols) as i32, ((i / cols) % rows) as i32)
}

fn spiral_layout(path: &str, seeds: Vec<GroupSeed>, cfg: &AtlasConfig) -> Result<NodeLayout> {
    let mut grid = OccupancyGrid::new();
    let mut placed: Vec<(GroupSeed, i32, i32)> = Vec::with_capacity(seeds.len());
    for seed in seeds {
        let Some((x, y)) = grid.spiral_search(seed.footprint, cfg.max_spiral_radius) else {
            return Err(AtlasError::LayoutInfeasible {
                path: seed.path,
                cols: seed.footprint.cols,
                rows: seed.footprint.rows,
                max_radius: cfg.max_spiral_radius,
            });
        };
        grid.occupy(x, y, seed.footprint);
        debug!(group = %seed.path, x, y, footprint = %seed.footprint, "group placed");
        placed.push((seed, x, y));
    }

    let mut bounds = GridBounds {
        min_x: i32::MAX,
        min_y: i32::MAX,
        max_x: i32::MIN,
        max_y: i32::MIN,
    };
    for (seed, x, y) in &placed {
        bounds.min_x = bounds.min_x.min(*x);
        bounds.min_y = bounds.min_y.min(*y);
        bounds.max_x = bounds.max_x.max(x + seed.footprint.cols as i32 - 1);
        bounds.max_y = bounds.max_y.max(y + seed.footprint.rows as i32 - 1);
    }
    let spacing = cfg.grid_spacing;
    let center = [
        (bounds.max_x + bounds.min_x) as f32 / 2.0 * spacing,
        (bounds.max_y + bounds.min_y) as f32 / 2.0 * spacing,
    ];

    let mut groups = Vec::with_capacity(placed.len());
    let mut cells = Vec::new();
    for (seed, x, y) in placed {
        for (i, member) in seed.members.iter().enumerate() {
            let (cx, cy) = member_cell(i, seed.footprint);
            cells.push(cell(member, MemberKind::Stack, x + cx, y + cy, spacing, center));
        }
        groups.push(PlacementGroup {
            path: seed.path,
            footprint: seed.footprint,
            grid_x: x,
            grid_y: y,
            world_x: x as f32 * spacing - center[0],
            world_z: y as f32 * spacing - center[1],
            members: seed.members,
        });
    }

    Ok(NodeLayout {
        path: path.to_string(),
        mode: LayoutMode::Spiral,
        groups,
        cells,
        bounds,
        center,
    })
}

fn explicit_layout(node: &TreeNode, shape: GridShape, spacing: f32) -> NodeLayout {
    let members = node
        .children
        .iter()
        .filter(|c| !c.aggregated_images.is_empty())
        .map(|c| (c.path.as_str(), MemberKind::Stack))
        .chain(
            node.own_images
                .iter()
                .map(|img| (img.path.as_str(), MemberKind::Image)),
        );

    let center = [
        (shape.cols - 1) as f32 * spacing / 2.0,
        (shape.rows - 1) as f32 * spacing / 2.0,
    ];
    let cells: Vec<LayoutCell> = members
        .enumerate()
        .map(|(i, (member, kind))| {
            let x = (i % shape.cols as usize) as i32;
            let y = (i / shape.cols as usize) as i32;
            cell(member, kind, x, y, spacing, center)
        })
        .collect();
    if cells.len() as u64 > shape.cells() {
        warn!(path = %node.path, members = cells.len(), shape = %shape, "grid shape too small, extra rows added");
    }
    let max_y = cells.last().map_or(0, |c| c.grid_y).max(shape.rows as i32 - 1);

    NodeLayout {
        path: node.path.clone(),
        mode: if cells.is_empty() {
            LayoutMode::Empty
        } else {
            LayoutMode::Explicit
        },
        groups: Vec::new(),
        cells,
        bounds: GridBounds {
            min_x: 0,
            min_y: 0,
            max_x: shape.cols as i32 - 1,
            max_y,
        },
        center,
    }
}

fn cell(member: &str, kind: MemberKind, x: i32, y: i32, spacing: f32, center: [f32; 2]) -> LayoutCell {
    LayoutCell {
        member: member.to_string(),
        kind,
        grid_x: x,
        grid_y: y,
        world_x: x as f32 * spacing - center[0],
        world_z: y as f32 * spacing - center[1],
    }
}
