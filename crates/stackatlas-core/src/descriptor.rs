use crate::config::AtlasConfig;
use crate::layout::NodeLayout;
use crate::model::{Atlas, Placement, SlotSpan};
use crate::tree::{ImageEntry, TreeNode};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

/// Builds the scene descriptor `{ tree, sprite_config }` consumed by the renderer.
///
/// Images are joined to their placements by path; an image without a placement (skipped
/// while packing) is emitted with `"placement": null`. Nodes missing from `layouts` get a
/// `null` layout.
pub fn build_descriptor(
    tree: &TreeNode,
    atlas: &Atlas,
    layouts: &BTreeMap<String, NodeLayout>,
    cfg: &AtlasConfig,
) -> Value {
    let ctx = Ctx {
        placements: atlas
            .placements
            .iter()
            .map(|p| (p.key.as_str(), p))
            .collect(),
        order: ingestion_index(tree),
        layouts,
    };
    json!({
        "tree": ctx.node(tree),
        "sprite_config": sprite_config(cfg, atlas.sheets.len()),
    })
}

/// Shared rendering parameters echoed into the descriptor.
pub fn sprite_config(cfg: &AtlasConfig, sheet_count: usize) -> Value {
    json!({
        "sheet_size": cfg.sheet_size,
        "sprite_size": cfg.slot_size,
        "sprites_per_row": cfg.slots_per_row(),
        "sheet_count": sheet_count,
        "max_animation_frames": cfg.max_animation_frames,
        "stack_spacing": cfg.stack_spacing,
        "grid_spacing": cfg.grid_spacing,
        "seed": cfg.seed,
        "quickload_threshold": cfg.quickload_threshold,
        "ordered_grid_layout": cfg.ordered_grid_layout,
    })
}

/// Global ingestion index of every image under `tree`, keyed by path.
pub fn ingestion_index(tree: &TreeNode) -> HashMap<String, usize> {
    tree.ingestion_order()
        .into_iter()
        .enumerate()
        .map(|(i, e)| (e.path, i))
        .collect()
}

/// Sum of `global_index` over the images visible at `node`, placed or not.
///
/// `index` comes from [`ingestion_index`] on the tree root.
pub fn layout_seed(node: &TreeNode, index: &HashMap<String, usize>) -> u64 {
    node.aggregated_images
        .iter()
        .filter_map(|img| index.get(&img.path))
        .map(|&i| i as u64)
        .sum()
}

struct Ctx<'a> {
    placements: HashMap<&'a str, &'a Placement>,
    order: HashMap<String, usize>,
    layouts: &'a BTreeMap<String, NodeLayout>,
}

impl Ctx<'_> {
    fn node(&self, n: &TreeNode) -> Value {
        let seed = layout_seed(n, &self.order);
        let children: Vec<Value> = n.children.iter().map(|c| self.node(c)).collect();
        json!({
            "name": n.name,
            "path": n.path,
            "content_type": n.content_type(),
            "no_accumulate": n.no_accumulate,
            "stop_accumulate": n.stop_accumulate,
            "grid_shape": n.grid_shape.map(|s| s.to_string()),
            "own_images": self.images(&n.own_images),
            "aggregated_images": self.images(&n.aggregated_images),
            "own_texts": n.own_texts,
            "aggregated_texts": n.aggregated_texts,
            "layout_seed": seed,
            "layout": self.layouts.get(&n.path),
            "children": children,
        })
    }

    fn images(&self, entries: &[ImageEntry]) -> Vec<Value> {
        entries
            .iter()
            .map(|e| {
                json!({
                    "path": e.path,
                    "global_index": self.order.get(&e.path),
                    "animated": e.animated,
                    "placement": self.placements.get(e.path.as_str()).copied().map(placement),
                })
            })
            .collect()
    }
}

fn placement(p: &Placement) -> Value {
    let uv = p.uv_rect();
    let mut v = json!({
        "sheet": p.sheet_index,
        "width": p.rendered_width,
        "height": p.rendered_height,
        "uv": {"u0": uv.u0, "v0": uv.v0, "u1": uv.u1, "v1": uv.v1},
    });
    match p.span {
        SlotSpan::Static { slot_index } => {
            v["slot"] = json!(slot_index);
        }
        SlotSpan::Animation {
            start_slot_index,
            frame_count,
        } => {
            v["start_slot"] = json!(start_slot_index);
            v["frame_count"] = json!(frame_count);
        }
    }
    v
}
