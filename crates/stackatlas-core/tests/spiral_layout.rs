use rand::{Rng, SeedableRng, rngs::StdRng};
use stackatlas_core::prelude::*;
use stackatlas_core::{AtlasError, Directives, MemberKind, OccupancyGrid, layout_node};
use std::collections::HashSet;

fn shaped(cols: u32, rows: u32) -> Directives {
    Directives {
        grid_shape: Some(GridShape::new(cols, rows)),
        ..Default::default()
    }
}

fn scan(src: &MemoryTree) -> TreeNode {
    aggregate_tree(src, "root", &ScanOptions::default())
        .expect("aggregate")
        .0
}

#[test]
fn five_unit_groups_follow_ring_order() {
    let src = MemoryTree::new("root").files([
        "root/own.png",
        "root/a/1.png",
        "root/b/1.png",
        "root/c/1.png",
        "root/d/1.png",
    ]);
    let root = scan(&src);
    let layout = layout_node(&root, &AtlasConfig::default()).expect("layout");

    assert_eq!(layout.mode, LayoutMode::Spiral);
    let got: Vec<_> = layout
        .groups
        .iter()
        .map(|g| (g.path.as_str(), g.grid_x, g.grid_y))
        .collect();
    assert_eq!(
        got,
        vec![
            ("root", 0, 0),
            ("root/a", 1, 0),
            ("root/b", 1, 1),
            ("root/c", 0, 1),
            ("root/d", -1, 1),
        ]
    );
}

#[test]
fn explicit_shape_lays_out_direct_images_row_major() {
    let src = MemoryTree::new("root")
        .with_directives("root", shaped(3, 2))
        .files(["root/i0.png", "root/i1.png", "root/i2.png", "root/i3.png"]);
    let root = scan(&src);
    let layout = layout_node(&root, &AtlasConfig::default()).expect("layout");

    assert_eq!(layout.mode, LayoutMode::Explicit);
    assert!(layout.groups.is_empty());
    let cells: Vec<_> = layout
        .cells
        .iter()
        .map(|c| (c.member.as_str(), c.grid_x, c.grid_y))
        .collect();
    assert_eq!(
        cells,
        vec![
            ("root/i0.png", 0, 0),
            ("root/i1.png", 1, 0),
            ("root/i2.png", 2, 0),
            ("root/i3.png", 0, 1),
        ]
    );
    assert!(layout.cells.iter().all(|c| c.kind == MemberKind::Image));
}

#[test]
fn explicit_shape_puts_child_stacks_before_own_images() {
    let src = MemoryTree::new("root")
        .with_directives("root", shaped(2, 1))
        .files(["root/z.png", "root/sub/a.png", "root/sub2/b.png"])
        .dir("root/empty");
    let root = scan(&src);
    let layout = layout_node(&root, &AtlasConfig::default()).expect("layout");

    let cells: Vec<_> = layout
        .cells
        .iter()
        .map(|c| (c.member.as_str(), c.kind, c.grid_x, c.grid_y))
        .collect();
    // overflow continues on an extra row
    assert_eq!(
        cells,
        vec![
            ("root/sub", MemberKind::Stack, 0, 0),
            ("root/sub2", MemberKind::Stack, 1, 0),
            ("root/z.png", MemberKind::Image, 0, 1),
        ]
    );
    assert_eq!(layout.bounds.max_y, 1);
}

#[test]
fn directive_child_takes_its_declared_footprint() {
    let src = MemoryTree::new("root")
        .files(["root/own.png", "root/wide/a/1.png", "root/wide/b/1.png", "root/z/1.png"])
        .with_directives("root/wide", shaped(2, 2));
    let root = scan(&src);
    let layout = layout_node(&root, &AtlasConfig::default()).expect("layout");

    let n = layout.groups.iter().find(|g| g.path == "root/z").expect("z");
    let wide = layout.groups.iter().find(|g| g.path == "root/wide").expect("wide");
    assert_eq!(wide.footprint, GridShape::new(2, 2));
    assert_eq!(wide.members, vec!["root/wide/a".to_string(), "root/wide/b".to_string()]);
    // (1,0) is the first ring cell whose 2x2 footprint avoids (0,0)
    assert_eq!((wide.grid_x, wide.grid_y), (1, 0));
    assert_eq!(n.footprint, GridShape::new(1, 1));
    assert_eq!((n.grid_x, n.grid_y), (0, 1));

    let flat = AtlasConfig::builder().ordered_grid_layout(false).build();
    let layout = layout_node(&root, &flat).expect("layout");
    assert!(layout.groups.iter().all(|g| g.footprint == GridShape::new(1, 1)));
}

#[test]
fn group_recursion_stops_at_image_bearing_directory() {
    let src = MemoryTree::new("root").files(["root/a/1.png", "root/a/inner/2.png", "root/b/c/3.png"]);
    let root = scan(&src);
    let layout = layout_node(&root, &AtlasConfig::default()).expect("layout");

    let paths: Vec<_> = layout.groups.iter().map(|g| g.path.as_str()).collect();
    assert_eq!(paths, vec!["root/a", "root/b/c"]);
    assert_eq!(
        layout.groups[0].members,
        vec!["root/a".to_string(), "root/a/inner".to_string()]
    );
}

fn random_tree(rng: &mut StdRng) -> MemoryTree {
    let mut src = MemoryTree::new("root");
    for i in 0..rng.gen_range(5..40) {
        let dir = format!("root/d{i}");
        src = src.file(&format!("{dir}/x.png"));
        if rng.gen_bool(0.3) {
            src = src.with_directives(&dir, shaped(rng.gen_range(1..4), rng.gen_range(1..4)));
            src = src.file(&format!("{dir}/sub/y.png"));
        }
    }
    src
}

fn footprint_cells(layout: &NodeLayout) -> Vec<(i32, i32)> {
    let mut out = Vec::new();
    for g in &layout.groups {
        for dy in 0..g.footprint.rows as i32 {
            for dx in 0..g.footprint.cols as i32 {
                out.push((g.grid_x + dx, g.grid_y + dy));
            }
        }
    }
    out
}

#[test]
fn groups_are_disjoint_and_layout_is_repeatable() {
    let mut rng = StdRng::seed_from_u64(293);
    for _ in 0..20 {
        let root = scan(&random_tree(&mut rng));
        let cfg = AtlasConfig::default();
        let a = layout_node(&root, &cfg).expect("layout");
        let b = layout_node(&root, &cfg).expect("layout");
        assert_eq!(a, b);

        let cells = footprint_cells(&a);
        let uniq: HashSet<_> = cells.iter().copied().collect();
        assert_eq!(uniq.len(), cells.len(), "overlapping footprints");
        assert_eq!(a.groups[0].grid_x, 0);
        assert_eq!(a.groups[0].grid_y, 0);

        // every member cell stays inside its group's footprint
        for g in &a.groups {
            for c in a.cells.iter().filter(|c| g.members.contains(&c.member)) {
                assert!(c.grid_x >= g.grid_x && c.grid_x < g.grid_x + g.footprint.cols as i32);
                assert!(c.grid_y >= g.grid_y && c.grid_y < g.grid_y + g.footprint.rows as i32);
            }
        }
    }
}

#[test]
fn offsets_are_centered_on_the_bounding_box() {
    let src = MemoryTree::new("root").files(["root/own.png", "root/a/1.png"]);
    let root = scan(&src);
    let cfg = AtlasConfig::builder().grid_spacing(2.0).build();
    let layout = layout_node(&root, &cfg).expect("layout");

    // groups at (0,0) and (1,0): center x = 0.5 * 2.0
    assert_eq!(layout.center, [1.0, 0.0]);
    let xs: Vec<_> = layout.groups.iter().map(|g| g.world_x).collect();
    assert_eq!(xs, vec![-1.0, 1.0]);
    let min = layout.cells.iter().map(|c| c.world_x).fold(f32::MAX, f32::min);
    let max = layout.cells.iter().map(|c| c.world_x).fold(f32::MIN, f32::max);
    assert_eq!(min, -max);
}

#[test]
fn radius_bound_exhaustion_is_fatal() {
    let mut src = MemoryTree::new("root");
    for i in 0..12 {
        src = src.file(&format!("root/d{i}/x.png"));
    }
    let root = scan(&src);
    // radius 1 holds 1 + 8 groups
    let cfg = AtlasConfig::builder().max_spiral_radius(1).build();
    match layout_node(&root, &cfg) {
        Err(AtlasError::LayoutInfeasible { path, max_radius, .. }) => {
            assert_eq!(path, "root/d9");
            assert_eq!(max_radius, 1);
        }
        other => panic!("expected LayoutInfeasible, got {other:?}"),
    }
    assert!(layout_tree(&root, &cfg).is_err());
}

#[test]
fn zero_sized_shape_is_rejected_at_use() {
    let src = MemoryTree::new("root")
        .with_directives("root/bad", shaped(0, 2))
        .file("root/bad/a.png");
    let root = scan(&src);
    let err = layout_tree(&root, &AtlasConfig::default()).unwrap_err();
    assert!(matches!(err, AtlasError::InvalidGridShape { ref path, .. } if path == "root/bad"));
}

#[test]
fn empty_node_has_empty_layout() {
    let root = scan(&MemoryTree::new("root").file("root/readme.md"));
    let all = layout_tree(&root, &AtlasConfig::default()).expect("layout");
    assert_eq!(all["root"].mode, LayoutMode::Empty);
    assert!(all["root"].cells.is_empty());
}

#[test]
fn occupancy_grid_search() {
    let mut grid = OccupancyGrid::new();
    assert_eq!(grid.spiral_search(GridShape::new(3, 3), 5), Some((0, 0)));
    grid.occupy(0, 0, GridShape::new(1, 1));
    assert!(grid.is_occupied(0, 0));
    assert!(!grid.fits(-1, -1, GridShape::new(2, 2)));
    assert_eq!(grid.spiral_search(GridShape::new(1, 1), 1), Some((1, 0)));
    assert_eq!(grid.spiral_search(GridShape::new(1, 2), 1), Some((1, 0)));
    grid.occupy(-2, -2, GridShape::new(5, 5));
    assert_eq!(grid.len(), 25);
    assert_eq!(grid.spiral_search(GridShape::new(1, 1), 2), None);
}
