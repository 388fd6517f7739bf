use image::RgbaImage;
use stackatlas_core::{ingestion_index, layout_seed};
use stackatlas_core::prelude::*;

#[test]
fn descriptor_joins_tree_placements_and_layouts() {
    let src = MemoryTree::new("root")
        .files(["root/a.png", "root/b.png", "root/sub/c.gif", "root/sub/readme.md"]);
    let (tree, _) = aggregate_tree(&src, "root", &ScanOptions::default()).expect("aggregate");

    // b.png has no pixels and will be skipped
    let sprites = MemorySprites::new()
        .with("root/a.png", DecodedSprite::Static(RgbaImage::new(32, 16)))
        .with(
            "root/sub/c.gif",
            DecodedSprite::Animated(vec![RgbaImage::new(8, 8); 4]),
        );
    let cfg = AtlasConfig::builder().sheet_size(256).slot_size(32).build();
    let out = pack_sprites(&ingest(&tree), &sprites, &cfg).expect("pack");
    let layouts = layout_tree(&tree, &cfg).expect("layout");
    let doc = build_descriptor(&tree, &out.atlas, &layouts, &cfg);

    let sc = &doc["sprite_config"];
    assert_eq!(sc["sheet_size"], 256);
    assert_eq!(sc["sprite_size"], 32);
    assert_eq!(sc["sprites_per_row"], 8);
    assert_eq!(sc["sheet_count"], 1);
    assert_eq!(sc["seed"], 293);

    let root = &doc["tree"];
    assert_eq!(root["path"], "root");
    assert_eq!(root["content_type"], "mixed");
    assert_eq!(root["layout"]["mode"], "spiral");

    let own = root["own_images"].as_array().expect("own images");
    assert_eq!(own.len(), 2);
    assert_eq!(own[0]["path"], "root/a.png");
    assert_eq!(own[0]["placement"]["slot"], 0);
    assert_eq!(own[0]["placement"]["width"], 32);
    assert!(own[1]["placement"].is_null());

    let sub = &root["children"][0];
    assert_eq!(sub["own_texts"][0], "root/sub/readme.md");
    let gif = &sub["own_images"][0];
    assert_eq!(gif["global_index"], 2);
    assert_eq!(gif["placement"]["start_slot"], 1);
    assert_eq!(gif["placement"]["frame_count"], 4);

    // ingestion order: a.png (0), b.png (1), sub/c.gif (2); the skipped b.png still counts
    assert_eq!(root["layout_seed"], 3);
    assert_eq!(layout_seed(&tree, &ingestion_index(&tree)), 3);
    assert_eq!(sub["layout_seed"], 2);
}

#[test]
fn layout_seed_does_not_depend_on_packing() {
    let src = MemoryTree::new("root").files(["root/a.png", "root/b.png", "root/c.png"]);
    let (tree, _) = aggregate_tree(&src, "root", &ScanOptions::default()).expect("aggregate");
    let cfg = AtlasConfig::default();
    let layouts = layout_tree(&tree, &cfg).expect("layout");
    let doc = build_descriptor(&tree, &Atlas::default(), &layouts, &cfg);

    let root = &doc["tree"];
    let indices: Vec<u64> = root["own_images"]
        .as_array()
        .expect("own images")
        .iter()
        .map(|img| img["global_index"].as_u64().expect("index"))
        .collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert!(root["own_images"][0]["placement"].is_null());
    assert_eq!(root["layout_seed"], 3);
    assert_eq!(doc["sprite_config"]["sheet_count"], 0);
}
