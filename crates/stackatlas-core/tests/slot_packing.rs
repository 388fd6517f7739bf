use image::{Rgba, RgbaImage};
use rand::{Rng, SeedableRng, rngs::StdRng};
use stackatlas_core::prelude::*;
use stackatlas_core::{FinishedSheet, SlotGrid, SlotPacker};

fn cfg_64_slots() -> AtlasConfig {
    // 512 / 64 = 8 slots per row, 64 per sheet
    AtlasConfig::builder()
        .sheet_size(512)
        .slot_size(64)
        .max_animation_frames(30)
        .build()
}

fn solid(w: u32, h: u32, i: u32) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba([(i % 251) as u8, (i / 251) as u8, 7, 255]))
}

fn tree_of(files: &[String]) -> TreeNode {
    let src = MemoryTree::new("root").files(files.iter().map(String::as_str));
    aggregate_tree(&src, "root", &ScanOptions::default())
        .expect("aggregate")
        .0
}

#[test]
fn sixty_five_statics_spill_onto_second_sheet() {
    let files: Vec<String> = (0..65).map(|i| format!("root/img{i}.png")).collect();
    let mut sprites = MemorySprites::new();
    for (i, f) in files.iter().enumerate() {
        sprites.insert(f.clone(), DecodedSprite::Static(solid(64, 64, i as u32)));
    }
    let tree = tree_of(&files);
    let requests = ingest(&tree);
    assert_eq!(requests.len(), 65);
    assert_eq!(requests[64].key, "root/img64.png");

    let out = pack_sprites(&requests, &sprites, &cfg_64_slots()).expect("pack");
    assert_eq!(out.sheets.len(), 2);
    assert_eq!(out.atlas.sheets.len(), 2);

    let last = out.atlas.placement("root/img64.png").expect("placed");
    assert_eq!(last.global_index, 64);
    assert_eq!(last.sheet_index, 1);
    assert_eq!(last.span, SlotSpan::Static { slot_index: 0 });

    // pixels of image 64 sit at the top-left of sheet 1
    assert_eq!(out.sheets[1].record.id, 1);
    assert_eq!(*out.sheets[1].rgba.get_pixel(0, 0), Rgba([64, 0, 7, 255]));
    assert_eq!(out.atlas.sheets[0].slots_used, 64);
    assert_eq!(out.atlas.sheets[1].slots_used, 1);
}

fn animation_with_statics(anim_name: &str) -> (Vec<String>, MemorySprites) {
    let mut files = vec![format!("root/{anim_name}")];
    files.extend((0..60).map(|i| format!("root/s{i}.png")));
    let mut sprites = MemorySprites::new();
    for (i, f) in files.iter().enumerate().skip(1) {
        sprites.insert(f.clone(), DecodedSprite::Static(solid(32, 32, i as u32)));
    }
    let frames = (0..10).map(|i| solid(64, 48, 200 + i)).collect();
    sprites.insert(files[0].clone(), DecodedSprite::Animated(frames));
    (files, sprites)
}

#[test]
fn animation_first_takes_leading_slots() {
    let (files, sprites) = animation_with_statics("a.gif");
    let tree = tree_of(&files);
    let out = pack_sprites(&ingest(&tree), &sprites, &cfg_64_slots()).expect("pack");

    let anim = out.atlas.placement("root/a.gif").expect("anim placed");
    assert_eq!(anim.sheet_index, 0);
    assert_eq!(
        anim.span,
        SlotSpan::Animation {
            start_slot_index: 0,
            frame_count: 10
        }
    );
    assert_eq!((anim.rendered_width, anim.rendered_height), (64, 48));
    let first_static = out.atlas.placement("root/s0.png").expect("static");
    assert_eq!(first_static.span, SlotSpan::Static { slot_index: 10 });

    // 10 + 60 slots: the last 6 statics continue on sheet 1
    assert_eq!(out.atlas.sheets.len(), 2);
    assert_eq!(out.atlas.sheets[0].slots_used, 64);
    let last = out.atlas.placement("root/s59.png").expect("static");
    assert_eq!((last.sheet_index, last.span.start()), (1, 5));
}

#[test]
fn animation_that_does_not_fit_opens_new_sheet() {
    let (files, sprites) = animation_with_statics("z.gif");
    let tree = tree_of(&files);
    let out = pack_sprites(&ingest(&tree), &sprites, &cfg_64_slots()).expect("pack");

    let last_static = out.atlas.placement("root/s59.png").expect("static");
    assert_eq!(last_static.sheet_index, 0);
    assert_eq!(last_static.span, SlotSpan::Static { slot_index: 59 });

    let anim = out.atlas.placement("root/z.gif").expect("anim placed");
    assert_eq!(anim.sheet_index, 1);
    assert_eq!(anim.span.start(), 0);
    assert_eq!(anim.span.len(), 10);

    // sheet 0 was closed with 4 slots left empty
    assert_eq!(out.atlas.sheets[0].slots_used, 60);
    assert_eq!(out.atlas.sheets[1].slots_used, 10);
}

#[test]
fn frames_are_capped_at_max_animation_frames() {
    let cfg = AtlasConfig::builder()
        .sheet_size(256)
        .slot_size(64)
        .max_animation_frames(3)
        .build();
    let sprites = MemorySprites::new().with(
        "root/a.gif",
        DecodedSprite::Animated((0..8).map(|i| solid(16, 16, i)).collect()),
    );
    let req = vec![SpriteRequest {
        key: "root/a.gif".into(),
        global_index: 0,
        animated: true,
    }];
    let out = pack_sprites(&req, &sprites, &cfg).expect("pack");
    assert_eq!(out.atlas.placements[0].span.len(), 3);
    assert_eq!(out.units.len(), 3);
    assert!(out.units.iter().all(|u| u.frame.map(|f| f.count) == Some(3)));
}

#[test]
fn undecodable_unit_is_skipped_without_consuming_a_slot() {
    let files: Vec<String> = vec!["root/a.png".into(), "root/b.png".into(), "root/c.png".into()];
    // b.png has no pixels
    let sprites = MemorySprites::new()
        .with("root/a.png", DecodedSprite::Static(solid(10, 10, 1)))
        .with("root/c.png", DecodedSprite::Static(solid(10, 10, 3)));
    let tree = tree_of(&files);
    let out = pack_sprites(&ingest(&tree), &sprites, &cfg_64_slots()).expect("pack");

    assert_eq!(out.atlas.skipped, vec!["root/b.png".to_string()]);
    assert!(out.atlas.placement("root/b.png").is_none());
    let c = out.atlas.placement("root/c.png").expect("c");
    assert_eq!(c.span, SlotSpan::Static { slot_index: 1 });
    assert_eq!(c.global_index, 2);
    assert_eq!(out.stats().skipped_units, 1);
}

#[test]
fn empty_input_produces_no_sheets() {
    let out = pack_sprites(&[], &MemorySprites::new(), &cfg_64_slots()).expect("pack");
    assert!(out.sheets.is_empty());
    assert!(out.atlas.placements.is_empty());
    assert_eq!(out.stats().occupancy, 0.0);
}

#[test]
fn sprites_are_normalized_to_slot_size() {
    let sprites = MemorySprites::new()
        .with("root/wide.png", DecodedSprite::Static(solid(200, 100, 1)))
        .with("root/tiny.png", DecodedSprite::Static(solid(8, 2, 2)));
    let req = vec![
        SpriteRequest {
            key: "root/tiny.png".into(),
            global_index: 0,
            animated: false,
        },
        SpriteRequest {
            key: "root/wide.png".into(),
            global_index: 1,
            animated: false,
        },
    ];
    let out = pack_sprites(&req, &sprites, &cfg_64_slots()).expect("pack");
    let wide = out.atlas.placement("root/wide.png").expect("wide");
    assert_eq!((wide.rendered_width, wide.rendered_height), (64, 32));
    let tiny = out.atlas.placement("root/tiny.png").expect("tiny");
    assert_eq!((tiny.rendered_width, tiny.rendered_height), (64, 16));
}

#[derive(Debug, PartialEq)]
struct Snapshot {
    spans: Vec<(String, usize, SlotSpan)>,
    pixels: Vec<Vec<u8>>,
}

fn random_run(seed: u64) -> Snapshot {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut sprites = MemorySprites::new();
    let mut requests = Vec::new();
    for i in 0..150 {
        let animated = rng.gen_bool(0.15);
        let key = format!("root/u{i}");
        let w = rng.gen_range(1..=80);
        let h = rng.gen_range(1..=80);
        let sprite = if animated {
            let n = rng.gen_range(1..=20);
            DecodedSprite::Animated((0..n).map(|f| solid(w, h, i * 31 + f)).collect())
        } else {
            DecodedSprite::Static(solid(w, h, i))
        };
        sprites.insert(key.clone(), sprite);
        requests.push(SpriteRequest {
            key,
            global_index: i as usize,
            animated,
        });
    }
    let cfg = AtlasConfig::builder()
        .sheet_size(256)
        .slot_size(32)
        .max_animation_frames(12)
        .build();
    let out = pack_sprites(&requests, &sprites, &cfg).expect("pack");
    Snapshot {
        spans: out
            .atlas
            .placements
            .iter()
            .map(|p| (p.key.clone(), p.sheet_index, p.span))
            .collect(),
        pixels: out.sheets.iter().map(|s| s.rgba.as_raw().clone()).collect(),
    }
}

#[test]
fn packing_is_deterministic() {
    for seed in [1u64, 7, 293] {
        assert_eq!(random_run(seed), random_run(seed));
    }
}

#[test]
fn slots_never_overlap_and_animations_stay_on_one_sheet() {
    let snap = random_run(42);
    let slots_per_sheet = (256 / 32) * (256 / 32);
    let mut seen = std::collections::HashSet::new();
    for (key, sheet, span) in &snap.spans {
        assert!(span.range().end <= slots_per_sheet, "{key} crosses sheet end");
        for slot in span.range() {
            assert!(seen.insert((*sheet, slot)), "slot {slot} on sheet {sheet} reused by {key}");
        }
    }
    // ingestion order is preserved: (sheet, start) increases monotonically
    let starts: Vec<_> = snap.spans.iter().map(|(_, s, span)| (*s, span.start())).collect();
    assert!(starts.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn slot_packer_streams_sheets_to_sink() {
    let grid = SlotGrid::new(128, 64);
    let mut ids = Vec::new();
    let sink = |sheet: FinishedSheet| -> stackatlas_core::Result<()> {
        ids.push((sheet.record.id, sheet.record.slots_used));
        Ok(())
    };
    let mut packer = SlotPacker::new(grid, sink);
    for i in 0..5 {
        packer
            .place_static(&format!("k{i}"), i, &solid(64, 64, i as u32))
            .expect("place");
    }
    assert_eq!(packer.sheet_index(), 1);
    assert_eq!(packer.cursor(), 1);
    let (count, _) = packer.finish().expect("finish");
    assert_eq!(count, 2);
    assert_eq!(ids, vec![(0, 4), (1, 1)]);
}

#[test]
fn animation_longer_than_a_sheet_is_rejected() {
    let sink = |_s: FinishedSheet| -> stackatlas_core::Result<()> { Ok(()) };
    let mut packer = SlotPacker::new(SlotGrid::new(128, 64), sink);
    let frames: Vec<_> = (0..5).map(|i| solid(8, 8, i)).collect();
    assert!(packer.place_animation("big", 0, &frames).is_err());
    assert!(packer.place_animation("none", 1, &[]).is_err());
}
