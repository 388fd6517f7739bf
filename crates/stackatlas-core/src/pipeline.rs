use crate::compositing::resize_to_slot;
use crate::config::AtlasConfig;
use crate::error::{AtlasError, Result};
use crate::filters::apply_filters;
use crate::model::{Atlas, FrameInfo, SheetRecord, SpriteUnit};
use crate::packer::{FinishedSheet, SheetSink, SlotGrid, SlotPacker};
use crate::source::{DecodedSprite, SpriteSource};
use crate::tree::TreeNode;
use image::RgbaImage;
use tracing::{info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Requests prepared together before their slots are written; bounds peak memory.
const PREPARE_BATCH: usize = 256;

/// One source image to pack, in global ingestion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteRequest {
    pub key: String,
    pub global_index: usize,
    pub animated: bool,
}

/// Global, order-stable list of images under `tree` (natural order of paths).
pub fn ingest(tree: &TreeNode) -> Vec<SpriteRequest> {
    tree.ingestion_order()
        .into_iter()
        .enumerate()
        .map(|(global_index, e)| SpriteRequest {
            key: e.path,
            global_index,
            animated: e.animated,
        })
        .collect()
}

/// Placements plus the per-frame unit list of a packing run.
#[derive(Debug, Clone, Default)]
pub struct PackedAtlas {
    pub atlas: Atlas,
    pub units: Vec<SpriteUnit>,
}

/// Output of an in-memory packing run: metadata and RGBA sheets.
pub struct PackOutput {
    pub atlas: Atlas,
    pub units: Vec<SpriteUnit>,
    pub sheets: Vec<FinishedSheet>,
}

impl PackOutput {
    /// Convenience method that delegates to `atlas.stats()`.
    pub fn stats(&self) -> crate::model::PackStats {
        self.atlas.stats()
    }
}

/// Packs `requests` and keeps every finalized sheet in memory.
pub fn pack_sprites<S: SpriteSource + ?Sized>(
    requests: &[SpriteRequest],
    source: &S,
    cfg: &AtlasConfig,
) -> Result<PackOutput> {
    let mut sheets: Vec<FinishedSheet> = Vec::new();
    let packed = pack_sprites_into(requests, source, cfg, |sheet: FinishedSheet| -> Result<()> {
        sheets.push(sheet);
        Ok(())
    })?;
    Ok(PackOutput {
        atlas: packed.atlas,
        units: packed.units,
        sheets,
    })
}

#[instrument(skip_all, fields(requests = requests.len()))]
/// Packs `requests` in order, handing each sheet to `sink` as soon as it is final.
///
/// Notes:
/// - Decode, resize and filtering run in batches (on rayon when enabled); slot writes stay in request order.
/// - A unit whose pixels cannot be decoded is skipped and recorded in `Atlas::skipped`.
pub fn pack_sprites_into<S, K>(
    requests: &[SpriteRequest],
    source: &S,
    cfg: &AtlasConfig,
    sink: K,
) -> Result<PackedAtlas>
where
    S: SpriteSource + ?Sized,
    K: SheetSink,
{
    cfg.validate()?;

    let recorder = RecordingSink {
        records: Vec::new(),
        inner: sink,
    };
    let mut packer = SlotPacker::new(SlotGrid::from_config(cfg), recorder);
    let mut out = PackedAtlas::default();

    for batch in requests.chunks(PREPARE_BATCH) {
        for (req, prepared) in batch.iter().zip(prepare_batch(batch, source, cfg)) {
            let frames = match prepared {
                Ok(frames) => frames,
                Err(e) => {
                    warn!(key = %req.key, error = %e, "skip unit");
                    out.atlas.skipped.push(req.key.clone());
                    continue;
                }
            };
            let placement = if req.animated {
                packer.place_animation(&req.key, req.global_index, &frames)?
            } else {
                packer.place_static(&req.key, req.global_index, &frames[0])?
            };
            let count = frames.len() as u32;
            out.units.extend(frames.iter().enumerate().map(|(i, f)| SpriteUnit {
                source_key: req.key.clone(),
                global_index: req.global_index,
                pixel_width: f.width(),
                pixel_height: f.height(),
                frame: req.animated.then_some(FrameInfo {
                    index: i as u32,
                    count,
                }),
            }));
            out.atlas.placements.push(placement);
        }
    }

    let (_, recorder) = packer.finish()?;
    out.atlas.sheets = recorder.records;
    info!(
        sheets = out.atlas.sheets.len(),
        placed = out.atlas.placements.len(),
        skipped = out.atlas.skipped.len(),
        "packing finished"
    );
    Ok(out)
}

fn prepare_batch<S: SpriteSource + ?Sized>(
    batch: &[SpriteRequest],
    source: &S,
    cfg: &AtlasConfig,
) -> Vec<Result<Vec<RgbaImage>>> {
    #[cfg(feature = "parallel")]
    {
        if cfg.parallel {
            return batch
                .par_iter()
                .map(|req| prepare_one(req, source, cfg))
                .collect();
        }
    }
    batch
        .iter()
        .map(|req| prepare_one(req, source, cfg))
        .collect()
}

/// Decodes one request and normalizes every frame; a static image yields exactly one frame.
fn prepare_one<S: SpriteSource + ?Sized>(
    req: &SpriteRequest,
    source: &S,
    cfg: &AtlasConfig,
) -> Result<Vec<RgbaImage>> {
    let raw = match source.load(&req.key, req.animated, cfg.max_animation_frames)? {
        DecodedSprite::Static(img) => vec![img],
        DecodedSprite::Animated(mut frames) => {
            frames.truncate(cfg.max_animation_frames as usize);
            frames
        }
    };
    if raw.is_empty() {
        return Err(AtlasError::CorruptSource {
            key: req.key.clone(),
            reason: "no frames decoded".into(),
        });
    }
    if !req.animated && raw.len() != 1 {
        return Err(AtlasError::CorruptSource {
            key: req.key.clone(),
            reason: format!("static image decoded to {} frames", raw.len()),
        });
    }
    raw.iter()
        .map(|frame| {
            let (w, h) = frame.dimensions();
            if w == 0 || h == 0 {
                return Err(AtlasError::CorruptSource {
                    key: req.key.clone(),
                    reason: "zero-sized frame".into(),
                });
            }
            let resized = resize_to_slot(frame, cfg.slot_size, cfg.resize_filter);
            apply_filters(resized, &cfg.filters)
        })
        .collect()
}

/// Keeps a copy of each sheet record before forwarding the sheet.
struct RecordingSink<K> {
    records: Vec<SheetRecord>,
    inner: K,
}

impl<K: SheetSink> SheetSink for RecordingSink<K> {
    fn finalize(&mut self, sheet: FinishedSheet) -> Result<()> {
        self.records.push(sheet.record.clone());
        self.inner.finalize(sheet)
    }
}
