use crate::config::AtlasConfig;
use crate::error::{AtlasError, Result};
use crate::model::{Placement, SheetRecord, SlotSpan, UvRect};
use image::RgbaImage;
use tracing::debug;

/// Slot geometry of one square sheet divided into `slots_per_row²` equal square slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotGrid {
    sheet_size: u32,
    slot_size: u32,
    per_row: u32,
}

impl SlotGrid {
    pub fn new(sheet_size: u32, slot_size: u32) -> Self {
        Self {
            sheet_size,
            slot_size,
            per_row: sheet_size / slot_size.max(1),
        }
    }

    pub fn from_config(cfg: &AtlasConfig) -> Self {
        Self::new(cfg.sheet_size, cfg.slot_size)
    }

    pub fn sheet_size(&self) -> u32 {
        self.sheet_size
    }
    pub fn slot_size(&self) -> u32 {
        self.slot_size
    }
    pub fn slots_per_row(&self) -> u32 {
        self.per_row
    }
    pub fn slots_per_sheet(&self) -> u32 {
        self.per_row * self.per_row
    }

    /// Top-left pixel of slot `index`: row-major, `slots_per_row` slots per row.
    pub fn origin(&self, index: u32) -> (u32, u32) {
        (
            (index % self.per_row) * self.slot_size,
            (index / self.per_row) * self.slot_size,
        )
    }

    /// UV rectangle of `w x h` content anchored at slot `index`.
    pub fn uv(&self, index: u32, w: u32, h: u32) -> UvRect {
        let (x, y) = self.origin(index);
        let s = self.sheet_size as f32;
        UvRect {
            u0: x as f32 / s,
            v0: y as f32 / s,
            u1: (x + w) as f32 / s,
            v1: (y + h) as f32 / s,
        }
    }
}

/// A sheet whose slots are final, together with its pixels.
pub struct FinishedSheet {
    pub record: SheetRecord,
    pub rgba: RgbaImage,
}

/// Receives each sheet the moment it is finalized (full, or end of packing).
///
/// Sheets arrive in id order. An error aborts packing.
pub trait SheetSink {
    fn finalize(&mut self, sheet: FinishedSheet) -> Result<()>;
}

impl<F> SheetSink for F
where
    F: FnMut(FinishedSheet) -> Result<()>,
{
    fn finalize(&mut self, sheet: FinishedSheet) -> Result<()> {
        self(sheet)
    }
}

/// Sequential slot writer: one open sheet and a cursor in `[0, slots_per_sheet)`.
///
/// Every placement goes through `&mut self`, so the cursor advances in call order only.
/// Animations never straddle two sheets.
pub struct SlotPacker<S: SheetSink> {
    grid: SlotGrid,
    sink: S,
    sheet_index: usize,
    cursor: u32,
    canvas: Option<RgbaImage>,
    keys: Vec<String>,
}

impl<S: SheetSink> SlotPacker<S> {
    pub fn new(grid: SlotGrid, sink: S) -> Self {
        Self {
            grid,
            sink,
            sheet_index: 0,
            cursor: 0,
            canvas: None,
            keys: Vec::new(),
        }
    }

    pub fn grid(&self) -> &SlotGrid {
        &self.grid
    }

    /// Index of the currently open sheet.
    pub fn sheet_index(&self) -> usize {
        self.sheet_index
    }

    /// Next free slot on the open sheet.
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn place_static(
        &mut self,
        key: &str,
        global_index: usize,
        sprite: &RgbaImage,
    ) -> Result<Placement> {
        let slot = self.cursor;
        self.paste(slot, sprite);
        self.keys.push(key.to_string());
        let placement = self.placement(
            key,
            global_index,
            SlotSpan::Static { slot_index: slot },
            sprite.dimensions(),
        );
        self.cursor += 1;
        self.rotate_if_full()?;
        Ok(placement)
    }

    /// Places all `frames` in consecutive slots of a single sheet, opening a fresh sheet
    /// first when they do not fit in what remains of the current one.
    pub fn place_animation(
        &mut self,
        key: &str,
        global_index: usize,
        frames: &[RgbaImage],
    ) -> Result<Placement> {
        let count = frames.len() as u32;
        let Some(first) = frames.first() else {
            return Err(AtlasError::CorruptSource {
                key: key.to_string(),
                reason: "animation has no frames".into(),
            });
        };
        if count > self.grid.slots_per_sheet() {
            return Err(AtlasError::InvalidConfig(format!(
                "{key}: {count} frames exceed the {} slots of a sheet",
                self.grid.slots_per_sheet()
            )));
        }
        if self.cursor.saturating_add(count) > self.grid.slots_per_sheet() && self.cursor > 0 {
            debug!(
                key,
                frames = count,
                free = self.grid.slots_per_sheet() - self.cursor,
                "animation does not fit, opening a new sheet"
            );
            self.finalize_current()?;
        }
        let start = self.cursor;
        for (i, frame) in frames.iter().enumerate() {
            self.paste(start + i as u32, frame);
        }
        self.keys.push(key.to_string());
        let placement = self.placement(
            key,
            global_index,
            SlotSpan::Animation {
                start_slot_index: start,
                frame_count: count,
            },
            first.dimensions(),
        );
        self.cursor += count;
        self.rotate_if_full()?;
        Ok(placement)
    }

    /// Finalizes the open sheet if anything was written to it and returns the sink
    /// along with the number of sheets produced.
    pub fn finish(mut self) -> Result<(usize, S)> {
        if self.cursor > 0 {
            self.finalize_current()?;
        }
        Ok((self.sheet_index, self.sink))
    }

    fn placement(
        &self,
        key: &str,
        global_index: usize,
        span: SlotSpan,
        (w, h): (u32, u32),
    ) -> Placement {
        Placement {
            key: key.to_string(),
            global_index,
            sheet_index: self.sheet_index,
            span,
            sheet_size: self.grid.sheet_size(),
            slot_size: self.grid.slot_size(),
            rendered_width: w,
            rendered_height: h,
        }
    }

    fn paste(&mut self, slot: u32, sprite: &RgbaImage) {
        let grid = self.grid;
        let canvas = self
            .canvas
            .get_or_insert_with(|| RgbaImage::new(grid.sheet_size(), grid.sheet_size()));
        let (x, y) = grid.origin(slot);
        crate::compositing::blit_into_slot(sprite, canvas, x, y, grid.slot_size());
    }

    fn rotate_if_full(&mut self) -> Result<()> {
        if self.cursor >= self.grid.slots_per_sheet() {
            self.finalize_current()?;
        }
        Ok(())
    }

    fn finalize_current(&mut self) -> Result<()> {
        let size = self.grid.sheet_size();
        let rgba = self
            .canvas
            .take()
            .unwrap_or_else(|| RgbaImage::new(size, size));
        let record = SheetRecord {
            id: self.sheet_index,
            size,
            slots_used: self.cursor,
            capacity: self.grid.slots_per_sheet(),
            keys: std::mem::take(&mut self.keys),
        };
        debug!(
            sheet = record.id,
            slots = record.slots_used,
            units = record.keys.len(),
            "sheet finalized"
        );
        self.sink.finalize(FinishedSheet { record, rgba })?;
        self.sheet_index += 1;
        self.cursor = 0;
        Ok(())
    }
}
