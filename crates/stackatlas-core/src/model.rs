use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Axis-aligned rectangle (pixels). `x,y` is top-left; `w,h` are sizes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }
}

/// Normalized `[0,1]` sub-region of a sheet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct UvRect {
    pub u0: f32,
    pub v0: f32,
    pub u1: f32,
    pub v1: f32,
}

/// Frame position of a unit inside an animation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrameInfo {
    pub index: u32,
    pub count: u32,
}

/// One packable item: a static image or one frame of an animation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpriteUnit {
    /// Path of the source image; shared by all frames of one animation.
    pub source_key: String,
    /// Ingestion order across the whole tree.
    pub global_index: usize,
    /// Post-resize size.
    pub pixel_width: u32,
    pub pixel_height: u32,
    /// `Some` for animation frames.
    pub frame: Option<FrameInfo>,
}

/// Slots taken by one placed source image.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotSpan {
    Static { slot_index: u32 },
    Animation { start_slot_index: u32, frame_count: u32 },
}

impl SlotSpan {
    pub fn start(&self) -> u32 {
        match *self {
            Self::Static { slot_index } => slot_index,
            Self::Animation {
                start_slot_index, ..
            } => start_slot_index,
        }
    }

    pub fn len(&self) -> u32 {
        match *self {
            Self::Static { .. } => 1,
            Self::Animation { frame_count, .. } => frame_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn range(&self) -> Range<u32> {
        self.start()..self.start() + self.len()
    }

    pub fn is_animation(&self) -> bool {
        matches!(self, Self::Animation { .. })
    }
}

/// Where one source image landed in the atlas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Placement {
    pub key: String,
    pub global_index: usize,
    pub sheet_index: usize,
    pub span: SlotSpan,
    pub sheet_size: u32,
    pub slot_size: u32,
    /// Size of the pasted pixels (first frame for animations).
    pub rendered_width: u32,
    pub rendered_height: u32,
}

impl Placement {
    /// Pixel rectangle of the first (or only) slot content.
    pub fn pixel_rect(&self) -> Rect {
        let grid = crate::packer::SlotGrid::new(self.sheet_size, self.slot_size);
        let (x, y) = grid.origin(self.span.start());
        Rect::new(x, y, self.rendered_width, self.rendered_height)
    }

    /// UV rectangle of the first (or only) slot content.
    pub fn uv_rect(&self) -> UvRect {
        crate::packer::SlotGrid::new(self.sheet_size, self.slot_size).uv(
            self.span.start(),
            self.rendered_width,
            self.rendered_height,
        )
    }
}

/// A finalized atlas sheet (logical record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetRecord {
    pub id: usize,
    pub size: u32,
    /// Slots occupied, counted from slot 0.
    pub slots_used: u32,
    /// Slot capacity (`slots_per_row²`).
    pub capacity: u32,
    /// Keys of the units on this sheet in packing order.
    pub keys: Vec<String>,
}

/// Atlas of sheets and placements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Atlas {
    pub sheets: Vec<SheetRecord>,
    pub placements: Vec<Placement>,
    /// Source keys dropped because they could not be decoded.
    pub skipped: Vec<String>,
}

/// Statistics about slot usage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PackStats {
    pub num_sheets: usize,
    /// Source images placed (an animation counts once).
    pub num_units: usize,
    pub num_animations: usize,
    /// Slots written (one per static image or animation frame).
    pub used_slots: u64,
    /// Slot capacity of all finalized sheets.
    pub total_slots: u64,
    /// used_slots / total_slots (0.0 to 1.0).
    pub occupancy: f64,
    pub skipped_units: usize,
}

impl Atlas {
    pub fn placement(&self, key: &str) -> Option<&Placement> {
        self.placements.iter().find(|p| p.key == key)
    }

    /// Computes slot statistics for this atlas.
    pub fn stats(&self) -> PackStats {
        let used_slots: u64 = self.sheets.iter().map(|s| s.slots_used as u64).sum();
        let total_slots: u64 = self.sheets.iter().map(|s| s.capacity as u64).sum();
        let occupancy = if total_slots > 0 {
            used_slots as f64 / total_slots as f64
        } else {
            0.0
        };
        PackStats {
            num_sheets: self.sheets.len(),
            num_units: self.placements.len(),
            num_animations: self
                .placements
                .iter()
                .filter(|p| p.span.is_animation())
                .count(),
            used_slots,
            total_slots,
            occupancy,
            skipped_units: self.skipped.len(),
        }
    }
}

impl PackStats {
    /// Returns a human-readable summary of the statistics.
    pub fn summary(&self) -> String {
        format!(
            "Sheets: {}, Units: {} ({} animated), Slots: {}/{}, Occupancy: {:.2}%, Skipped: {}",
            self.num_sheets,
            self.num_units,
            self.num_animations,
            self.used_slots,
            self.total_slots,
            self.occupancy * 100.0,
            self.skipped_units
        )
    }
}
