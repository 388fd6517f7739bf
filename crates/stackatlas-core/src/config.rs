use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Resampling filter used when normalizing sprites to the slot size.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    /// Nearest neighbour; keeps pixel art crisp.
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    /// Lanczos with window 3; smooth interpolation.
    Lanczos3,
}

impl ResizeFilter {
    pub fn filter_type(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Triangle => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Gaussian => FilterType::Gaussian,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

impl FromStr for ResizeFilter {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" | "nn" => Ok(Self::Nearest),
            "triangle" | "linear" | "bilinear" => Ok(Self::Triangle),
            "catmullrom" | "catmull_rom" | "cubic" => Ok(Self::CatmullRom),
            "gaussian" => Ok(Self::Gaussian),
            "lanczos" | "lanczos3" => Ok(Self::Lanczos3),
            _ => Err(()),
        }
    }
}

/// How the dither stage picks its palette.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DitherMode {
    /// Luma thresholded to pure black and white.
    Bw,
    /// Uniform palette with `DitherConfig::colors` entries.
    ColorReduce,
    /// Palette given by `DitherConfig::palette` hex codes.
    CustomPalette,
}

impl FromStr for DitherMode {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bw" | "mono" => Ok(Self::Bw),
            "color_reduce" | "reduce" => Ok(Self::ColorReduce),
            "custom_palette" | "palette" => Ok(Self::CustomPalette),
            _ => Err(()),
        }
    }
}

/// Error distribution used by the dither stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DitherMethod {
    FloydSteinberg,
    /// 4x4 Bayer threshold matrix.
    Ordered,
    /// Plain nearest-palette mapping.
    None,
}

impl FromStr for DitherMethod {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "floyd_steinberg" | "fs" => Ok(Self::FloydSteinberg),
            "ordered" | "bayer" => Ok(Self::Ordered),
            "none" => Ok(Self::None),
            _ => Err(()),
        }
    }
}

/// Named key colours for the chroma-key stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChromaKeyColor {
    Black,
    White,
    Red,
    Green,
    Blue,
    Yellow,
    Cyan,
    Magenta,
    LightGray,
    DarkGray,
    Orange,
    Purple,
}

impl ChromaKeyColor {
    pub fn rgb(self) -> [u8; 3] {
        match self {
            Self::Black => [0, 0, 0],
            Self::White => [255, 255, 255],
            Self::Red => [255, 0, 0],
            Self::Green => [0, 255, 0],
            Self::Blue => [0, 0, 255],
            Self::Yellow => [255, 255, 0],
            Self::Cyan => [0, 255, 255],
            Self::Magenta => [255, 0, 255],
            Self::LightGray => [192, 192, 192],
            Self::DarkGray => [64, 64, 64],
            Self::Orange => [255, 165, 0],
            Self::Purple => [128, 0, 128],
        }
    }
}

impl FromStr for ChromaKeyColor {
    type Err = crate::error::AtlasError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "black" => Ok(Self::Black),
            "white" => Ok(Self::White),
            "red" => Ok(Self::Red),
            "green" => Ok(Self::Green),
            "blue" => Ok(Self::Blue),
            "yellow" => Ok(Self::Yellow),
            "cyan" => Ok(Self::Cyan),
            "magenta" => Ok(Self::Magenta),
            "light_gray" | "lightgray" => Ok(Self::LightGray),
            "dark_gray" | "darkgray" => Ok(Self::DarkGray),
            "orange" => Ok(Self::Orange),
            "purple" => Ok(Self::Purple),
            other => Err(crate::error::AtlasError::UnknownColor(other.to_string())),
        }
    }
}

/// Unsharp mask.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SharpenConfig {
    pub enabled: bool,
    pub sigma: f32,
    /// Minimum brightness difference before sharpening applies.
    pub threshold: i32,
}

impl Default for SharpenConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sigma: 2.0,
            threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BlurConfig {
    pub enabled: bool,
    pub sigma: f32,
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sigma: 2.0,
        }
    }
}

/// Turns pixels near `color` fully transparent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChromaKeyConfig {
    pub enabled: bool,
    pub color: ChromaKeyColor,
    /// Every RGB channel must differ from the key by less than this.
    pub threshold: u8,
}

impl Default for ChromaKeyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            color: ChromaKeyColor::Blue,
            threshold: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DitherConfig {
    pub enabled: bool,
    pub mode: DitherMode,
    pub method: DitherMethod,
    /// Palette size for `DitherMode::ColorReduce` (2..=256).
    pub colors: u16,
    /// `#RRGGBB` entries for `DitherMode::CustomPalette`.
    pub palette: Vec<String>,
}

impl Default for DitherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: DitherMode::CustomPalette,
            method: DitherMethod::Ordered,
            colors: 256,
            palette: vec!["#000000".into(), "#FF0000".into(), "#00FF00".into()],
        }
    }
}

/// Post-resize filter chain. Stage order is fixed: sharpen, blur, chroma key, dither.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FilterChain {
    #[serde(default)]
    pub sharpen: SharpenConfig,
    #[serde(default)]
    pub blur: BlurConfig,
    #[serde(default)]
    pub chroma_key: ChromaKeyConfig,
    #[serde(default)]
    pub dither: DitherConfig,
}

impl FilterChain {
    pub fn is_identity(&self) -> bool {
        !(self.sharpen.enabled || self.blur.enabled || self.chroma_key.enabled || self.dither.enabled)
    }
}

/// Parameters for a whole run: atlas geometry, sprite processing and layout.
/// Key notes:
///   - `sheet_size` must be a multiple of `slot_size`; sprites are normalized to `slot_size`
///   - `max_animation_frames` caps GIF frames and must fit on one sheet
///   - `seed` and `quickload_threshold` are passed through to the renderer untouched
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AtlasConfig {
    /// Square sheet edge in pixels.
    pub sheet_size: u32,
    /// Square slot edge in pixels; also the sprite's longest edge after resizing.
    pub slot_size: u32,
    /// Frames kept from each animation.
    pub max_animation_frames: u32,
    #[serde(default = "default_resize_filter")]
    pub resize_filter: ResizeFilter,
    #[serde(default)]
    pub filters: FilterChain,

    /// Master seed for the renderer's deterministic choices.
    #[serde(default = "default_seed")]
    pub seed: u32,
    /// Unit count above which the renderer loads everything at once.
    #[serde(default = "default_quickload_threshold")]
    pub quickload_threshold: u32,

    /// World units between neighbouring grid cells.
    #[serde(default = "default_grid_spacing")]
    pub grid_spacing: f32,
    /// World units between stacked planes inside one cell.
    #[serde(default = "default_stack_spacing")]
    pub stack_spacing: f32,
    /// When false, directive groups take a 1x1 footprint in spiral search.
    #[serde(default = "default_ordered_grid_layout")]
    pub ordered_grid_layout: bool,
    /// Largest ring examined by the spiral search before giving up.
    #[serde(default = "default_max_spiral_radius")]
    pub max_spiral_radius: u32,

    /// Prepare sprites on a rayon pool when feature "parallel" is on.
    #[serde(default)]
    pub parallel: bool,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            sheet_size: 4096,
            slot_size: 64,
            max_animation_frames: 30,
            resize_filter: default_resize_filter(),
            filters: FilterChain::default(),
            seed: default_seed(),
            quickload_threshold: default_quickload_threshold(),
            grid_spacing: default_grid_spacing(),
            stack_spacing: default_stack_spacing(),
            ordered_grid_layout: default_ordered_grid_layout(),
            max_spiral_radius: default_max_spiral_radius(),
            parallel: false,
        }
    }
}

impl AtlasConfig {
    pub fn slots_per_row(&self) -> u32 {
        self.sheet_size / self.slot_size.max(1)
    }

    pub fn slots_per_sheet(&self) -> u32 {
        self.slots_per_row() * self.slots_per_row()
    }

    /// Validates the configuration parameters.
    ///
    /// Returns an error if:
    /// - Sheet or slot size is zero, or the sheet is not a whole number of slots
    /// - The slot count of a sheet does not fit in `u32`
    /// - The animation frame cap cannot fit on a single sheet
    /// - Layout parameters are non-positive
    /// - The dither palette is malformed
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::AtlasError;

        if self.sheet_size == 0 || self.slot_size == 0 || self.slot_size > self.sheet_size {
            return Err(AtlasError::InvalidDimensions {
                sheet_size: self.sheet_size,
                slot_size: self.slot_size,
            });
        }
        if self.sheet_size % self.slot_size != 0 {
            return Err(AtlasError::InvalidConfig(format!(
                "sheet_size ({}) is not a multiple of slot_size ({})",
                self.sheet_size, self.slot_size
            )));
        }
        let per_row = self.slots_per_row();
        if per_row.checked_mul(per_row).is_none() {
            return Err(AtlasError::InvalidConfig(format!(
                "{per_row}x{per_row} slots per sheet overflows the slot index range"
            )));
        }
        if self.max_animation_frames == 0 || self.max_animation_frames > self.slots_per_sheet() {
            return Err(AtlasError::InvalidConfig(format!(
                "max_animation_frames ({}) must be within 1..={} (slots per sheet)",
                self.max_animation_frames,
                self.slots_per_sheet()
            )));
        }
        if self.max_spiral_radius == 0 {
            return Err(AtlasError::InvalidConfig(
                "max_spiral_radius must be at least 1".into(),
            ));
        }
        if !(self.grid_spacing > 0.0) || !(self.stack_spacing >= 0.0) {
            return Err(AtlasError::InvalidConfig(format!(
                "grid_spacing ({}) must be positive and stack_spacing ({}) non-negative",
                self.grid_spacing, self.stack_spacing
            )));
        }

        let dither = &self.filters.dither;
        if dither.enabled {
            match dither.mode {
                DitherMode::ColorReduce if !(2..=256).contains(&dither.colors) => {
                    return Err(AtlasError::InvalidConfig(format!(
                        "dither colors ({}) must be within 2..=256",
                        dither.colors
                    )));
                }
                DitherMode::CustomPalette => {
                    let palette = crate::filters::parse_palette(&dither.palette)?;
                    if palette.is_empty() {
                        return Err(AtlasError::InvalidConfig(
                            "custom dither palette is empty".into(),
                        ));
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }
}

fn default_resize_filter() -> ResizeFilter {
    ResizeFilter::Nearest
}
fn default_seed() -> u32 {
    293
}
fn default_quickload_threshold() -> u32 {
    293
}
fn default_grid_spacing() -> f32 {
    1.5
}
fn default_stack_spacing() -> f32 {
    0.15
}
fn default_ordered_grid_layout() -> bool {
    true
}
fn default_max_spiral_radius() -> u32 {
    100
}

/// Builder for `AtlasConfig` for ergonomic construction.
#[derive(Debug, Default, Clone)]
pub struct AtlasConfigBuilder {
    cfg: AtlasConfig,
}

impl AtlasConfigBuilder {
    pub fn new() -> Self {
        Self {
            cfg: AtlasConfig::default(),
        }
    }
    pub fn sheet_size(mut self, v: u32) -> Self {
        self.cfg.sheet_size = v;
        self
    }
    pub fn slot_size(mut self, v: u32) -> Self {
        self.cfg.slot_size = v;
        self
    }
    pub fn max_animation_frames(mut self, v: u32) -> Self {
        self.cfg.max_animation_frames = v;
        self
    }
    pub fn resize_filter(mut self, v: ResizeFilter) -> Self {
        self.cfg.resize_filter = v;
        self
    }
    pub fn filters(mut self, v: FilterChain) -> Self {
        self.cfg.filters = v;
        self
    }
    pub fn seed(mut self, v: u32) -> Self {
        self.cfg.seed = v;
        self
    }
    pub fn quickload_threshold(mut self, v: u32) -> Self {
        self.cfg.quickload_threshold = v;
        self
    }
    pub fn grid_spacing(mut self, v: f32) -> Self {
        self.cfg.grid_spacing = v;
        self
    }
    pub fn stack_spacing(mut self, v: f32) -> Self {
        self.cfg.stack_spacing = v;
        self
    }
    pub fn ordered_grid_layout(mut self, v: bool) -> Self {
        self.cfg.ordered_grid_layout = v;
        self
    }
    pub fn max_spiral_radius(mut self, v: u32) -> Self {
        self.cfg.max_spiral_radius = v;
        self
    }
    pub fn parallel(mut self, v: bool) -> Self {
        self.cfg.parallel = v;
        self
    }
    pub fn build(self) -> AtlasConfig {
        self.cfg
    }
}

impl AtlasConfig {
    /// Create a fluent builder for `AtlasConfig`.
    pub fn builder() -> AtlasConfigBuilder {
        AtlasConfigBuilder::new()
    }
}
