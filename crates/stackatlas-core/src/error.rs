use thiserror::Error;

#[derive(Debug, Error)]
pub enum AtlasError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Invalid dimensions: sheet {sheet_size}px, slot {slot_size}px")]
    InvalidDimensions { sheet_size: u32, slot_size: u32 },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid grid shape {value:?} at {path}: expected COLSxROWS with positive integers")]
    InvalidGridShape { path: String, value: String },
    #[error("Malformed palette entry {entry:?}: expected #RRGGBB")]
    MalformedPalette { entry: String },
    #[error("Unknown color name {0:?}")]
    UnknownColor(String),
    #[error("No placement for {cols}x{rows} group at {path} within spiral radius {max_radius}")]
    LayoutInfeasible {
        path: String,
        cols: u32,
        rows: u32,
        max_radius: u32,
    },
    #[error("Corrupt source {key}: {reason}")]
    CorruptSource { key: String, reason: String },
}

pub type Result<T> = std::result::Result<T, AtlasError>;
