//! Post-resize filter chain applied to every sprite and animation frame.
//!
//! Stages run in a fixed order (sharpen, blur, chroma key, dither) and each is
//! toggled independently through [`FilterChain`].

use crate::config::{DitherConfig, DitherMethod, DitherMode, FilterChain};
use crate::error::{AtlasError, Result};
use image::imageops::{self, ColorMap};
use image::{Rgba, RgbaImage};

const BAYER_4X4: [[u8; 4]; 4] = [[0, 8, 2, 10], [12, 4, 14, 6], [3, 11, 1, 9], [15, 7, 13, 5]];

/// Runs the enabled stages of `chain` over `img`.
pub fn apply_filters(mut img: RgbaImage, chain: &FilterChain) -> Result<RgbaImage> {
    if chain.sharpen.enabled {
        img = imageops::unsharpen(&img, chain.sharpen.sigma, chain.sharpen.threshold);
    }
    if chain.blur.enabled {
        img = imageops::blur(&img, chain.blur.sigma);
    }
    if chain.chroma_key.enabled {
        chroma_key(&mut img, chain.chroma_key.color.rgb(), chain.chroma_key.threshold);
    }
    if chain.dither.enabled {
        dither(&mut img, &chain.dither)?;
    }
    Ok(img)
}

/// Makes every pixel whose RGB channels are all within `threshold` of `key` transparent.
pub fn chroma_key(img: &mut RgbaImage, key: [u8; 3], threshold: u8) {
    for px in img.pixels_mut() {
        let near = (0..3).all(|c| px[c].abs_diff(key[c]) < threshold);
        if near {
            px[3] = 0;
        }
    }
}

/// Parses `#RRGGBB` (or `RRGGBB`) entries.
pub fn parse_palette(entries: &[String]) -> Result<Vec<[u8; 3]>> {
    entries
        .iter()
        .map(|entry| {
            let hex = entry.trim().trim_start_matches('#');
            let malformed = || AtlasError::MalformedPalette {
                entry: entry.clone(),
            };
            if hex.len() != 6 || !hex.is_ascii() {
                return Err(malformed());
            }
            let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| malformed());
            Ok([channel(0)?, channel(2)?, channel(4)?])
        })
        .collect()
}

/// Uniform RGB cube palette; levels per channel is `floor(cbrt(colors))`, at least 2.
pub fn uniform_palette(colors: u16) -> Vec<[u8; 3]> {
    let mut levels = 1u32;
    while (levels + 1).pow(3) <= colors as u32 {
        levels += 1;
    }
    let levels = levels.max(2);
    let step = |i: u32| (i * 255 / (levels - 1)) as u8;
    let mut out = Vec::with_capacity(levels.pow(3) as usize);
    for r in 0..levels {
        for g in 0..levels {
            for b in 0..levels {
                out.push([step(r), step(g), step(b)]);
            }
        }
    }
    out
}

/// Nearest-colour palette over RGB; alpha passes through untouched.
struct PaletteMap {
    colors: Vec<[u8; 3]>,
}

impl PaletteMap {
    fn nearest(&self, r: u8, g: u8, b: u8) -> usize {
        let mut best = 0;
        let mut best_d = u32::MAX;
        for (i, c) in self.colors.iter().enumerate() {
            let dr = r.abs_diff(c[0]) as u32;
            let dg = g.abs_diff(c[1]) as u32;
            let db = b.abs_diff(c[2]) as u32;
            let d = dr * dr + dg * dg + db * db;
            if d < best_d {
                best_d = d;
                best = i;
            }
        }
        best
    }
}

impl ColorMap for PaletteMap {
    type Color = Rgba<u8>;

    fn index_of(&self, color: &Rgba<u8>) -> usize {
        self.nearest(color[0], color[1], color[2])
    }

    fn map_color(&self, color: &mut Rgba<u8>) {
        let c = self.colors[self.index_of(color)];
        color[0] = c[0];
        color[1] = c[1];
        color[2] = c[2];
    }
}

fn dither(img: &mut RgbaImage, cfg: &DitherConfig) -> Result<()> {
    let colors = match cfg.mode {
        DitherMode::Bw => {
            for px in img.pixels_mut() {
                let l = luma(px);
                px[0] = l;
                px[1] = l;
                px[2] = l;
            }
            vec![[0, 0, 0], [255, 255, 255]]
        }
        DitherMode::ColorReduce => uniform_palette(cfg.colors),
        DitherMode::CustomPalette => parse_palette(&cfg.palette)?,
    };
    if colors.is_empty() {
        return Err(AtlasError::InvalidConfig("dither palette is empty".into()));
    }
    let map = PaletteMap { colors };

    match cfg.method {
        DitherMethod::FloydSteinberg => imageops::dither(img, &map),
        DitherMethod::None => {
            for px in img.pixels_mut() {
                map.map_color(px);
            }
        }
        DitherMethod::Ordered => {
            let spread = 255.0 / (map.colors.len().saturating_sub(1).max(1)) as f32;
            for (x, y, px) in img.enumerate_pixels_mut() {
                let t = (BAYER_4X4[(y % 4) as usize][(x % 4) as usize] as f32 + 0.5) / 16.0 - 0.5;
                for c in 0..3 {
                    px[c] = (px[c] as f32 + spread * t).round().clamp(0.0, 255.0) as u8;
                }
                map.map_color(px);
            }
        }
    }
    Ok(())
}

fn luma(px: &Rgba<u8>) -> u8 {
    let l = 299 * px[0] as u32 + 587 * px[1] as u32 + 114 * px[2] as u32;
    (l / 1000) as u8
}
