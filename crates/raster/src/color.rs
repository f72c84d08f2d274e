//! Colour sampling: quantization, dominant colours, brightness, nearest match.

use crate::error::{invalid_params, Result};
use crate::pixmap::Pixmap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// An RGBA colour with 8-bit channels.
///
/// Equality is exact on all four channels. Distance only looks at RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
    /// Alpha (255 = opaque)
    pub a: u8,
}

impl Color {
    /// Fully transparent black.
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
    /// Opaque white.
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    /// Opaque black.
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    /// Opaque colour from RGB.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Colour from RGBA.
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Channels as an array in RGBA order.
    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Colour from a 4-byte RGBA slice.
    pub fn from_slice(px: &[u8]) -> Self {
        Self::rgba(px[0], px[1], px[2], px[3])
    }

    /// Squared Euclidean distance in RGB space.
    pub fn distance_sq(self, other: Color) -> u32 {
        let dr = i32::from(self.r) - i32::from(other.r);
        let dg = i32::from(self.g) - i32::from(other.g);
        let db = i32::from(self.b) - i32::from(other.b);
        (dr * dr + dg * dg + db * db) as u32
    }

    /// Euclidean distance in RGB space.
    pub fn distance(self, other: Color) -> f64 {
        f64::from(self.distance_sq(other)).sqrt()
    }

    /// `#rrggbb`, or `#rrggbbaa` when not opaque.
    pub fn to_hex(self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (leading `#` optional).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let byte = |s: &str| u8::from_str_radix(s, 16).ok();
        match hex.len() {
            3 => {
                let r = byte(&hex[0..1])?;
                let g = byte(&hex[1..2])?;
                let b = byte(&hex[2..3])?;
                Some(Self::rgb(r * 17, g * 17, b * 17))
            }
            6 => Some(Self::rgb(byte(&hex[0..2])?, byte(&hex[2..4])?, byte(&hex[4..6])?)),
            8 => Some(Self::rgba(
                byte(&hex[0..2])?,
                byte(&hex[2..4])?,
                byte(&hex[4..6])?,
                byte(&hex[6..8])?,
            )),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Color::from_hex(&value).ok_or_else(|| format!("invalid colour: {value}"))
    }
}

impl From<Color> for String {
    fn from(c: Color) -> Self {
        c.to_hex()
    }
}

/// Round each RGB channel to the nearest multiple of `bucket_size`.
///
/// Channels that would round past 255 are clamped to 255. The result is opaque
/// so that colours differing only in alpha share a histogram bucket.
pub fn quantize_color(pixel: Color, bucket_size: u8) -> Color {
    if bucket_size <= 1 {
        return Color::rgb(pixel.r, pixel.g, pixel.b);
    }
    let q = |c: u8| -> u8 {
        let bucket = f64::from(bucket_size);
        let v = (f64::from(c) / bucket).round() * bucket;
        v.min(255.0) as u8
    };
    Color::rgb(q(pixel.r), q(pixel.g), q(pixel.b))
}

/// Most frequent quantized colours among every `sample_stride`-th pixel.
///
/// Sorted by descending count; ties keep first-seen order. Returns at most
/// `top_n` colours and never pads.
pub fn dominant_colors(
    buffer: &Pixmap,
    sample_stride: usize,
    bucket_size: u8,
    top_n: usize,
) -> Result<Vec<Color>> {
    Ok(color_histogram(buffer, sample_stride, bucket_size)?
        .into_iter()
        .take(top_n)
        .map(|(color, _)| color)
        .collect())
}

/// Quantized colour counts in descending order, ties in first-seen order.
pub fn color_histogram(
    buffer: &Pixmap,
    sample_stride: usize,
    bucket_size: u8,
) -> Result<Vec<(Color, usize)>> {
    if sample_stride == 0 {
        return Err(invalid_params("sample stride must be at least 1"));
    }

    let mut index: HashMap<Color, usize> = HashMap::new();
    let mut counts: Vec<(Color, usize)> = Vec::new();

    for px in buffer.data().chunks_exact(4).step_by(sample_stride) {
        let key = quantize_color(Color::from_slice(px), bucket_size);
        match index.get(&key) {
            Some(&slot) => counts[slot].1 += 1,
            None => {
                index.insert(key, counts.len());
                counts.push((key, 1));
            }
        }
    }

    // stable sort keeps encounter order for equal counts
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    Ok(counts)
}

/// Mean of `(R + G + B) / 3` over every `sample_stride`-th pixel.
pub fn average_brightness(buffer: &Pixmap, sample_stride: usize) -> Result<f64> {
    if sample_stride == 0 {
        return Err(invalid_params("sample stride must be at least 1"));
    }

    let (total, count) = buffer
        .data()
        .chunks_exact(4)
        .step_by(sample_stride)
        .fold((0.0_f64, 0_usize), |(total, count), px| {
            let sum = f64::from(px[0]) + f64::from(px[1]) + f64::from(px[2]);
            (total + sum / 3.0, count + 1)
        });

    Ok(if count == 0 { 0.0 } else { total / count as f64 })
}

/// Palette entry closest to `pixel` in RGB space; ties go to the earlier entry.
pub fn nearest_color(pixel: Color, palette: &[Color]) -> Option<Color> {
    let mut best: Option<(Color, u32)> = None;
    for &candidate in palette {
        let d = pixel.distance_sq(candidate);
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((candidate, d)),
        }
    }
    best.map(|(c, _)| c)
}
