//! Alpha compositing: source-over blending and flattening onto a background.

use crate::color::Color;
use crate::pixmap::Pixmap;

/// Composite `src` over `dst` (straight alpha, source-over).
pub fn blend_over(dst: Color, src: Color) -> Color {
    match src.a {
        255 => return src,
        0 => return dst,
        _ => {}
    }

    let sa = f32::from(src.a) / 255.0;
    let da = f32::from(dst.a) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= f32::EPSILON {
        return Color::TRANSPARENT;
    }

    let mix = |s: u8, d: u8| -> u8 {
        let v = (f32::from(s) * sa + f32::from(d) * da * (1.0 - sa)) / out_a;
        v.round().clamp(0.0, 255.0) as u8
    };

    Color::rgba(
        mix(src.r, dst.r),
        mix(src.g, dst.g),
        mix(src.b, dst.b),
        (out_a * 255.0).round() as u8,
    )
}

/// Composite the image over an opaque `background`, producing an opaque buffer.
pub fn flatten(img: &Pixmap, background: Color) -> Pixmap {
    let background = Color::rgb(background.r, background.g, background.b);
    let mut output = img.clone();
    output.map_pixels(|px| {
        let merged = blend_over(background, Color::from_slice(px));
        px.copy_from_slice(&merged.to_array());
    });
    output
}

/// Check whether any pixel is not fully opaque.
pub fn has_transparency(img: &Pixmap) -> bool {
    img.data().chunks_exact(4).any(|px| px[3] != 255)
}
