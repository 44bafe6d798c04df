use std::path::Path;

use crate::animation::keyframes::FrameEffect;
use crate::foundation::core::{Canvas, Point};
use crate::foundation::error::{MontageError, MontageResult};
use crate::player::DecodedFrame;

pub type PremulRgba8 = [u8; 4];

/// CPU render target, premultiplied RGBA8.
///
/// The drawing plane spans `[-ratio, ratio]` horizontally and `[-1, 1]` vertically with +y up,
/// where `ratio` is the surface's width over height. Sprites are unit quads `[-1, 1]^2` mapped
/// into that plane by their transform.
#[derive(Clone, Debug)]
pub struct Surface {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Surface {
    pub fn new(canvas: Canvas) -> Self {
        Self {
            width: canvas.width,
            height: canvas.height,
            data: vec![0; canvas.pixel_count() * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> PremulRgba8 {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    pub fn clear(&mut self, rgba: PremulRgba8) {
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    fn ratio(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }

    fn pixel_to_plane(&self, px: f64, py: f64) -> Point {
        let ratio = self.ratio();
        Point::new(
            ((px + 0.5) / f64::from(self.width) * 2.0 - 1.0) * ratio,
            1.0 - (py + 0.5) / f64::from(self.height) * 2.0,
        )
    }

    fn plane_to_pixel(&self, p: Point) -> (f64, f64) {
        let ratio = self.ratio();
        (
            (p.x / ratio + 1.0) / 2.0 * f64::from(self.width) - 0.5,
            (1.0 - p.y) / 2.0 * f64::from(self.height) - 0.5,
        )
    }

    /// Draw `frame` through `effect`, blending source-over with the effect's opacity.
    ///
    /// Sampling is nearest-texel. Returns the number of pixels touched.
    pub fn draw_sprite(&mut self, frame: &DecodedFrame, effect: &FrameEffect) -> usize {
        if frame.width == 0 || frame.height == 0 || effect.opacity <= 0.0 {
            return 0;
        }
        let det = effect.transform.determinant();
        if !det.is_finite() || det.abs() < 1e-12 {
            return 0;
        }
        let inverse = effect.transform.inverse();

        let corners = [
            Point::new(-1.0, -1.0),
            Point::new(1.0, -1.0),
            Point::new(1.0, 1.0),
            Point::new(-1.0, 1.0),
        ];
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for c in corners {
            let (x, y) = self.plane_to_pixel(effect.transform * c);
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        let x0 = min_x.floor().max(0.0) as u32;
        let y0 = min_y.floor().max(0.0) as u32;
        let x1 = (max_x.ceil() + 1.0).clamp(0.0, f64::from(self.width)) as u32;
        let y1 = (max_y.ceil() + 1.0).clamp(0.0, f64::from(self.height)) as u32;

        let fw = f64::from(frame.width);
        let fh = f64::from(frame.height);
        let mut touched = 0;
        for py in y0..y1 {
            for px in x0..x1 {
                let local = inverse * self.pixel_to_plane(f64::from(px), f64::from(py));
                if !(-1.0..=1.0).contains(&local.x) || !(-1.0..=1.0).contains(&local.y) {
                    continue;
                }
                let tex_u = (local.x + 1.0) / 2.0;
                let tex_v = (1.0 - local.y) / 2.0;
                let tx = ((tex_u * fw) as u32).min(frame.width - 1);
                let ty = ((tex_v * fh) as u32).min(frame.height - 1);

                let mut texel = frame.texel(tx, ty);
                let toned = match effect.sepia_center {
                    Some(center) => tex_u < f64::from(center),
                    None => true,
                };
                if toned && effect.sepia > 0.0 {
                    texel = sepia(texel, effect.sepia);
                }

                let i = (py as usize * self.width as usize + px as usize) * 4;
                let dst = [
                    self.data[i],
                    self.data[i + 1],
                    self.data[i + 2],
                    self.data[i + 3],
                ];
                let out = over(dst, premultiply(texel), effect.opacity);
                self.data[i..i + 4].copy_from_slice(&out);
                touched += 1;
            }
        }
        touched
    }

    /// Surface as straight-alpha RGBA8, as the encoders and PNG export expect.
    pub fn to_straight_rgba(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        for px in out.chunks_exact_mut(4) {
            let a = u16::from(px[3]);
            if a == 0 || a == 255 {
                continue;
            }
            for c in &mut px[..3] {
                *c = ((u16::from(*c) * 255 + a / 2) / a).min(255) as u8;
            }
        }
        out
    }

    pub fn save_png(&self, path: &Path) -> MontageResult<()> {
        let img = image::RgbaImage::from_raw(self.width, self.height, self.to_straight_rgba())
            .ok_or_else(|| MontageError::validation("surface buffer does not match its size"))?;
        img.save_with_format(path, image::ImageFormat::Png)
            .map_err(|e| MontageError::export(format!("failed to write '{}': {e}", path.display())))
    }
}

/// Blend `amount` of the sepia tone of `rgba` into it. Alpha is kept.
pub fn sepia(rgba: [u8; 4], amount: f32) -> [u8; 4] {
    let amount = amount.clamp(0.0, 1.0);
    let [r, g, b, a] = rgba.map(f32::from);
    let tone = [
        0.393 * r + 0.769 * g + 0.189 * b,
        0.349 * r + 0.686 * g + 0.168 * b,
        0.272 * r + 0.534 * g + 0.131 * b,
    ];
    let mix = |orig: f32, toned: f32| (orig + (toned.min(255.0) - orig) * amount).round() as u8;
    [mix(r, tone[0]), mix(g, tone[1]), mix(b, tone[2]), a as u8]
}

pub fn premultiply(rgba: [u8; 4]) -> PremulRgba8 {
    let a = u16::from(rgba[3]);
    [
        mul_div255(u16::from(rgba[0]), a),
        mul_div255(u16::from(rgba[1]), a),
        mul_div255(u16::from(rgba[2]), a),
        rgba[3],
    ]
}

/// Source-over of premultiplied pixels with an extra opacity on `src`.
pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }
    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }
    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = add_sat_u8(sa, mul_div255(u16::from(dst[3]), inv));
    for i in 0..3 {
        let sc = mul_div255(u16::from(src[i]), op);
        let dc = mul_div255(u16::from(dst[i]), inv);
        out[i] = add_sat_u8(sc, dc);
    }
    out
}

#[inline]
fn mul_div255(x: u16, y: u16) -> u8 {
    ((u32::from(x) * u32::from(y) + 127) / 255) as u8
}

#[inline]
fn add_sat_u8(a: u8, b: u8) -> u8 {
    a.saturating_add(b)
}

#[cfg(test)]
#[path = "../../tests/unit/render/surface.rs"]
mod tests;
