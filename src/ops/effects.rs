//! Pixel kernels behind the built-in filters. Each kernel works in place on
//! a [`PixelRegion`] in the layer's native format; rows run in parallel.

use rayon::prelude::*;

use crate::canvas::TiledStore;
use crate::error::BridgeError;
use crate::guard::ExecutionGuard;
use crate::pixel::{PixelFormat, PixelValue, Rect};

/// Scratch copy of a layer rectangle. Filters write here; the layer is only
/// touched once the whole transform succeeds.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelRegion {
    pub format: PixelFormat,
    pub rect: Rect,
    pub pixels: Vec<PixelValue>,
}

impl PixelRegion {
    pub fn read(store: &TiledStore, rect: Rect) -> Self {
        let rect = rect.intersect(&store.bounds());
        Self { format: store.format(), rect, pixels: store.read_region(rect) }
    }

    pub fn width(&self) -> usize {
        self.rect.width as usize
    }

    pub fn height(&self) -> usize {
        self.rect.height as usize
    }

    pub fn get(&self, x: usize, y: usize) -> PixelValue {
        self.pixels[y * self.width() + x]
    }

    /// Apply `f` to every pixel, one rayon task per row.
    fn for_each_pixel(&mut self, f: impl Fn(&mut PixelValue) + Sync + Send) {
        let w = self.width().max(1);
        self.pixels.par_chunks_mut(w).for_each(|row| row.iter_mut().for_each(&f));
    }
}

// --- Invert ---

pub fn invert_core(region: &mut PixelRegion) {
    let max = region.format.max_value();
    let n = region.format.color_channels();
    region.for_each_pixel(|px| {
        for v in px.iter_mut().take(n) {
            *v = max - *v;
        }
    });
}

// --- Desaturate ---

/// Rec. 601 luma into every color channel. RGBA formats only.
pub fn desaturate_core(region: &mut PixelRegion) {
    region.for_each_pixel(|px| {
        let gray = ((px[0] as u32 * 299 + px[1] as u32 * 587 + px[2] as u32 * 114) / 1000) as u16;
        px[0] = gray;
        px[1] = gray;
        px[2] = gray;
    });
}

// --- Sepia ---

/// Classic sepia matrix blended with the original by `strength` (0–1).
pub fn sepia_core(region: &mut PixelRegion, strength: f32) {
    let strength = strength.clamp(0.0, 1.0);
    let inv = 1.0 - strength;
    let max = region.format.max_value() as f32;
    region.for_each_pixel(|px| {
        let r = px[0] as f32;
        let g = px[1] as f32;
        let b = px[2] as f32;
        let sr = (r * 0.393 + g * 0.769 + b * 0.189).min(max);
        let sg = (r * 0.349 + g * 0.686 + b * 0.168).min(max);
        let sb = (r * 0.272 + g * 0.534 + b * 0.131).min(max);
        px[0] = (r * inv + sr * strength) as u16;
        px[1] = (g * inv + sg * strength) as u16;
        px[2] = (b * inv + sb * strength) as u16;
    });
}

// --- Levels ---

/// Input black/white point remap with gamma, through a 256-entry LUT.
/// 8-bit formats only.
pub fn levels_core(region: &mut PixelRegion, black: f32, white: f32, gamma: f32) {
    let in_range = (white - black).max(1.0);
    let inv_gamma = 1.0 / gamma.max(0.01);
    let mut lut = [0u16; 256];
    for (i, item) in lut.iter_mut().enumerate() {
        let normalized = ((i as f32 - black) / in_range).clamp(0.0, 1.0);
        *item = (normalized.powf(inv_gamma) * 255.0).clamp(0.0, 255.0) as u16;
    }
    let n = region.format.color_channels();
    region.for_each_pixel(|px| {
        for v in px.iter_mut().take(n) {
            *v = lut[(*v).min(255) as usize];
        }
    });
}

// --- Box Blur ---

/// Separable box blur of `radius` pixels over all channels. Samples past
/// the region edge clamp to the edge. `guard` is polled once per row; on
/// cancellation the region is left as it was.
pub fn box_blur_core(region: &mut PixelRegion, radius: u32, guard: &ExecutionGuard) -> Result<(), BridgeError> {
    let w = region.width();
    let h = region.height();
    if radius == 0 || w == 0 || h == 0 {
        return Ok(());
    }
    let n = region.format.channel_count();
    let r = radius as i64;
    let inv_k = 1.0 / (r * 2 + 1) as f32;
    let src = &region.pixels;

    // Separable: horizontal pass
    let mut h_buf = vec![[0.0f32; 4]; w * h];
    h_buf.par_chunks_mut(w).enumerate().try_for_each(|(y, row_out)| {
        guard.poll()?;
        for (x, out) in row_out.iter_mut().enumerate() {
            let mut sums = [0.0f32; 4];
            for k in -r..=r {
                let sx = (x as i64 + k).clamp(0, w as i64 - 1) as usize;
                let px = src[y * w + sx];
                for c in 0..n {
                    sums[c] += px[c] as f32;
                }
            }
            for c in 0..n {
                out[c] = sums[c] * inv_k;
            }
        }
        Ok(())
    })?;

    // Vertical pass
    let mut out = vec![[0u16; 4]; w * h];
    out.par_chunks_mut(w).enumerate().try_for_each(|(y, row_out)| {
        guard.poll()?;
        for (x, px) in row_out.iter_mut().enumerate() {
            let mut sums = [0.0f32; 4];
            for k in -r..=r {
                let sy = (y as i64 + k).clamp(0, h as i64 - 1) as usize;
                let v = h_buf[sy * w + x];
                for c in 0..n {
                    sums[c] += v[c];
                }
            }
            for c in 0..n {
                px[c] = (sums[c] * inv_k).round() as u16;
            }
        }
        Ok(())
    })?;
    region.pixels = out;
    Ok(())
}

// --- Pixelate ---

/// Replace every block of `block_size²` pixels with the block's center
/// pixel.
pub fn pixelate_core(region: &mut PixelRegion, block_size: u32, guard: &ExecutionGuard) -> Result<(), BridgeError> {
    let bs = block_size.max(2) as usize;
    let w = region.width();
    let h = region.height();
    if w == 0 || h == 0 {
        return Ok(());
    }
    let src = region.pixels.clone();
    region.pixels.par_chunks_mut(w).enumerate().try_for_each(|(y, row_out)| {
        guard.poll()?;
        let sy = ((y / bs) * bs + bs / 2).min(h - 1);
        for (x, px) in row_out.iter_mut().enumerate() {
            let sx = ((x / bs) * bs + bs / 2).min(w - 1);
            *px = src[sy * w + sx];
        }
        Ok(())
    })
}
