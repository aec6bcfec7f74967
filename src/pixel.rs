//! Pixel formats, colors and integer rectangles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// Widest pixel the bridge stores (RGBA).
pub const MAX_CHANNELS: usize = 4;

/// Native channel values of one pixel. Channels past the format's
/// `channel_count()` are always zero.
pub type PixelValue = [u16; MAX_CHANNELS];

// ============================================================================
// PIXEL FORMAT
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    Gray8,
    #[default]
    Rgba8,
    Rgba16,
}

impl PixelFormat {
    pub fn all() -> &'static [PixelFormat] {
        &[PixelFormat::Gray8, PixelFormat::Rgba8, PixelFormat::Rgba16]
    }

    pub fn id(self) -> &'static str {
        match self {
            PixelFormat::Gray8 => "GRAY8",
            PixelFormat::Rgba8 => "RGBA8",
            PixelFormat::Rgba16 => "RGBA16",
        }
    }

    pub fn channel_count(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgba8 | PixelFormat::Rgba16 => 4,
        }
    }

    /// Channels that carry color (everything except alpha).
    pub fn color_channels(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgba8 | PixelFormat::Rgba16 => 3,
        }
    }

    pub fn alpha_channel(self) -> Option<usize> {
        match self {
            PixelFormat::Gray8 => None,
            PixelFormat::Rgba8 | PixelFormat::Rgba16 => Some(3),
        }
    }

    pub fn bytes_per_channel(self) -> usize {
        match self {
            PixelFormat::Gray8 | PixelFormat::Rgba8 => 1,
            PixelFormat::Rgba16 => 2,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        self.channel_count() * self.bytes_per_channel()
    }

    /// Largest native channel value.
    pub fn max_value(self) -> u16 {
        match self {
            PixelFormat::Gray8 | PixelFormat::Rgba8 => u8::MAX as u16,
            PixelFormat::Rgba16 => u16::MAX,
        }
    }

    /// Clamp an arbitrary integer into the native channel range.
    pub fn clamp_value(self, value: i64) -> u16 {
        value.clamp(0, self.max_value() as i64) as u16
    }

    /// Resolve a channel name (`red`, `green`, `blue`, `alpha`, `gray`, or
    /// their one-letter forms) to an index in this format.
    pub fn channel_index(self, name: &str) -> Option<usize> {
        let name = name.trim().to_ascii_lowercase();
        match self {
            PixelFormat::Gray8 => match name.as_str() {
                "gray" | "grey" | "k" | "value" => Some(0),
                _ => None,
            },
            PixelFormat::Rgba8 | PixelFormat::Rgba16 => match name.as_str() {
                "red" | "r" => Some(0),
                "green" | "g" => Some(1),
                "blue" | "b" => Some(2),
                "alpha" | "a" => Some(3),
                _ => None,
            },
        }
    }

    pub fn channel_name(self, index: usize) -> Option<&'static str> {
        match self {
            PixelFormat::Gray8 => ["gray"].get(index).copied(),
            PixelFormat::Rgba8 | PixelFormat::Rgba16 => {
                ["red", "green", "blue", "alpha"].get(index).copied()
            }
        }
    }

    /// Validate a channel index against this format.
    pub fn check_channel(self, index: usize) -> Result<usize, BridgeError> {
        if index < self.channel_count() {
            Ok(index)
        } else {
            Err(BridgeError::InvalidChannel { channel: index.to_string(), format: self })
        }
    }

    /// Pixel as straight RGBA in `[0, 1]`. Gray is expanded and treated as opaque.
    pub fn to_normalized(self, value: &PixelValue) -> [f32; 4] {
        let max = self.max_value() as f32;
        match self {
            PixelFormat::Gray8 => {
                let g = value[0] as f32 / max;
                [g, g, g, 1.0]
            }
            PixelFormat::Rgba8 | PixelFormat::Rgba16 => [
                value[0] as f32 / max,
                value[1] as f32 / max,
                value[2] as f32 / max,
                value[3] as f32 / max,
            ],
        }
    }

    /// Inverse of [`to_normalized`](Self::to_normalized). Gray stores the
    /// luminance of the color and drops alpha.
    pub fn from_normalized(self, rgba: [f32; 4]) -> PixelValue {
        let max = self.max_value() as f32;
        let q = |v: f32| (v.clamp(0.0, 1.0) * max).round() as u16;
        match self {
            PixelFormat::Gray8 => [q(luma(rgba[0], rgba[1], rgba[2])), 0, 0, 0],
            PixelFormat::Rgba8 | PixelFormat::Rgba16 => {
                [q(rgba[0]), q(rgba[1]), q(rgba[2]), q(rgba[3])]
            }
        }
    }

    /// Convert a native pixel of this format into `target`.
    pub fn convert(self, value: &PixelValue, target: PixelFormat) -> PixelValue {
        match (self, target) {
            (a, b) if a == b => *value,
            // Exact integer paths between the two RGBA depths.
            (PixelFormat::Rgba8, PixelFormat::Rgba16) => value.map(|v| v * 257),
            (PixelFormat::Rgba16, PixelFormat::Rgba8) => {
                value.map(|v| ((v as u32 + 128) / 257) as u16)
            }
            _ => target.from_normalized(self.to_normalized(value)),
        }
    }

    pub fn from_color(self, color: Color) -> PixelValue {
        match self {
            PixelFormat::Rgba8 => [color.r as u16, color.g as u16, color.b as u16, color.a as u16],
            PixelFormat::Rgba16 => PixelFormat::Rgba8.convert(
                &[color.r as u16, color.g as u16, color.b as u16, color.a as u16],
                PixelFormat::Rgba16,
            ),
            PixelFormat::Gray8 => [color.luma() as u16, 0, 0, 0],
        }
    }

    pub fn to_color(self, value: &PixelValue) -> Color {
        let v = self.convert(value, PixelFormat::Rgba8);
        Color::new(v[0] as u8, v[1] as u8, v[2] as u8, v[3] as u8)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for PixelFormat {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GRAY8" | "GREY8" | "GRAY" | "L8" => Ok(PixelFormat::Gray8),
            "RGBA8" | "RGBA" => Ok(PixelFormat::Rgba8),
            "RGBA16" => Ok(PixelFormat::Rgba16),
            _ => Err(BridgeError::InvalidArgument(format!("unknown pixel format '{s}'"))),
        }
    }
}

/// Rec. 601 luma weights, the same ones desaturate uses.
pub fn luma(r: f32, g: f32, b: f32) -> f32 {
    0.299 * r + 0.587 * g + 0.114 * b
}

// ============================================================================
// COLOR
// ============================================================================

/// Straight-alpha 8-bit color as scripts specify it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0, 255);
    pub const WHITE: Color = Color::new(255, 255, 255, 255);
    pub const TRANSPARENT: Color = Color::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Build from unchecked integers, clamping each channel to 0–255.
    pub fn clamped(r: i64, g: i64, b: i64, a: i64) -> Self {
        let c = |v: i64| v.clamp(0, 255) as u8;
        Self::new(c(r), c(g), c(b), c(a))
    }

    pub fn luma(self) -> u8 {
        ((self.r as u32 * 299 + self.g as u32 * 587 + self.b as u32 * 114 + 500) / 1000) as u8
    }

    pub fn to_normalized(self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        ]
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

// ============================================================================
// RECT
// ============================================================================

/// Pixel rectangle already clipped to some surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const EMPTY: Rect = Rect { x: 0, y: 0, width: 0, height: 0 };

    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Intersect an unchecked request with a `bounds_w × bounds_h` surface.
    /// Non-positive sizes and disjoint requests give [`Rect::EMPTY`].
    pub fn clip(x: i64, y: i64, w: i64, h: i64, bounds_w: u32, bounds_h: u32) -> Rect {
        if w <= 0 || h <= 0 {
            return Rect::EMPTY;
        }
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = x.saturating_add(w).min(bounds_w as i64);
        let y1 = y.saturating_add(h).min(bounds_h as i64);
        if x1 <= x0 || y1 <= y0 {
            return Rect::EMPTY;
        }
        Rect::new(x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// One past the last column.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// One past the last row.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn intersect(&self, other: &Rect) -> Rect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            Rect::EMPTY
        } else {
            Rect::new(x0, y0, x1 - x0, y1 - y0)
        }
    }

    /// Row-major positions inside the rectangle.
    pub fn positions(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (self.y..self.bottom()).flat_map(move |y| (self.x..self.right()).map(move |x| (x, y)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names_resolve_per_format() {
        assert_eq!(PixelFormat::Rgba8.channel_index("Red"), Some(0));
        assert_eq!(PixelFormat::Rgba16.channel_index("alpha"), Some(3));
        assert_eq!(PixelFormat::Gray8.channel_index("gray"), Some(0));
        assert_eq!(PixelFormat::Gray8.channel_index("red"), None);
        assert!(PixelFormat::Gray8.check_channel(1).is_err());
    }

    #[test]
    fn depth_conversion_is_exact_at_the_extremes() {
        let px = [0, 128, 255, 255];
        let wide = PixelFormat::Rgba8.convert(&px, PixelFormat::Rgba16);
        assert_eq!(wide, [0, 128 * 257, 65535, 65535]);
        assert_eq!(PixelFormat::Rgba16.convert(&wide, PixelFormat::Rgba8), px);
    }

    #[test]
    fn gray_conversion_uses_luma_and_is_opaque() {
        let gray = PixelFormat::Rgba8.convert(&[255, 255, 255, 0], PixelFormat::Gray8);
        assert_eq!(gray[0], 255);
        let back = PixelFormat::Gray8.convert(&[100, 0, 0, 0], PixelFormat::Rgba8);
        assert_eq!(back, [100, 100, 100, 255]);
    }

    #[test]
    fn formats_parse_case_insensitively() {
        assert_eq!("rgba16".parse::<PixelFormat>().ok(), Some(PixelFormat::Rgba16));
        assert_eq!("gray8".parse::<PixelFormat>().ok(), Some(PixelFormat::Gray8));
        assert!("cmyk".parse::<PixelFormat>().is_err());
        assert_eq!(PixelFormat::Rgba8.clamp_value(300), 255);
        assert_eq!(PixelFormat::Rgba16.clamp_value(-4), 0);
    }

    #[test]
    fn clip_intersects_with_bounds() {
        assert_eq!(Rect::clip(-2, -2, 5, 5, 10, 10), Rect::new(0, 0, 3, 3));
        assert_eq!(Rect::clip(8, 8, 5, 5, 10, 10), Rect::new(8, 8, 2, 2));
        assert!(Rect::clip(20, 0, 5, 5, 10, 10).is_empty());
        assert!(Rect::clip(0, 0, 0, 5, 10, 10).is_empty());
        let r = Rect::new(1, 1, 2, 2);
        assert_eq!(r.positions().collect::<Vec<_>>(), vec![(1, 1), (2, 1), (1, 2), (2, 2)]);
    }
}
