//! Named brushes and patterns the painter resolves at paint time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;
use crate::pixel::Color;

pub const DEFAULT_BRUSH: &str = "basic_circle";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrushDescriptor {
    pub name: String,
    /// Dab diameter in pixels.
    pub diameter: f64,
    /// Fraction of the radius painted at full strength (0 = all falloff).
    pub hardness: f64,
    /// Dab spacing as a fraction of the diameter.
    pub spacing: f64,
}

impl BrushDescriptor {
    pub fn new(name: &str, diameter: f64, hardness: f64, spacing: f64) -> Self {
        Self {
            name: name.to_string(),
            diameter: diameter.max(0.0),
            hardness: hardness.clamp(0.0, 1.0),
            spacing: spacing.max(0.0),
        }
    }

    pub fn radius(&self) -> f64 {
        self.diameter / 2.0
    }

    /// Distance between dabs in pixels, never below half a pixel.
    pub fn spacing_px(&self) -> f64 {
        (self.diameter * self.spacing).max(0.5)
    }
}

/// Tiling RGBA pattern.
#[derive(Clone, Debug, PartialEq)]
pub struct PatternDescriptor {
    pub name: String,
    width: u32,
    height: u32,
    pixels: Vec<Color>,
}

impl PatternDescriptor {
    pub fn new(name: &str, width: u32, height: u32, pixels: Vec<Color>) -> Result<Self, BridgeError> {
        if width == 0 || height == 0 || pixels.len() != (width * height) as usize {
            return Err(BridgeError::InvalidArgument(format!(
                "pattern '{name}' needs {width}×{height} pixels, got {}",
                pixels.len()
            )));
        }
        Ok(Self { name: name.to_string(), width, height, pixels })
    }

    /// Two-color checkerboard with square cells of `cell` pixels.
    pub fn checker(name: &str, cell: u32, a: Color, b: Color) -> Self {
        let cell = cell.max(1);
        let size = cell * 2;
        let pixels = (0..size * size)
            .map(|i| {
                let (x, y) = (i % size, i / size);
                if (x / cell + y / cell) % 2 == 0 { a } else { b }
            })
            .collect();
        Self { name: name.to_string(), width: size, height: size, pixels }
    }

    /// Horizontal stripes `band` pixels tall.
    pub fn stripes(name: &str, band: u32, a: Color, b: Color) -> Self {
        let band = band.max(1);
        let pixels = (0..band * 2).map(|y| if y < band { a } else { b }).collect();
        Self { name: name.to_string(), width: 1, height: band * 2, pixels }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Color at canvas position `(x, y)`, tiling in both directions.
    pub fn sample(&self, x: i64, y: i64) -> Color {
        let px = x.rem_euclid(self.width as i64) as u32;
        let py = y.rem_euclid(self.height as i64) as u32;
        self.pixels[(py * self.width + px) as usize]
    }
}

pub struct ResourceCatalog {
    brushes: BTreeMap<String, BrushDescriptor>,
    patterns: BTreeMap<String, PatternDescriptor>,
}

impl Default for ResourceCatalog {
    fn default() -> Self {
        let mut catalog = Self::empty();
        catalog.register_brush(BrushDescriptor::new(DEFAULT_BRUSH, 10.0, 0.8, 0.1));
        catalog.register_brush(BrushDescriptor::new("pixel", 1.0, 1.0, 1.0));
        catalog.register_brush(BrushDescriptor::new("hard_round", 5.0, 1.0, 0.25));
        catalog.register_brush(BrushDescriptor::new("soft_round", 20.0, 0.2, 0.1));
        catalog.register_pattern(PatternDescriptor::checker("checker", 4, Color::BLACK, Color::WHITE));
        catalog.register_pattern(PatternDescriptor::stripes("stripes", 2, Color::BLACK, Color::TRANSPARENT));
        catalog
    }
}

impl ResourceCatalog {
    pub fn empty() -> Self {
        Self { brushes: BTreeMap::new(), patterns: BTreeMap::new() }
    }

    /// Add or replace a brush.
    pub fn register_brush(&mut self, brush: BrushDescriptor) {
        self.brushes.insert(brush.name.clone(), brush);
    }

    /// Add or replace a pattern.
    pub fn register_pattern(&mut self, pattern: PatternDescriptor) {
        self.patterns.insert(pattern.name.clone(), pattern);
    }

    pub fn brush(&self, name: &str) -> Result<&BrushDescriptor, BridgeError> {
        self.brushes.get(name).ok_or_else(|| BridgeError::ResourceNotFound {
            kind: "brush",
            name: name.to_string(),
        })
    }

    pub fn pattern(&self, name: &str) -> Result<&PatternDescriptor, BridgeError> {
        self.patterns.get(name).ok_or_else(|| BridgeError::ResourceNotFound {
            kind: "pattern",
            name: name.to_string(),
        })
    }

    pub fn brush_names(&self) -> Vec<String> {
        self.brushes.keys().cloned().collect()
    }

    pub fn pattern_names(&self) -> Vec<String> {
        self.patterns.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_resolves_builtins() {
        let catalog = ResourceCatalog::default();
        assert_eq!(catalog.brush(DEFAULT_BRUSH).unwrap().diameter, 10.0);
        assert!(catalog.pattern("checker").is_ok());
        let err = catalog.brush("nope").unwrap_err();
        assert_eq!(err.kind(), "resource_not_found");
        assert_eq!(err.to_string(), "brush not found: nope");
    }

    #[test]
    fn patterns_tile_in_both_directions() {
        let p = PatternDescriptor::checker("c", 2, Color::BLACK, Color::WHITE);
        assert_eq!(p.sample(0, 0), Color::BLACK);
        assert_eq!(p.sample(2, 0), Color::WHITE);
        assert_eq!(p.sample(-1, 0), Color::WHITE);
        assert_eq!(p.sample(4, 4), Color::BLACK);
    }

    #[test]
    fn pattern_size_is_validated() {
        assert!(PatternDescriptor::new("bad", 2, 2, vec![Color::BLACK; 3]).is_err());
        assert!(PatternDescriptor::new("ok", 1, 2, vec![Color::BLACK; 2]).is_ok());
    }

    #[test]
    fn spacing_has_a_floor() {
        assert_eq!(BrushDescriptor::new("tiny", 1.0, 1.0, 0.1).spacing_px(), 0.5);
        assert_eq!(BrushDescriptor::new("big", 40.0, 1.0, 0.25).spacing_px(), 10.0);
    }
}
