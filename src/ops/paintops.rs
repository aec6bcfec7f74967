//! Paint operations: how a single dab lands on a layer.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::canvas::{TiledStore, blend_normal};
use crate::error::BridgeError;
use crate::ops::resources::BrushDescriptor;
use crate::ops::shapes::Point;
use crate::pixel::{Color, PixelFormat};

pub const DEFAULT_PAINT_OP: &str = "paintbrush";

/// Per-dab inputs resolved from the painter state.
pub struct DabParams<'a> {
    pub color: Color,
    pub background: Color,
    pub brush: &'a BrushDescriptor,
    /// Painter opacity already multiplied by pressure.
    pub opacity: f32,
}

/// Write access to one layer store with clipping and blending. Positions
/// outside the store are ignored.
pub struct PaintSurface<'a> {
    store: &'a mut TiledStore,
    touched: u64,
}

impl<'a> PaintSurface<'a> {
    pub fn new(store: &'a mut TiledStore) -> Self {
        Self { store, touched: 0 }
    }

    pub fn width(&self) -> u32 {
        self.store.width()
    }

    pub fn height(&self) -> u32 {
        self.store.height()
    }

    pub fn format(&self) -> PixelFormat {
        self.store.format()
    }

    /// Pixel writes performed so far.
    pub fn touched(&self) -> u64 {
        self.touched
    }

    fn in_bounds(&self, x: i64, y: i64) -> Option<(u32, u32)> {
        (x >= 0 && y >= 0 && x < self.width() as i64 && y < self.height() as i64).then(|| (x as u32, y as u32))
    }

    /// Source-over `color` at `coverage` (0–1).
    pub fn blend(&mut self, x: i64, y: i64, color: Color, coverage: f32) {
        let Some((x, y)) = self.in_bounds(x, y) else { return };
        if coverage <= 0.0 {
            return;
        }
        let format = self.format();
        let base = format.to_normalized(&self.store.get_pixel(x, y));
        let out = blend_normal(base, color.to_normalized(), coverage);
        self.store.put_pixel(x, y, &format.from_normalized(out));
        self.touched += 1;
    }

    /// Remove `amount` (0–1) of the pixel's alpha. Formats without alpha
    /// are painted with `background` instead.
    pub fn erase(&mut self, x: i64, y: i64, amount: f32, background: Color) {
        let Some((px, py)) = self.in_bounds(x, y) else { return };
        if amount <= 0.0 {
            return;
        }
        let format = self.format();
        if format.alpha_channel().is_none() {
            self.blend(x, y, background, amount);
            return;
        }
        let mut rgba = format.to_normalized(&self.store.get_pixel(px, py));
        rgba[3] *= 1.0 - amount.clamp(0.0, 1.0);
        self.store.put_pixel(px, py, &format.from_normalized(rgba));
        self.touched += 1;
    }
}

pub trait PaintOp: Send + Sync {
    fn id(&self) -> &str;
    fn dab(&self, surface: &mut PaintSurface<'_>, center: Point, params: &DabParams<'_>);
}

/// Visit the in-bounds pixels a round dab of `radius` around `center` may
/// touch, passing each pixel's center distance. The pixel containing
/// `center` is reported at distance zero so even sub-pixel brushes leave a
/// mark.
fn for_each_dab_pixel(
    center: Point,
    radius: f64,
    width: u32,
    height: u32,
    mut visit: impl FnMut(i64, i64, f64),
) {
    if !center.is_finite() || !radius.is_finite() {
        return;
    }
    let clamp_x = |v: f64| v.clamp(-1.0, width as f64) as i64;
    let clamp_y = |v: f64| v.clamp(-1.0, height as f64) as i64;
    let home = (clamp_x(center.x.floor()), clamp_y(center.y.floor()));
    let x0 = clamp_x((center.x - radius).floor()).max(0);
    let x1 = clamp_x((center.x + radius).ceil()).min(width as i64 - 1);
    let y0 = clamp_y((center.y - radius).floor()).max(0);
    let y1 = clamp_y((center.y + radius).ceil()).min(height as i64 - 1);
    for y in y0..=y1 {
        for x in x0..=x1 {
            let d = if (x, y) == home {
                0.0
            } else {
                Point::new(x as f64 + 0.5, y as f64 + 0.5).distance(center)
            };
            visit(x, y, d);
        }
    }
}

/// Linear falloff outside the hard core.
fn soft_coverage(d: f64, radius: f64, hardness: f64) -> f32 {
    let core = radius * hardness;
    if d <= core {
        1.0
    } else if d < radius {
        (1.0 - (d - core) / (radius - core)) as f32
    } else {
        0.0
    }
}

/// Soft round dab with hardness falloff.
pub struct Paintbrush;

impl PaintOp for Paintbrush {
    fn id(&self) -> &str {
        "paintbrush"
    }

    fn dab(&self, surface: &mut PaintSurface<'_>, center: Point, params: &DabParams<'_>) {
        let radius = params.brush.radius().max(0.5);
        for_each_dab_pixel(center, radius, surface.width(), surface.height(), |x, y, d| {
            let cov = soft_coverage(d, radius, params.brush.hardness);
            surface.blend(x, y, params.color, cov * params.opacity);
        });
    }
}

/// Hard aliased dab: a pixel is either painted or not.
pub struct Pen;

impl PaintOp for Pen {
    fn id(&self) -> &str {
        "pen"
    }

    fn dab(&self, surface: &mut PaintSurface<'_>, center: Point, params: &DabParams<'_>) {
        let radius = params.brush.radius().max(0.5);
        for_each_dab_pixel(center, radius, surface.width(), surface.height(), |x, y, d| {
            if d <= radius {
                surface.blend(x, y, params.color, params.opacity);
            }
        });
    }
}

/// Soft dab that removes alpha.
pub struct Eraser;

impl PaintOp for Eraser {
    fn id(&self) -> &str {
        "eraser"
    }

    fn dab(&self, surface: &mut PaintSurface<'_>, center: Point, params: &DabParams<'_>) {
        let radius = params.brush.radius().max(0.5);
        for_each_dab_pixel(center, radius, surface.width(), surface.height(), |x, y, d| {
            let cov = soft_coverage(d, radius, params.brush.hardness);
            surface.erase(x, y, cov * params.opacity, params.background);
        });
    }
}

pub struct PaintOpRegistry {
    ops: BTreeMap<String, Arc<dyn PaintOp>>,
}

impl Default for PaintOpRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(Paintbrush));
        registry.register(Arc::new(Pen));
        registry.register(Arc::new(Eraser));
        registry
    }
}

impl PaintOpRegistry {
    pub fn empty() -> Self {
        Self { ops: BTreeMap::new() }
    }

    pub fn register(&mut self, op: Arc<dyn PaintOp>) {
        self.ops.insert(op.id().to_string(), op);
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn PaintOp>, BridgeError> {
        self.ops
            .get(id)
            .cloned()
            .ok_or_else(|| BridgeError::PaintOpNotFound(id.to_string()))
    }

    pub fn ids(&self) -> Vec<String> {
        self.ops.keys().cloned().collect()
    }
}
