//! Painter state and vector primitives.
//!
//! A [`PaintContext`] is bound to one layer and the transaction that was
//! open when it was created. Setters never fail; paint-op, brush and pattern
//! names are resolved on each paint call, and a failed resolution leaves the
//! layer untouched.

use std::str::FromStr;

use tracing::debug;

use crate::canvas::LayerId;
use crate::document::Document;
use crate::error::BridgeError;
use crate::guard::ExecutionGuard;
use crate::ops::paintops::{DEFAULT_PAINT_OP, DabParams, PaintOp, PaintOpRegistry, PaintSurface};
use crate::ops::resources::{DEFAULT_BRUSH, PatternDescriptor, ResourceCatalog};
use crate::ops::shapes::{self, ClipBox, DabSpacer, Point};
use crate::pixel::Color;
use crate::transaction::TransactionId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FillStyle {
    #[default]
    None,
    Foreground,
    Background,
    Pattern,
}

impl FromStr for FillStyle {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(FillStyle::None),
            "foreground" | "foreground_color" | "fg" => Ok(FillStyle::Foreground),
            "background" | "background_color" | "bg" => Ok(FillStyle::Background),
            "pattern" => Ok(FillStyle::Pattern),
            _ => Err(BridgeError::InvalidArgument(format!("unknown fill style '{s}'"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StrokeStyle {
    None,
    #[default]
    Brush,
}

impl FromStr for StrokeStyle {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(StrokeStyle::None),
            "brush" => Ok(StrokeStyle::Brush),
            _ => Err(BridgeError::InvalidArgument(format!("unknown stroke style '{s}'"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PaintPrimitive {
    At(Point),
    Line(Point, Point),
    Rect { x: f64, y: f64, w: f64, h: f64 },
    Ellipse { x: f64, y: f64, w: f64, h: f64 },
    Polygon(Vec<Point>),
    Polyline(Vec<Point>),
    Bezier { p1: Point, c1: Point, c2: Point, p2: Point },
}

impl PaintPrimitive {
    fn can_fill(&self) -> bool {
        !matches!(self, PaintPrimitive::At(_) | PaintPrimitive::Line(..) | PaintPrimitive::Bezier { .. })
    }
}

/// Everything a paint call reads or writes besides the painter itself.
pub struct PaintEnv<'a> {
    pub document: &'a mut Document,
    pub paint_ops: &'a PaintOpRegistry,
    pub resources: &'a ResourceCatalog,
    pub guard: &'a ExecutionGuard,
}

#[derive(Clone, Debug)]
pub struct PaintContext {
    layer: LayerId,
    transaction: TransactionId,
    color: Color,
    background: Color,
    brush: String,
    pattern: Option<String>,
    fill_style: FillStyle,
    stroke_style: StrokeStyle,
    opacity: f64,
    paint_op: String,
}

impl PaintContext {
    pub fn new(layer: LayerId, transaction: TransactionId) -> Self {
        Self {
            layer,
            transaction,
            color: Color::BLACK,
            background: Color::WHITE,
            brush: DEFAULT_BRUSH.to_string(),
            pattern: None,
            fill_style: FillStyle::None,
            stroke_style: StrokeStyle::Brush,
            opacity: 1.0,
            paint_op: DEFAULT_PAINT_OP.to_string(),
        }
    }

    /// Painter for `layer`, bound to its open transaction.
    pub fn for_layer(doc: &Document, layer: LayerId) -> Result<Self, BridgeError> {
        let target = doc.require_layer(layer)?;
        let open = target
            .open_transaction()
            .ok_or_else(|| BridgeError::NoOpenTransaction(target.name.clone()))?;
        Ok(Self::new(layer, open.id))
    }

    // ---- state --------------------------------------------------------------

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn transaction(&self) -> TransactionId {
        self.transaction
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn background_color(&self) -> Color {
        self.background
    }

    pub fn brush(&self) -> &str {
        &self.brush
    }

    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    pub fn fill_style(&self) -> FillStyle {
        self.fill_style
    }

    pub fn stroke_style(&self) -> StrokeStyle {
        self.stroke_style
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn paint_op(&self) -> &str {
        &self.paint_op
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    pub fn set_background_color(&mut self, color: Color) {
        self.background = color;
    }

    pub fn set_brush(&mut self, name: &str) {
        self.brush = name.to_string();
    }

    pub fn set_pattern(&mut self, name: &str) {
        self.pattern = Some(name.to_string());
    }

    pub fn set_fill_style(&mut self, style: FillStyle) {
        self.fill_style = style;
    }

    pub fn set_stroke_style(&mut self, style: StrokeStyle) {
        self.stroke_style = style;
    }

    /// Clamped to `[0, 1]`; NaN is treated as fully opaque.
    pub fn set_opacity(&mut self, opacity: f64) {
        self.opacity = if opacity.is_nan() { 1.0 } else { opacity.clamp(0.0, 1.0) };
    }

    pub fn set_paint_op(&mut self, id: &str) {
        self.paint_op = id.to_string();
    }

    // ---- primitives ---------------------------------------------------------

    pub fn paint_at(&self, env: PaintEnv<'_>, x: f64, y: f64, pressure: f64) -> Result<(), BridgeError> {
        self.paint(env, &PaintPrimitive::At(Point::new(x, y)), pressure)
    }

    pub fn paint_line(&self, env: PaintEnv<'_>, from: Point, to: Point, pressure: f64) -> Result<(), BridgeError> {
        self.paint(env, &PaintPrimitive::Line(from, to), pressure)
    }

    pub fn paint_rect(&self, env: PaintEnv<'_>, x: f64, y: f64, w: f64, h: f64, pressure: f64) -> Result<(), BridgeError> {
        self.paint(env, &PaintPrimitive::Rect { x, y, w, h }, pressure)
    }

    pub fn paint_ellipse(&self, env: PaintEnv<'_>, x: f64, y: f64, w: f64, h: f64, pressure: f64) -> Result<(), BridgeError> {
        self.paint(env, &PaintPrimitive::Ellipse { x, y, w, h }, pressure)
    }

    pub fn paint_polygon(&self, env: PaintEnv<'_>, points: Vec<Point>, pressure: f64) -> Result<(), BridgeError> {
        self.paint(env, &PaintPrimitive::Polygon(points), pressure)
    }

    pub fn paint_polyline(&self, env: PaintEnv<'_>, points: Vec<Point>, pressure: f64) -> Result<(), BridgeError> {
        self.paint(env, &PaintPrimitive::Polyline(points), pressure)
    }

    pub fn paint_bezier(
        &self,
        env: PaintEnv<'_>,
        p1: Point,
        c1: Point,
        c2: Point,
        p2: Point,
        pressure: f64,
    ) -> Result<(), BridgeError> {
        self.paint(env, &PaintPrimitive::Bezier { p1, c1, c2, p2 }, pressure)
    }

    /// Resolve names, check the transaction, then rasterize. Nothing is
    /// written unless every lookup succeeds.
    pub fn paint(&self, env: PaintEnv<'_>, primitive: &PaintPrimitive, pressure: f64) -> Result<(), BridgeError> {
        env.guard.poll()?;
        let op = env.paint_ops.get(&self.paint_op)?;
        let brush = env.resources.brush(&self.brush)?;
        let pattern = if self.fill_style == FillStyle::Pattern && primitive.can_fill() {
            let name = self.pattern.as_deref().unwrap_or("(unset)");
            Some(env.resources.pattern(name)?)
        } else {
            None
        };

        let layer = env
            .document
            .layer_mut(self.layer)
            .ok_or_else(|| BridgeError::InvalidPainter("its layer was removed".into()))?;
        match layer.open_transaction() {
            Some(open) if open.id == self.transaction => {}
            _ => {
                return Err(BridgeError::InvalidPainter(format!(
                    "transaction {} on layer '{}' has been closed",
                    self.transaction, layer.name
                )));
            }
        }

        let pressure = if pressure.is_nan() { 1.0 } else { pressure.clamp(0.0, 1.0) };
        let params = DabParams {
            color: self.color,
            background: self.background,
            brush,
            opacity: (self.opacity * pressure) as f32,
        };
        let op = op.as_ref();
        let mut surface = PaintSurface::new(layer.pixels_mut());
        // A dab reaches at most its radius plus the pixel holding its center.
        let clip = ClipBox::around(surface.width(), surface.height(), brush.radius() + 1.0);
        let stroke = Stroke { op, params: &params, clip: &clip, guard: env.guard };

        let result = match primitive {
            PaintPrimitive::At(p) => {
                op.dab(&mut surface, *p, &params);
                Ok(())
            }
            PaintPrimitive::Line(a, b) => stroke.trace(&mut surface, &[*a, *b], false),
            PaintPrimitive::Rect { x, y, w, h } => {
                self.shape(&mut surface, &shapes::rect_points(*x, *y, *w, *h), true, pattern, &stroke)
            }
            PaintPrimitive::Ellipse { x, y, w, h } => {
                self.shape(&mut surface, &shapes::ellipse_points(*x, *y, *w, *h, &clip), true, pattern, &stroke)
            }
            PaintPrimitive::Polygon(points) => self.shape(&mut surface, points, true, pattern, &stroke),
            PaintPrimitive::Polyline(points) => self.shape(&mut surface, points, false, pattern, &stroke),
            PaintPrimitive::Bezier { p1, c1, c2, p2 } => {
                stroke.trace(&mut surface, &shapes::bezier_points(*p1, *c1, *c2, *p2, &clip), false)
            }
        };
        debug!(op = %self.paint_op, pixels = surface.touched(), "paint call");
        result
    }

    /// Fill with the fill style, then stroke the outline with the stroke style.
    fn shape(
        &self,
        surface: &mut PaintSurface<'_>,
        outline: &[Point],
        closed: bool,
        pattern: Option<&PatternDescriptor>,
        stroke: &Stroke<'_>,
    ) -> Result<(), BridgeError> {
        self.fill(surface, outline, pattern, stroke)?;
        if self.stroke_style == StrokeStyle::Brush {
            stroke.trace(surface, outline, closed)?;
        }
        Ok(())
    }

    fn fill(
        &self,
        surface: &mut PaintSurface<'_>,
        outline: &[Point],
        pattern: Option<&PatternDescriptor>,
        stroke: &Stroke<'_>,
    ) -> Result<(), BridgeError> {
        let color = match self.fill_style {
            FillStyle::None => return Ok(()),
            FillStyle::Foreground => Some(self.color),
            FillStyle::Background => Some(self.background),
            FillStyle::Pattern => None,
        };
        for span in shapes::polygon_spans(outline, surface.width(), surface.height()) {
            stroke.guard.poll()?;
            for x in span.x0..span.x1 {
                let c = match (color, pattern) {
                    (Some(c), _) => c,
                    (None, Some(p)) => p.sample(x as i64, span.y as i64),
                    (None, None) => return Ok(()),
                };
                surface.blend(x as i64, span.y as i64, c, stroke.params.opacity);
            }
        }
        Ok(())
    }
}

/// Dabs between cancellation checks.
const DABS_PER_POLL: u32 = 256;

/// One paint call's stroke settings.
struct Stroke<'a> {
    op: &'a dyn PaintOp,
    params: &'a DabParams<'a>,
    clip: &'a ClipBox,
    guard: &'a ExecutionGuard,
}

impl Stroke<'_> {
    /// Dab along a path at the brush spacing, skipping the parts outside
    /// the clip box.
    fn trace(&self, surface: &mut PaintSurface<'_>, points: &[Point], closed: bool) -> Result<(), BridgeError> {
        let (first, last) = match points {
            [] => return Ok(()),
            [only] => {
                self.op.dab(surface, *only, self.params);
                return Ok(());
            }
            [first, .., last] => (*first, *last),
        };
        let mut spacer = DabSpacer::new(self.params.brush.spacing_px());
        let closing = closed.then_some((last, first));
        let segments = points.windows(2).map(|pair| (pair[0], pair[1])).chain(closing);

        let mut since_poll = 0u32;
        let mut cancelled = false;
        for (a, b) in segments {
            self.guard.poll()?;
            spacer.segment(a, b, self.clip, |p| {
                if cancelled {
                    return;
                }
                since_poll += 1;
                if since_poll >= DABS_PER_POLL {
                    since_poll = 0;
                    if self.guard.poll().is_err() {
                        cancelled = true;
                        return;
                    }
                }
                self.op.dab(surface, p, self.params);
            });
            if cancelled {
                return Err(BridgeError::Cancelled);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::resources::BrushDescriptor;
    use crate::pixel::PixelFormat;

    struct Fixture {
        doc: Document,
        ops: PaintOpRegistry,
        resources: ResourceCatalog,
        guard: ExecutionGuard,
        layer: LayerId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut doc = Document::new("t", 32, 32, PixelFormat::Rgba8);
            let layer = doc.add_layer("ink", PixelFormat::Rgba8);
            let mut resources = ResourceCatalog::default();
            resources.register_brush(BrushDescriptor::new("dot", 1.0, 1.0, 1.0));
            Self { doc, ops: PaintOpRegistry::default(), resources, guard: ExecutionGuard::unlimited(), layer }
        }

        fn env(&mut self) -> PaintEnv<'_> {
            PaintEnv {
                document: &mut self.doc,
                paint_ops: &self.ops,
                resources: &self.resources,
                guard: &self.guard,
            }
        }

        fn pixel(&self, x: u32, y: u32) -> [u16; 4] {
            self.doc.layer(self.layer).unwrap().pixels().get_pixel(x, y)
        }

        fn painter(&mut self) -> PaintContext {
            self.doc.begin_painting(self.layer, "paint").unwrap();
            let mut p = PaintContext::for_layer(&self.doc, self.layer).unwrap();
            p.set_paint_op("pen");
            p.set_brush("dot");
            p.set_color(Color::new(255, 0, 0, 255));
            p
        }
    }

    #[test]
    fn painter_requires_an_open_transaction() {
        let f = Fixture::new();
        let err = PaintContext::for_layer(&f.doc, f.layer).unwrap_err();
        assert_eq!(err.kind(), "no_open_transaction");
    }

    #[test]
    fn setters_clamp_and_never_fail() {
        let mut p = PaintContext::new(LayerId::new(), TransactionId(1));
        p.set_opacity(3.0);
        assert_eq!(p.opacity(), 1.0);
        p.set_opacity(-1.0);
        assert_eq!(p.opacity(), 0.0);
        p.set_paint_op("does-not-exist");
        assert_eq!(p.paint_op(), "does-not-exist");
    }

    #[test]
    fn unknown_paint_op_changes_nothing() {
        let mut f = Fixture::new();
        let mut p = f.painter();
        p.set_paint_op("airbrush");
        let err = p.paint_at(f.env(), 5.0, 5.0, 1.0).unwrap_err();
        assert_eq!(err.kind(), "paint_op_not_found");
        assert_eq!(f.pixel(5, 5), [0, 0, 0, 0]);
    }

    #[test]
    fn unknown_brush_changes_nothing() {
        let mut f = Fixture::new();
        let mut p = f.painter();
        p.set_brush("nope");
        assert_eq!(p.paint_line(f.env(), Point::new(0.0, 0.0), Point::new(9.0, 0.0), 1.0).unwrap_err().kind(), "resource_not_found");
        assert_eq!(f.pixel(0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn filled_rect_covers_its_interior() {
        let mut f = Fixture::new();
        let mut p = f.painter();
        p.set_fill_style(FillStyle::Foreground);
        p.set_stroke_style(StrokeStyle::None);
        p.paint_rect(f.env(), 2.0, 2.0, 4.0, 3.0, 1.0).unwrap();
        assert_eq!(f.pixel(2, 2), [255, 0, 0, 255]);
        assert_eq!(f.pixel(5, 4), [255, 0, 0, 255]);
        assert_eq!(f.pixel(6, 4), [0, 0, 0, 0]);
        assert_eq!(f.pixel(2, 5), [0, 0, 0, 0]);
    }

    #[test]
    fn stroked_line_is_continuous() {
        let mut f = Fixture::new();
        let mut p = f.painter();
        p.set_brush("hard_round");
        p.paint_line(f.env(), Point::new(1.0, 10.0), Point::new(20.0, 10.0), 1.0).unwrap();
        assert!((1..=20).all(|x| f.pixel(x, 10) == [255, 0, 0, 255]));
        assert_eq!(f.pixel(22, 10), [0, 0, 0, 0]);
    }

    #[test]
    fn pattern_fill_needs_a_known_pattern() {
        let mut f = Fixture::new();
        let mut p = f.painter();
        p.set_fill_style(FillStyle::Pattern);
        assert_eq!(p.paint_ellipse(f.env(), 0.0, 0.0, 10.0, 10.0, 1.0).unwrap_err().kind(), "resource_not_found");
        p.set_pattern("checker");
        p.set_stroke_style(StrokeStyle::None);
        p.paint_ellipse(f.env(), 0.0, 0.0, 16.0, 16.0, 1.0).unwrap();
        // checker cells are 4px: (5,5) falls in a black cell, (9,5) in a white one
        assert_eq!(f.pixel(5, 5), [0, 0, 0, 255]);
        assert_eq!(f.pixel(9, 5), [255, 255, 255, 255]);
    }

    #[test]
    fn painter_dies_with_its_transaction() {
        let mut f = Fixture::new();
        let p = f.painter();
        f.doc.end_painting(f.layer).unwrap();
        assert_eq!(p.paint_at(f.env(), 1.0, 1.0, 1.0).unwrap_err().kind(), "invalid_painter");
        f.doc.begin_painting(f.layer, "again").unwrap();
        assert_eq!(p.paint_at(f.env(), 1.0, 1.0, 1.0).unwrap_err().kind(), "invalid_painter");
    }

    #[test]
    fn shapes_clip_without_error() {
        let mut f = Fixture::new();
        let mut p = f.painter();
        p.set_fill_style(FillStyle::Background);
        p.paint_polygon(f.env(), vec![Point::new(-50.0, -50.0), Point::new(100.0, -50.0), Point::new(0.0, 100.0)], 1.0).unwrap();
        p.paint_bezier(f.env(), Point::new(-10.0, 0.0), Point::new(0.0, 60.0), Point::new(60.0, 60.0), Point::new(70.0, 0.0), 0.5).unwrap();
        assert_eq!(f.pixel(0, 0), [255, 255, 255, 255]);
    }

    #[test]
    fn zero_pressure_paints_nothing() {
        let mut f = Fixture::new();
        let p = f.painter();
        p.paint_at(f.env(), 3.0, 3.0, 0.0).unwrap();
        assert_eq!(f.pixel(3, 3), [0, 0, 0, 0]);
    }

    #[test]
    fn strokes_reaching_far_off_canvas_finish_quickly() {
        let mut f = Fixture::new();
        let mut p = f.painter();
        p.set_brush("hard_round");
        let start = std::time::Instant::now();
        p.paint_line(f.env(), Point::new(0.0, 10.0), Point::new(1e9, 10.0), 1.0).unwrap();
        p.paint_polyline(f.env(), vec![Point::new(-1e12, 3.0), Point::new(1e12, 3.0)], 1.0).unwrap();
        p.paint_ellipse(f.env(), -1e9, -1e9, 2e9 + 4.0, 2e9 + 4.0, 1.0).unwrap();
        assert!(start.elapsed().as_secs() < 5, "took {:?}", start.elapsed());
        assert_eq!(f.pixel(31, 10), [255, 0, 0, 255]);
        assert_eq!(f.pixel(0, 3), [255, 0, 0, 255]);
    }

    #[test]
    fn cancellation_stops_a_paint_call() {
        let mut f = Fixture::new();
        let p = f.painter();
        f.guard.cancel_token().cancel();
        let err = p.paint_line(f.env(), Point::new(0.0, 0.0), Point::new(31.0, 31.0), 1.0).unwrap_err();
        assert_eq!(err, BridgeError::Cancelled);
        assert_eq!(f.pixel(0, 0), [0, 0, 0, 0]);
    }
}
