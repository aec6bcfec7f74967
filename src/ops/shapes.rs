//! Vector geometry for the painter: Bézier flattening, shape outlines,
//! scanline polygon fill and dab placement along strokes.

/// Maximum distance (px) a control point may sit from the chord before a
/// cubic segment is subdivided again.
pub const BEZIER_FLATNESS_THRESHOLD: f64 = 0.5;

/// Control-point offset ratio for approximating a quarter ellipse with one
/// cubic Bézier.
pub const ELLIPSE_KAPPA: f64 = 0.5522847498;

/// Recursion cap so degenerate input cannot subdivide forever.
const MAX_SUBDIVISION_DEPTH: u32 = 24;

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn lerp(self, other: Point, t: f64) -> Point {
        Point::new(self.x + (other.x - self.x) * t, self.y + (other.y - self.y) * t)
    }

    pub fn midpoint(self, other: Point) -> Point {
        self.lerp(other, 0.5)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

fn distance_to_line(p: Point, a: Point, b: Point) -> f64 {
    let len = a.distance(b);
    if len <= f64::EPSILON {
        return p.distance(a);
    }
    ((b.x - a.x) * (a.y - p.y) - (a.x - p.x) * (b.y - a.y)).abs() / len
}

// ============================================================================
// CLIPPING
// ============================================================================

/// Axis-aligned box in canvas coordinates. Geometry outside it cannot touch
/// a pixel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipBox {
    pub min: Point,
    pub max: Point,
}

impl ClipBox {
    pub fn unbounded() -> Self {
        Self {
            min: Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            max: Point::new(f64::INFINITY, f64::INFINITY),
        }
    }

    /// `width × height` grown by `margin` on every side.
    pub fn around(width: u32, height: u32, margin: f64) -> Self {
        let margin = if margin.is_finite() { margin.max(0.0) } else { 0.0 };
        Self {
            min: Point::new(-margin, -margin),
            max: Point::new(width as f64 + margin, height as f64 + margin),
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Whether the bounding box of `points` meets this box.
    pub fn overlaps_hull(&self, points: &[Point]) -> bool {
        let (mut lo, mut hi) = (Point::new(f64::INFINITY, f64::INFINITY), Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY));
        for p in points {
            lo = Point::new(lo.x.min(p.x), lo.y.min(p.y));
            hi = Point::new(hi.x.max(p.x), hi.y.max(p.y));
        }
        lo.x <= self.max.x && hi.x >= self.min.x && lo.y <= self.max.y && hi.y >= self.min.y
    }

    /// Liang–Barsky: the parameter range `[t0, t1]` of `a → b` that lies
    /// inside the box, or `None` when the segment misses it.
    pub fn clip_segment(&self, a: Point, b: Point) -> Option<(f64, f64)> {
        if !a.is_finite() || !b.is_finite() {
            return None;
        }
        let (dx, dy) = (b.x - a.x, b.y - a.y);
        let (mut t0, mut t1) = (0.0_f64, 1.0_f64);
        let edges = [
            (-dx, a.x - self.min.x),
            (dx, self.max.x - a.x),
            (-dy, a.y - self.min.y),
            (dy, self.max.y - a.y),
        ];
        for (p, q) in edges {
            if p == 0.0 {
                if q < 0.0 {
                    return None;
                }
                continue;
            }
            let r = q / p;
            if p < 0.0 {
                if r > t1 {
                    return None;
                }
                t0 = t0.max(r);
            } else {
                if r < t0 {
                    return None;
                }
                t1 = t1.min(r);
            }
        }
        Some((t0, t1))
    }
}

// ============================================================================
// CURVES & OUTLINES
// ============================================================================

/// Append the flattened vertices of a cubic Bézier to `out`, excluding the
/// end point `p2`. Pieces whose control hull lies outside `clip` collapse to
/// their chord.
pub fn flatten_bezier(p1: Point, c1: Point, c2: Point, p2: Point, clip: &ClipBox, out: &mut Vec<Point>) {
    flatten_recursive(p1, c1, c2, p2, clip, 0, out);
}

fn flatten_recursive(p1: Point, c1: Point, c2: Point, p2: Point, clip: &ClipBox, depth: u32, out: &mut Vec<Point>) {
    let d1 = distance_to_line(c1, p1, p2);
    let d2 = distance_to_line(c2, p1, p2);
    let flat = d1 < BEZIER_FLATNESS_THRESHOLD && d2 < BEZIER_FLATNESS_THRESHOLD;
    if flat
        || depth >= MAX_SUBDIVISION_DEPTH
        || !(d1.is_finite() && d2.is_finite())
        || !clip.overlaps_hull(&[p1, c1, c2, p2])
    {
        out.push(p1);
        return;
    }
    // de Casteljau split at t = 0.5
    let l2 = p1.midpoint(c1);
    let h = c1.midpoint(c2);
    let l3 = l2.midpoint(h);
    let r3 = c2.midpoint(p2);
    let r2 = h.midpoint(r3);
    let l4 = l3.midpoint(r2);
    flatten_recursive(p1, l2, l3, l4, clip, depth + 1, out);
    flatten_recursive(l4, r2, r3, p2, clip, depth + 1, out);
}

/// Flattened open polyline of one cubic Bézier, end points included.
pub fn bezier_points(p1: Point, c1: Point, c2: Point, p2: Point, clip: &ClipBox) -> Vec<Point> {
    let mut out = Vec::new();
    flatten_bezier(p1, c1, c2, p2, clip, &mut out);
    out.push(p2);
    out
}

fn normalize(x: f64, y: f64, w: f64, h: f64) -> (f64, f64, f64, f64) {
    let (x, w) = if w < 0.0 { (x + w, -w) } else { (x, w) };
    let (y, h) = if h < 0.0 { (y + h, -h) } else { (y, h) };
    (x, y, w, h)
}

/// Rectangle outline: top-left, bottom-left, bottom-right, top-right.
/// Negative sizes are normalized.
pub fn rect_points(x: f64, y: f64, w: f64, h: f64) -> Vec<Point> {
    let (x, y, w, h) = normalize(x, y, w, h);
    vec![
        Point::new(x, y),
        Point::new(x, y + h),
        Point::new(x + w, y + h),
        Point::new(x + w, y),
    ]
}

/// Closed outline of the ellipse inscribed in `(x, y, w, h)`, built from
/// four cubic Béziers. Empty for a degenerate box.
pub fn ellipse_points(x: f64, y: f64, w: f64, h: f64, clip: &ClipBox) -> Vec<Point> {
    let (x, y, w, h) = normalize(x, y, w, h);
    if w <= 0.0 || h <= 0.0 {
        return Vec::new();
    }
    let (left, top, right, bottom) = (x, y, x + w, y + h);
    let cx = x + w / 2.0;
    let cy = y + h / 2.0;
    let kx = w / 2.0 * ELLIPSE_KAPPA;
    let ky = h / 2.0 * ELLIPSE_KAPPA;

    let p0 = Point::new(left, cy);
    let p3 = Point::new(cx, top);
    let p6 = Point::new(right, cy);
    let p9 = Point::new(cx, bottom);

    let mut out = Vec::new();
    flatten_bezier(p0, Point::new(left, cy - ky), Point::new(cx - kx, top), p3, clip, &mut out);
    flatten_bezier(p3, Point::new(cx + kx, top), Point::new(right, cy - ky), p6, clip, &mut out);
    flatten_bezier(p6, Point::new(right, cy + ky), Point::new(cx + kx, bottom), p9, clip, &mut out);
    flatten_bezier(p9, Point::new(cx - kx, bottom), Point::new(left, cy + ky), p0, clip, &mut out);
    out
}

// ============================================================================
// FILL
// ============================================================================

/// Horizontal run of covered pixels: row, first column, one past last column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub y: u32,
    pub x0: u32,
    pub x1: u32,
}

/// Even-odd scanline fill sampled at pixel centers, clipped to
/// `width × height`.
pub fn polygon_spans(points: &[Point], width: u32, height: u32) -> Vec<Span> {
    if points.len() < 3 || !points.iter().all(|p| p.is_finite()) {
        return Vec::new();
    }
    let min_y = points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let max_y = points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
    let row_start = min_y.floor().clamp(0.0, height as f64) as u32;
    let row_end = max_y.ceil().clamp(0.0, height as f64) as u32;

    let mut spans = Vec::new();
    let mut crossings = Vec::new();
    for y in row_start..row_end {
        let sy = y as f64 + 0.5;
        crossings.clear();
        for (i, &a) in points.iter().enumerate() {
            let b = points[(i + 1) % points.len()];
            if (a.y <= sy && b.y > sy) || (b.y <= sy && a.y > sy) {
                crossings.push(a.x + (sy - a.y) * (b.x - a.x) / (b.y - a.y));
            }
        }
        crossings.sort_by(f64::total_cmp);
        for pair in crossings.chunks_exact(2) {
            let x0 = (pair[0] - 0.5).ceil().clamp(0.0, width as f64) as u32;
            let x1 = (pair[1] - 0.5).ceil().clamp(0.0, width as f64) as u32;
            if x1 > x0 {
                spans.push(Span { y, x0, x1 });
            }
        }
    }
    spans
}

// ============================================================================
// STROKE SPACING
// ============================================================================

/// Places dabs every `spacing` pixels along consecutive segments, carrying
/// the leftover distance from one segment into the next. Only dabs inside
/// the clip box are emitted; the spacing phase runs on across the parts
/// that are skipped.
#[derive(Clone, Debug)]
pub struct DabSpacer {
    spacing: f64,
    /// Distance still to travel before the next dab; `None` until the first
    /// dab is placed.
    until_next: Option<f64>,
}

impl DabSpacer {
    pub fn new(spacing: f64) -> Self {
        let spacing = if spacing.is_finite() { spacing.max(0.5) } else { 1.0 };
        Self { spacing, until_next: None }
    }

    /// Walk `a → b`, calling `emit` at each dab position inside `clip`.
    /// The very first segment of a stroke also dabs at its start point.
    pub fn segment(&mut self, a: Point, b: Point, clip: &ClipBox, mut emit: impl FnMut(Point)) {
        let len = a.distance(b);
        if !len.is_finite() {
            return;
        }
        // Dab k of this segment sits at `first + k * spacing` along it.
        let first = match self.until_next {
            Some(d) => d,
            None => {
                if clip.contains(a) {
                    emit(a);
                }
                self.spacing
            }
        };
        if first > len {
            self.until_next = Some(first - len);
            return;
        }
        if let Some((t0, t1)) = clip.clip_segment(a, b) {
            let (lo, hi) = (t0 * len, t1 * len);
            let mut k = ((lo - first) / self.spacing).ceil().max(0.0);
            loop {
                let d = first + k * self.spacing;
                if d > hi || d > len {
                    break;
                }
                emit(a.lerp(b, d / len));
                k += 1.0;
            }
        }
        let last = ((len - first) / self.spacing).floor();
        self.until_next = Some((first + (last + 1.0) * self.spacing - len).max(0.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_bezier_flattens_to_its_endpoints() {
        let pts = bezier_points(
            Point::new(0.0, 0.0),
            Point::new(3.0, 0.0),
            Point::new(6.0, 0.0),
            Point::new(9.0, 0.0),
            &ClipBox::unbounded(),
        );
        assert_eq!(pts, vec![Point::new(0.0, 0.0), Point::new(9.0, 0.0)]);
    }

    #[test]
    fn curved_bezier_vertices_stay_close_to_the_curve() {
        let (p1, c1, c2, p2) = (
            Point::new(0.0, 0.0),
            Point::new(0.0, 40.0),
            Point::new(40.0, 40.0),
            Point::new(40.0, 0.0),
        );
        let pts = bezier_points(p1, c1, c2, p2, &ClipBox::unbounded());
        assert!(pts.len() > 4);
        assert_eq!(pts.first(), Some(&p1));
        assert_eq!(pts.last(), Some(&p2));
        // Apex of this symmetric curve is at y = 30.
        let apex = pts.iter().map(|p| p.y).fold(0.0, f64::max);
        assert!((apex - 30.0).abs() < 0.5);
    }

    #[test]
    fn ellipse_outline_touches_its_box() {
        let pts = ellipse_points(10.0, 20.0, 40.0, 20.0, &ClipBox::unbounded());
        assert_eq!(pts[0], Point::new(10.0, 30.0));
        let max_x = pts.iter().map(|p| p.x).fold(f64::MIN, f64::max);
        let min_y = pts.iter().map(|p| p.y).fold(f64::MAX, f64::min);
        assert_eq!(max_x, 50.0);
        assert_eq!(min_y, 20.0);
        assert!(ellipse_points(0.0, 0.0, 0.0, 5.0, &ClipBox::unbounded()).is_empty());
    }

    #[test]
    fn rect_outline_is_normalized() {
        assert_eq!(rect_points(4.0, 4.0, -4.0, -2.0), rect_points(0.0, 2.0, 4.0, 2.0));
    }

    #[test]
    fn rectangle_fill_covers_exactly_its_pixels() {
        let spans = polygon_spans(&rect_points(1.0, 1.0, 3.0, 2.0), 10, 10);
        assert_eq!(spans, vec![Span { y: 1, x0: 1, x1: 4 }, Span { y: 2, x0: 1, x1: 4 }]);
    }

    #[test]
    fn fill_is_clipped_to_the_surface() {
        let spans = polygon_spans(&rect_points(-5.0, -5.0, 8.0, 100.0), 4, 4);
        assert_eq!(spans.len(), 4);
        assert!(spans.iter().all(|s| s.x0 == 0 && s.x1 == 3));
    }

    #[test]
    fn spacing_carries_across_segments() {
        let mut spacer = DabSpacer::new(4.0);
        let mut dabs = Vec::new();
        let clip = ClipBox::unbounded();
        spacer.segment(Point::new(0.0, 0.0), Point::new(6.0, 0.0), &clip, |p| dabs.push(p.x));
        spacer.segment(Point::new(6.0, 0.0), Point::new(12.0, 0.0), &clip, |p| dabs.push(p.x));
        assert_eq!(dabs.len(), 4);
        for (got, want) in dabs.iter().zip([0.0, 4.0, 8.0, 12.0]) {
            assert!((got - want).abs() < 1e-9, "{got} != {want}");
        }
    }

    #[test]
    fn liang_barsky_trims_to_the_box() {
        let clip = ClipBox::around(4, 3, 0.0);
        let (t0, t1) = clip.clip_segment(Point::new(-4.0, 1.0), Point::new(12.0, 1.0)).unwrap();
        assert!((t0 - 0.25).abs() < 1e-12);
        assert!((t1 - 0.5).abs() < 1e-12);
        assert_eq!(clip.clip_segment(Point::new(-4.0, 9.0), Point::new(12.0, 9.0)), None);
        assert_eq!(clip.clip_segment(Point::new(f64::NAN, 0.0), Point::new(1.0, 1.0)), None);
    }

    #[test]
    fn far_off_canvas_stroke_only_dabs_the_visible_part() {
        let clip = ClipBox::around(4, 3, 1.5);
        let mut spacer = DabSpacer::new(1.0);
        let mut dabs = Vec::new();
        spacer.segment(Point::new(0.0, 0.0), Point::new(1e9, 0.0), &clip, |p| dabs.push(p.x));
        assert_eq!(dabs.len(), 6);
        for (got, want) in dabs.iter().zip([0.0, 1.0, 2.0, 3.0, 4.0, 5.0]) {
            assert!((got - want).abs() < 1e-6, "{got} != {want}");
        }
    }

    #[test]
    fn phase_is_kept_across_a_clipped_gap() {
        // Same path walked with and without clipping: the visible dabs agree.
        let path = [Point::new(-7.3, 1.0), Point::new(2.0, 1.0), Point::new(2.0, 40.0), Point::new(2.0, 2.0)];
        let clip = ClipBox::around(4, 4, 0.0);
        let walk = |clip: &ClipBox| {
            let mut spacer = DabSpacer::new(1.5);
            let mut dabs = Vec::new();
            for pair in path.windows(2) {
                spacer.segment(pair[0], pair[1], clip, |p| dabs.push(p));
            }
            dabs
        };
        let expected: Vec<Point> = walk(&ClipBox::unbounded()).into_iter().filter(|p| clip.contains(*p)).collect();
        let got = walk(&clip);
        assert_eq!(got.len(), expected.len());
        for (g, e) in got.iter().zip(&expected) {
            assert!(g.distance(*e) < 1e-9);
        }
    }

    #[test]
    fn huge_bezier_flattens_to_few_vertices_near_the_canvas() {
        let clip = ClipBox::around(8, 8, 2.0);
        let pts = bezier_points(
            Point::new(0.0, 0.0),
            Point::new(1e9, 1e9),
            Point::new(-1e9, 1e9),
            Point::new(4.0, 0.0),
            &clip,
        );
        assert!(pts.len() < 1_000, "{} vertices", pts.len());
    }
}
