//! # Painter API
//!
//! `Painter` state setters and paint primitives. Every primitive takes an
//! optional trailing pressure in `[0, 1]`.

use rhai::{Array, Dynamic, Engine};

use crate::error::BridgeError;
use crate::ops::painter::{FillStyle, PaintContext, PaintPrimitive, StrokeStyle};
use crate::ops::shapes::Point;
use crate::pixel::Color;
use crate::scripting::convert::{self, IntoScript, ScriptResult};
use crate::scripting::types::{PainterHandle, lock};

fn with_painter<R>(p: &PainterHandle, f: impl FnOnce(&mut PaintContext) -> R) -> ScriptResult<R> {
    lock(&p.session).painter_mut(p.id).map(f).into_script()
}

fn paint(p: &PainterHandle, primitive: Result<PaintPrimitive, BridgeError>, pressure: Option<&Dynamic>) -> ScriptResult<()> {
    let primitive = primitive.into_script()?;
    let pressure = match pressure {
        Some(v) => convert::number(v, "pressure").into_script()?,
        None => 1.0,
    };
    lock(&p.session).paint(p.id, &primitive, pressure).into_script()
}

fn rgb(r: &Dynamic, g: &Dynamic, b: &Dynamic, a: Option<&Dynamic>) -> ScriptResult<Color> {
    let mut channels: Array = vec![r.clone(), g.clone(), b.clone()];
    channels.extend(a.cloned());
    convert::color(&channels).into_script()
}

fn xy(x: &Dynamic, y: &Dynamic) -> Result<Point, BridgeError> {
    Ok(Point::new(convert::number(x, "x")?, convert::number(y, "y")?))
}

fn at(x: &Dynamic, y: &Dynamic) -> Result<PaintPrimitive, BridgeError> {
    Ok(PaintPrimitive::At(xy(x, y)?))
}

fn line(x1: &Dynamic, y1: &Dynamic, x2: &Dynamic, y2: &Dynamic) -> Result<PaintPrimitive, BridgeError> {
    Ok(PaintPrimitive::Line(xy(x1, y1)?, xy(x2, y2)?))
}

fn boxed(x: &Dynamic, y: &Dynamic, w: &Dynamic, h: &Dynamic) -> Result<(f64, f64, f64, f64), BridgeError> {
    Ok((
        convert::number(x, "x")?,
        convert::number(y, "y")?,
        convert::number(w, "width")?,
        convert::number(h, "height")?,
    ))
}

fn rect(x: &Dynamic, y: &Dynamic, w: &Dynamic, h: &Dynamic) -> Result<PaintPrimitive, BridgeError> {
    let (x, y, w, h) = boxed(x, y, w, h)?;
    Ok(PaintPrimitive::Rect { x, y, w, h })
}

fn ellipse(x: &Dynamic, y: &Dynamic, w: &Dynamic, h: &Dynamic) -> Result<PaintPrimitive, BridgeError> {
    let (x, y, w, h) = boxed(x, y, w, h)?;
    Ok(PaintPrimitive::Ellipse { x, y, w, h })
}

fn bezier(c: [&Dynamic; 8]) -> Result<PaintPrimitive, BridgeError> {
    Ok(PaintPrimitive::Bezier {
        p1: xy(c[0], c[1])?,
        c1: xy(c[2], c[3])?,
        c2: xy(c[4], c[5])?,
        p2: xy(c[6], c[7])?,
    })
}

pub fn register(engine: &mut Engine) {
    engine.register_type_with_name::<PainterHandle>("Painter");

    // ========== STATE ==========
    engine.register_fn("set_color", |p: &mut PainterHandle, r: Dynamic, g: Dynamic, b: Dynamic| -> ScriptResult<()> {
        let color = rgb(&r, &g, &b, None)?;
        with_painter(p, |ctx| ctx.set_color(color))
    });
    engine.register_fn(
        "set_color",
        |p: &mut PainterHandle, r: Dynamic, g: Dynamic, b: Dynamic, a: Dynamic| -> ScriptResult<()> {
            let color = rgb(&r, &g, &b, Some(&a))?;
            with_painter(p, |ctx| ctx.set_color(color))
        },
    );
    engine.register_fn("set_color", |p: &mut PainterHandle, rgba: Array| -> ScriptResult<()> {
        let color = convert::color(&rgba).into_script()?;
        with_painter(p, |ctx| ctx.set_color(color))
    });
    engine.register_fn(
        "set_background_color",
        |p: &mut PainterHandle, r: Dynamic, g: Dynamic, b: Dynamic| -> ScriptResult<()> {
            let color = rgb(&r, &g, &b, None)?;
            with_painter(p, |ctx| ctx.set_background_color(color))
        },
    );
    engine.register_fn("set_background_color", |p: &mut PainterHandle, rgba: Array| -> ScriptResult<()> {
        let color = convert::color(&rgba).into_script()?;
        with_painter(p, |ctx| ctx.set_background_color(color))
    });
    engine.register_fn("set_brush", |p: &mut PainterHandle, name: &str| -> ScriptResult<()> {
        with_painter(p, |ctx| ctx.set_brush(name))
    });
    engine.register_fn("set_pattern", |p: &mut PainterHandle, name: &str| -> ScriptResult<()> {
        with_painter(p, |ctx| ctx.set_pattern(name))
    });
    engine.register_fn("set_paint_op", |p: &mut PainterHandle, id: &str| -> ScriptResult<()> {
        with_painter(p, |ctx| ctx.set_paint_op(id))
    });
    engine.register_fn("set_opacity", |p: &mut PainterHandle, opacity: Dynamic| -> ScriptResult<()> {
        let opacity = convert::number(&opacity, "opacity").into_script()?;
        with_painter(p, |ctx| ctx.set_opacity(opacity))
    });
    engine.register_fn("set_fill_style", |p: &mut PainterHandle, style: &str| -> ScriptResult<()> {
        let style: FillStyle = style.parse().into_script()?;
        with_painter(p, |ctx| ctx.set_fill_style(style))
    });
    engine.register_fn("set_stroke_style", |p: &mut PainterHandle, style: &str| -> ScriptResult<()> {
        let style: StrokeStyle = style.parse().into_script()?;
        with_painter(p, |ctx| ctx.set_stroke_style(style))
    });

    engine.register_get("color", |p: &mut PainterHandle| -> ScriptResult<Array> {
        with_painter(p, |ctx| ctx.color().to_array().iter().map(|c| Dynamic::from(*c as i64)).collect())
    });
    engine.register_get("opacity", |p: &mut PainterHandle| with_painter(p, |ctx| ctx.opacity()));
    engine.register_get("brush", |p: &mut PainterHandle| with_painter(p, |ctx| ctx.brush().to_string()));
    engine.register_get("paint_op", |p: &mut PainterHandle| with_painter(p, |ctx| ctx.paint_op().to_string()));

    // ========== PRIMITIVES ==========
    engine.register_fn("paint_at", |p: &mut PainterHandle, x: Dynamic, y: Dynamic| paint(p, at(&x, &y), None));
    engine.register_fn("paint_at", |p: &mut PainterHandle, x: Dynamic, y: Dynamic, pressure: Dynamic| {
        paint(p, at(&x, &y), Some(&pressure))
    });

    engine.register_fn(
        "paint_line",
        |p: &mut PainterHandle, x1: Dynamic, y1: Dynamic, x2: Dynamic, y2: Dynamic| {
            paint(p, line(&x1, &y1, &x2, &y2), None)
        },
    );
    engine.register_fn(
        "paint_line",
        |p: &mut PainterHandle, x1: Dynamic, y1: Dynamic, x2: Dynamic, y2: Dynamic, pressure: Dynamic| {
            paint(p, line(&x1, &y1, &x2, &y2), Some(&pressure))
        },
    );

    engine.register_fn("paint_rect", |p: &mut PainterHandle, x: Dynamic, y: Dynamic, w: Dynamic, h: Dynamic| {
        paint(p, rect(&x, &y, &w, &h), None)
    });
    engine.register_fn(
        "paint_rect",
        |p: &mut PainterHandle, x: Dynamic, y: Dynamic, w: Dynamic, h: Dynamic, pressure: Dynamic| {
            paint(p, rect(&x, &y, &w, &h), Some(&pressure))
        },
    );

    engine.register_fn("paint_ellipse", |p: &mut PainterHandle, x: Dynamic, y: Dynamic, w: Dynamic, h: Dynamic| {
        paint(p, ellipse(&x, &y, &w, &h), None)
    });
    engine.register_fn(
        "paint_ellipse",
        |p: &mut PainterHandle, x: Dynamic, y: Dynamic, w: Dynamic, h: Dynamic, pressure: Dynamic| {
            paint(p, ellipse(&x, &y, &w, &h), Some(&pressure))
        },
    );

    engine.register_fn("paint_polygon", |p: &mut PainterHandle, points: Array| {
        paint(p, convert::points(&points).map(PaintPrimitive::Polygon), None)
    });
    engine.register_fn("paint_polygon", |p: &mut PainterHandle, points: Array, pressure: Dynamic| {
        paint(p, convert::points(&points).map(PaintPrimitive::Polygon), Some(&pressure))
    });

    engine.register_fn("paint_polyline", |p: &mut PainterHandle, points: Array| {
        paint(p, convert::points(&points).map(PaintPrimitive::Polyline), None)
    });
    engine.register_fn("paint_polyline", |p: &mut PainterHandle, points: Array, pressure: Dynamic| {
        paint(p, convert::points(&points).map(PaintPrimitive::Polyline), Some(&pressure))
    });

    engine.register_fn(
        "paint_bezier_curve",
        |p: &mut PainterHandle,
         x1: Dynamic,
         y1: Dynamic,
         cx1: Dynamic,
         cy1: Dynamic,
         cx2: Dynamic,
         cy2: Dynamic,
         x2: Dynamic,
         y2: Dynamic| { paint(p, bezier([&x1, &y1, &cx1, &cy1, &cx2, &cy2, &x2, &y2]), None) },
    );
    engine.register_fn(
        "paint_bezier_curve",
        |p: &mut PainterHandle,
         x1: Dynamic,
         y1: Dynamic,
         cx1: Dynamic,
         cy1: Dynamic,
         cx2: Dynamic,
         cy2: Dynamic,
         x2: Dynamic,
         y2: Dynamic,
         pressure: Dynamic| {
            paint(p, bezier([&x1, &y1, &cx1, &cy1, &cx2, &cy2, &x2, &y2]), Some(&pressure))
        },
    );
}
