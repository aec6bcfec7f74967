//! # Utility API
//!
//! Math and color helpers that need no session access.

use rhai::{Array, Dynamic, Engine};

/// HSL with hue in degrees and saturation/lightness in percent.
pub(crate) fn rgb_to_hsl(r: i64, g: i64, b: i64) -> (f64, f64, f64) {
    let rf = r.clamp(0, 255) as f64 / 255.0;
    let gf = g.clamp(0, 255) as f64 / 255.0;
    let bf = b.clamp(0, 255) as f64 / 255.0;
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let l = (max + min) / 2.0;
    let d = max - min;
    if d.abs() < 1e-10 {
        return (0.0, 0.0, l * 100.0);
    }
    let s = if l > 0.5 { d / (2.0 - max - min) } else { d / (max + min) };
    let h = if max == rf {
        (gf - bf) / d + if gf < bf { 6.0 } else { 0.0 }
    } else if max == gf {
        (bf - rf) / d + 2.0
    } else {
        (rf - gf) / d + 4.0
    };
    (h * 60.0, s * 100.0, l * 100.0)
}

pub(crate) fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (i64, i64, i64) {
    let h = h.rem_euclid(360.0);
    let s = (s / 100.0).clamp(0.0, 1.0);
    let l = (l / 100.0).clamp(0.0, 1.0);
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let h2 = h / 60.0;
    let x = c * (1.0 - (h2 % 2.0 - 1.0).abs());
    let (r1, g1, b1) = match h2 as i32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    let to_byte = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as i64;
    (to_byte(r1), to_byte(g1), to_byte(b1))
}

pub fn register(engine: &mut Engine) {
    engine.register_fn("clamp", |v: i64, lo: i64, hi: i64| -> i64 { v.max(lo).min(hi) });
    engine.register_fn("clamp_f", |v: f64, lo: f64, hi: f64| -> f64 { v.max(lo).min(hi) });
    engine.register_fn("lerp", |a: f64, b: f64, t: f64| -> f64 { a + (b - a) * t });
    engine.register_fn("distance", |x1: f64, y1: f64, x2: f64, y2: f64| -> f64 {
        ((x2 - x1).powi(2) + (y2 - y1).powi(2)).sqrt()
    });
    engine.register_fn("abs", |x: f64| -> f64 { x.abs() });
    engine.register_fn("min", |a: i64, b: i64| -> i64 { a.min(b) });
    engine.register_fn("max", |a: i64, b: i64| -> i64 { a.max(b) });
    engine.register_fn("min", |a: f64, b: f64| -> f64 { a.min(b) });
    engine.register_fn("max", |a: f64, b: f64| -> f64 { a.max(b) });

    engine.register_fn("rgb_to_hsl", |r: i64, g: i64, b: i64| -> Array {
        let (h, s, l) = rgb_to_hsl(r, g, b);
        vec![Dynamic::from(h), Dynamic::from(s), Dynamic::from(l)]
    });
    engine.register_fn("hsl_to_rgb", |h: f64, s: f64, l: f64| -> Array {
        let (r, g, b) = hsl_to_rgb(h, s, l);
        vec![Dynamic::from(r), Dynamic::from(g), Dynamic::from(b)]
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsl_of_primaries() {
        assert_eq!(rgb_to_hsl(255, 0, 0), (0.0, 100.0, 50.0));
        let (h, s, l) = rgb_to_hsl(0, 0, 255);
        assert!((h - 240.0).abs() < 1e-9 && (s - 100.0).abs() < 1e-9 && (l - 50.0).abs() < 1e-9);
        assert_eq!(rgb_to_hsl(128, 128, 128).1, 0.0);
    }

    #[test]
    fn hsl_back_to_rgb() {
        assert_eq!(hsl_to_rgb(0.0, 100.0, 50.0), (255, 0, 0));
        assert_eq!(hsl_to_rgb(120.0, 100.0, 50.0), (0, 255, 0));
        assert_eq!(hsl_to_rgb(0.0, 0.0, 100.0), (255, 255, 255));
        let (r, g, b) = rgb_to_hsl(30, 140, 200);
        assert_eq!(hsl_to_rgb(r, g, b), (30, 140, 200));
    }
}
