//! Marshalling between Rhai values and bridge types.
//!
//! Conversions fail closed: a value of the wrong shape is rejected with
//! `invalid_argument` instead of being coerced.

use rhai::{Array, Dynamic, EvalAltResult, Map, Position};

use crate::error::BridgeError;
use crate::ops::shapes::Point;
use crate::pixel::{Color, PixelFormat, PixelValue};

pub type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

/// `#{ kind, message }` object map scripts receive in `catch (err)`.
pub fn error_value(err: &BridgeError) -> Dynamic {
    let mut map = Map::new();
    map.insert("kind".into(), err.kind().into());
    map.insert("message".into(), err.to_string().into());
    map.into()
}

/// Bridge errors become catchable runtime errors, except interrupts, which
/// terminate the script.
pub fn to_eval_error(err: BridgeError) -> Box<EvalAltResult> {
    let value = error_value(&err);
    if err.is_interrupt() {
        Box::new(EvalAltResult::ErrorTerminated(value, Position::NONE))
    } else {
        Box::new(EvalAltResult::ErrorRuntime(value, Position::NONE))
    }
}

pub trait IntoScript<T> {
    fn into_script(self) -> ScriptResult<T>;
}

impl<T> IntoScript<T> for Result<T, BridgeError> {
    fn into_script(self) -> ScriptResult<T> {
        self.map_err(to_eval_error)
    }
}

fn invalid(what: &str, expected: &str, got: &Dynamic) -> BridgeError {
    BridgeError::InvalidArgument(format!("{what} must be {expected}, got {}", got.type_name()))
}

/// Integer or float.
pub fn number(value: &Dynamic, what: &str) -> Result<f64, BridgeError> {
    if let Ok(i) = value.as_int() {
        Ok(i as f64)
    } else if let Ok(f) = value.as_float() {
        Ok(f)
    } else {
        Err(invalid(what, "a number", value))
    }
}

/// Integer, or a float with no fractional part.
pub fn integer(value: &Dynamic, what: &str) -> Result<i64, BridgeError> {
    if let Ok(i) = value.as_int() {
        return Ok(i);
    }
    match value.as_float() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 => Ok(f as i64),
        _ => Err(invalid(what, "an integer", value)),
    }
}

/// `(x, y, width, height)` in integer pixels.
pub fn region(x: &Dynamic, y: &Dynamic, w: &Dynamic, h: &Dynamic) -> Result<(i64, i64, i64, i64), BridgeError> {
    Ok((integer(x, "x")?, integer(y, "y")?, integer(w, "width")?, integer(h, "height")?))
}

pub fn string(value: &Dynamic, what: &str) -> Result<String, BridgeError> {
    value.clone().into_string().map_err(|_| invalid(what, "a string", value))
}

/// Channel by index or by name (`red`, `alpha`, `gray`, ...).
pub fn channel(value: &Dynamic, format: PixelFormat) -> Result<usize, BridgeError> {
    if value.is_string() {
        let name = string(value, "channel")?;
        return format.channel_index(&name).ok_or(BridgeError::InvalidChannel { channel: name, format });
    }
    let index = integer(value, "channel")?;
    if index < 0 {
        return Err(BridgeError::InvalidChannel { channel: index.to_string(), format });
    }
    format.check_channel(index as usize)
}

/// `[x, y]` or `#{ x, y }`.
pub fn point(value: &Dynamic) -> Result<Point, BridgeError> {
    if let Some(map) = value.clone().try_cast::<Map>() {
        let coord = |key: &str| {
            map.get(key)
                .ok_or_else(|| BridgeError::InvalidArgument(format!("point map is missing '{key}'")))
                .and_then(|v| number(v, key))
        };
        return Ok(Point::new(coord("x")?, coord("y")?));
    }
    match value.clone().try_cast::<Array>() {
        Some(pair) if pair.len() == 2 => Ok(Point::new(number(&pair[0], "x")?, number(&pair[1], "y")?)),
        _ => Err(invalid("point", "[x, y] or #{x, y}", value)),
    }
}

pub fn points(values: &Array) -> Result<Vec<Point>, BridgeError> {
    values.iter().map(point).collect()
}

/// `[r, g, b]` or `[r, g, b, a]`, clamped to 0–255.
pub fn color(values: &Array) -> Result<Color, BridgeError> {
    if values.len() != 3 && values.len() != 4 {
        return Err(BridgeError::InvalidArgument(format!(
            "color needs 3 or 4 channels, got {}",
            values.len()
        )));
    }
    let mut c = [0i64, 0, 0, 255];
    for (slot, v) in c.iter_mut().zip(values) {
        *slot = integer(v, "color channel")?;
    }
    Ok(Color::clamped(c[0], c[1], c[2], c[3]))
}

pub fn format(name: &str) -> Result<PixelFormat, BridgeError> {
    name.parse()
}

/// One script integer per channel of `format`.
pub fn pixel_array(value: &PixelValue, format: PixelFormat) -> Array {
    value[..format.channel_count()].iter().map(|v| Dynamic::from(*v as i64)).collect()
}

pub fn int_array(values: &Array, what: &str) -> Result<Vec<i64>, BridgeError> {
    values.iter().map(|v| integer(v, what)).collect()
}

pub fn string_array<S: AsRef<str>>(values: impl IntoIterator<Item = S>) -> Array {
    values.into_iter().map(|s| Dynamic::from(s.as_ref().to_string())).collect()
}
