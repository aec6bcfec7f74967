//! # Iterator API
//!
//! Row-major pixel cursor methods on `Iterator`:
//! `next`, `is_done`, `x`, `y`, `reset`, `get`, `set`, `get_pixel`,
//! `set_pixel`, `invert_color`, `copy_from`.

use rhai::{Array, Dynamic, Engine};

use crate::scripting::convert::{self, IntoScript, ScriptResult};
use crate::scripting::types::{IteratorHandle, lock};

pub fn register(engine: &mut Engine) {
    engine.register_type_with_name::<IteratorHandle>("Iterator");

    engine.register_fn("next", |it: &mut IteratorHandle| -> ScriptResult<bool> {
        lock(&it.session).iterator_next(it.id).into_script()
    });
    engine.register_fn("is_done", |it: &mut IteratorHandle| -> ScriptResult<bool> {
        lock(&it.session).iterator(it.id).map(|i| i.is_done()).into_script()
    });
    engine.register_fn("x", |it: &mut IteratorHandle| -> ScriptResult<i64> {
        lock(&it.session).iterator(it.id).map(|i| i.x() as i64).into_script()
    });
    engine.register_fn("y", |it: &mut IteratorHandle| -> ScriptResult<i64> {
        lock(&it.session).iterator(it.id).map(|i| i.y() as i64).into_script()
    });
    engine.register_fn("reset", |it: &mut IteratorHandle| -> ScriptResult<()> {
        lock(&it.session)
            .with_iterator(it.id, |i, _| {
                i.reset();
                Ok(())
            })
            .into_script()
    });
    engine.register_get("format", |it: &mut IteratorHandle| -> ScriptResult<String> {
        lock(&it.session).iterator(it.id).map(|i| i.format().id().to_string()).into_script()
    });

    // ── Reads ──
    engine.register_fn("get", |it: &mut IteratorHandle, channel: Dynamic| -> ScriptResult<i64> {
        let mut s = lock(&it.session);
        let format = s.iterator(it.id).into_script()?.format();
        let channel = convert::channel(&channel, format).into_script()?;
        s.with_iterator(it.id, |i, doc| i.get(doc, channel)).map(i64::from).into_script()
    });
    engine.register_fn("get_pixel", |it: &mut IteratorHandle| -> ScriptResult<Array> {
        let mut s = lock(&it.session);
        let format = s.iterator(it.id).into_script()?.format();
        let px = s.with_iterator(it.id, |i, doc| i.pixel(doc)).into_script()?;
        Ok(convert::pixel_array(&px, format))
    });

    // ── Writes ──
    engine.register_fn("set", |it: &mut IteratorHandle, channel: Dynamic, value: Dynamic| -> ScriptResult<()> {
        let mut s = lock(&it.session);
        let format = s.iterator(it.id).into_script()?.format();
        let channel = convert::channel(&channel, format).into_script()?;
        let value = convert::integer(&value, "channel value").into_script()?;
        s.with_iterator(it.id, |i, doc| i.set(doc, channel, value)).into_script()
    });
    engine.register_fn("set_pixel", |it: &mut IteratorHandle, values: Array| -> ScriptResult<()> {
        let values = convert::int_array(&values, "channel value").into_script()?;
        lock(&it.session)
            .with_iterator(it.id, |i, doc| i.set_pixel(doc, &values))
            .into_script()
    });
    engine.register_fn("invert_color", |it: &mut IteratorHandle| -> ScriptResult<()> {
        lock(&it.session).with_iterator(it.id, |i, doc| i.invert_color(doc)).into_script()
    });
    engine.register_fn("copy_from", |it: &mut IteratorHandle, other: IteratorHandle| -> ScriptResult<()> {
        lock(&it.session).iterator_copy_from(it.id, other.id).into_script()
    });
}
