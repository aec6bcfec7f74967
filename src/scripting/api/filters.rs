//! # Filter API
//!
//! `get_filter(id)` returns a `Filter` carrying its own copy of the
//! configuration; `process` applies it to a layer, optionally limited to a
//! rectangle.

use rhai::{Array, Dynamic, Engine};

use crate::scripting::convert::{self, IntoScript, ScriptResult};
use crate::scripting::types::{FilterRef, LayerHandle, SharedSession, lock};

pub fn register(engine: &mut Engine, session: &SharedSession) {
    engine.register_type_with_name::<FilterRef>("Filter");

    let s = session.clone();
    engine.register_fn("get_filter", move |id: &str| -> ScriptResult<FilterRef> {
        let filter = lock(&s).filter(id).into_script()?;
        Ok(FilterRef { session: s.clone(), filter })
    });
    let s = session.clone();
    engine.register_fn("filter_ids", move || -> Array { convert::string_array(lock(&s).filters().ids()) });

    engine.register_get("id", |f: &mut FilterRef| f.filter.id().to_string());
    engine.register_fn("supported_formats", |f: &mut FilterRef| -> Array {
        convert::string_array(f.filter.supported_formats().iter().map(|fmt| fmt.id()))
    });
    engine.register_fn("supports", |f: &mut FilterRef, format: &str| -> ScriptResult<bool> {
        let format = convert::format(format).into_script()?;
        Ok(f.filter.supports(format))
    });
    engine.register_fn("property", |f: &mut FilterRef, name: &str| -> Dynamic {
        f.filter.property(name).map(Dynamic::from).unwrap_or(Dynamic::UNIT)
    });
    engine.register_fn("set_property", |f: &mut FilterRef, name: &str, value: Dynamic| -> ScriptResult<()> {
        let value = convert::number(&value, name).into_script()?;
        f.filter.set_property(name, value).into_script()
    });

    engine.register_fn("process", |f: &mut FilterRef, layer: LayerHandle| -> ScriptResult<()> {
        lock(&f.session).process_filter(&f.filter, layer.id, None).into_script()
    });
    engine.register_fn(
        "process",
        |f: &mut FilterRef, layer: LayerHandle, x: Dynamic, y: Dynamic, w: Dynamic, h: Dynamic| -> ScriptResult<()> {
            let area = convert::region(&x, &y, &w, &h).into_script()?;
            lock(&f.session).process_filter(&f.filter, layer.id, Some(area)).into_script()
        },
    );
}
