//! # Document API
//!
//! `Document` and `Layer` handles, the `document()` / `active_layer()`
//! globals, transactions and undo/redo.

use rhai::{Array, Dynamic, Engine};

use crate::canvas::Layer;
use crate::error::BridgeError;
use crate::pixel::PixelFormat;
use crate::scripting::convert::{self, IntoScript, ScriptResult};
use crate::scripting::types::{DocumentHandle, IteratorHandle, LayerHandle, PainterHandle, SharedSession, lock};

fn layer_handle(session: &SharedSession, id: crate::canvas::LayerId) -> LayerHandle {
    LayerHandle { session: session.clone(), id }
}

/// Read one property of a live layer.
fn with_layer<R>(layer: &LayerHandle, f: impl FnOnce(&Layer) -> R) -> ScriptResult<R> {
    let s = lock(&layer.session);
    s.document().require_layer(layer.id).map(f).into_script()
}

fn history_step(result: Result<Option<String>, BridgeError>) -> ScriptResult<Dynamic> {
    Ok(result.into_script()?.map(Dynamic::from).unwrap_or(Dynamic::UNIT))
}

pub fn register(engine: &mut Engine, session: &SharedSession) {
    engine.register_type_with_name::<DocumentHandle>("Document");
    engine.register_type_with_name::<LayerHandle>("Layer");

    // ========== GLOBALS ==========
    let s = session.clone();
    engine.register_fn("document", move || DocumentHandle { session: s.clone() });

    let s = session.clone();
    engine.register_fn("active_layer", move || -> LayerHandle {
        let id = lock(&s).document().active_layer_id();
        layer_handle(&s, id)
    });

    let s = session.clone();
    engine.register_fn("undo", move || history_step(lock(&s).undo()));
    let s = session.clone();
    engine.register_fn("redo", move || history_step(lock(&s).redo()));

    // ========== DOCUMENT ==========
    engine.register_get("name", |d: &mut DocumentHandle| lock(&d.session).document().name.clone());
    engine.register_get("width", |d: &mut DocumentHandle| lock(&d.session).document().width() as i64);
    engine.register_get("height", |d: &mut DocumentHandle| lock(&d.session).document().height() as i64);
    engine.register_get("can_undo", |d: &mut DocumentHandle| lock(&d.session).document().history().can_undo());
    engine.register_get("can_redo", |d: &mut DocumentHandle| lock(&d.session).document().history().can_redo());

    engine.register_fn("layers", |d: &mut DocumentHandle| -> Array {
        let ids: Vec<_> = lock(&d.session).document().layers().iter().map(|l| l.id).collect();
        ids.into_iter().map(|id| Dynamic::from(layer_handle(&d.session, id))).collect()
    });
    engine.register_fn("active_layer", |d: &mut DocumentHandle| -> LayerHandle {
        let id = lock(&d.session).document().active_layer_id();
        layer_handle(&d.session, id)
    });
    engine.register_fn("layer", |d: &mut DocumentHandle, name: &str| -> ScriptResult<LayerHandle> {
        let id = lock(&d.session).layer_id(Some(name)).into_script()?;
        Ok(layer_handle(&d.session, id))
    });
    engine.register_fn("add_layer", |d: &mut DocumentHandle, name: &str| -> LayerHandle {
        let id = lock(&d.session).add_layer(name, PixelFormat::Rgba8);
        layer_handle(&d.session, id)
    });
    engine.register_fn("add_layer", |d: &mut DocumentHandle, name: &str, format: &str| -> ScriptResult<LayerHandle> {
        let format = convert::format(format).into_script()?;
        let id = lock(&d.session).add_layer(name, format);
        Ok(layer_handle(&d.session, id))
    });
    engine.register_fn("set_active_layer", |d: &mut DocumentHandle, layer: LayerHandle| -> ScriptResult<()> {
        lock(&d.session).document_mut().set_active_layer(layer.id).into_script()
    });
    engine.register_fn("undo", |d: &mut DocumentHandle| history_step(lock(&d.session).undo()));
    engine.register_fn("redo", |d: &mut DocumentHandle| history_step(lock(&d.session).redo()));
    engine.register_fn("undo_history", |d: &mut DocumentHandle| -> Array {
        convert::string_array(lock(&d.session).document().history().undo_history())
    });

    // ========== LAYER ==========
    engine.register_get("id", |l: &mut LayerHandle| l.id.to_string());
    engine.register_get("name", |l: &mut LayerHandle| with_layer(l, |layer| layer.name.clone()));
    engine.register_get("width", |l: &mut LayerHandle| with_layer(l, |layer| layer.width() as i64));
    engine.register_get("height", |l: &mut LayerHandle| with_layer(l, |layer| layer.height() as i64));
    engine.register_get("format", |l: &mut LayerHandle| with_layer(l, |layer| layer.format().id().to_string()));
    engine.register_get("channel_count", |l: &mut LayerHandle| {
        with_layer(l, |layer| layer.format().channel_count() as i64)
    });
    engine.register_get("visible", |l: &mut LayerHandle| with_layer(l, |layer| layer.visible));
    engine.register_get("opacity", |l: &mut LayerHandle| with_layer(l, |layer| layer.opacity as f64));
    engine.register_get("is_locked", |l: &mut LayerHandle| with_layer(l, |layer| layer.is_locked()));

    engine.register_fn("begin_painting", |l: &mut LayerHandle, label: &str| -> ScriptResult<()> {
        lock(&l.session).begin_painting(l.id, label).map(|_| ()).into_script()
    });
    engine.register_fn("end_painting", |l: &mut LayerHandle| -> ScriptResult<()> {
        lock(&l.session).end_painting(l.id).map(|_| ()).into_script()
    });
    engine.register_fn("convert_to", |l: &mut LayerHandle, format: &str| -> ScriptResult<()> {
        let format = convert::format(format).into_script()?;
        lock(&l.session).convert_layer_format(l.id, format).into_script()
    });

    engine.register_fn("create_iterator", |l: &mut LayerHandle| -> ScriptResult<IteratorHandle> {
        let lease = lock(&l.session).create_iterator(l.id, None).into_script()?;
        Ok(IteratorHandle::new(l.session.clone(), lease))
    });
    engine.register_fn(
        "create_iterator",
        |l: &mut LayerHandle, x: Dynamic, y: Dynamic, w: Dynamic, h: Dynamic| -> ScriptResult<IteratorHandle> {
            let region = convert::region(&x, &y, &w, &h).into_script()?;
            let lease = lock(&l.session).create_iterator(l.id, Some(region)).into_script()?;
            Ok(IteratorHandle::new(l.session.clone(), lease))
        },
    );

    engine.register_fn("create_painter", |l: &mut LayerHandle| -> ScriptResult<PainterHandle> {
        let lease = lock(&l.session).create_painter(l.id).into_script()?;
        Ok(PainterHandle::new(l.session.clone(), lease))
    });
}
