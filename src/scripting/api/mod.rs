//! Script-facing API, one submodule per handle type.

mod document;
mod filters;
mod iterator;
mod painter;
mod progress;
mod utility;

use rhai::Engine;

use crate::scripting::types::SharedSession;

pub fn register_all(engine: &mut Engine, session: &SharedSession) {
    document::register(engine, session);
    iterator::register(engine);
    painter::register(engine);
    filters::register(engine, session);
    progress::register(engine, session);
    utility::register(engine);
}
