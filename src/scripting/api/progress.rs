//! # Progress & Output API
//!
//! `set_progress_total_steps`, `inc_progress`, the progress readers and
//! `warn`.

use rhai::{Dynamic, Engine};

use crate::scripting::convert::{self, IntoScript, ScriptResult};
use crate::scripting::types::{SharedSession, lock};

pub fn register(engine: &mut Engine, session: &SharedSession) {
    let s = session.clone();
    engine.register_fn("set_progress_total_steps", move |total: Dynamic| -> ScriptResult<()> {
        let total = convert::integer(&total, "total steps").into_script()?;
        lock(&s).set_progress_total_steps(total);
        Ok(())
    });
    let s = session.clone();
    engine.register_fn("inc_progress", move || lock(&s).inc_progress());
    let s = session.clone();
    engine.register_fn("progress_current", move || lock(&s).progress().current() as i64);
    let s = session.clone();
    engine.register_fn("progress_total", move || lock(&s).progress().total() as i64);

    let s = session.clone();
    engine.register_fn("warn", move |message: &str| lock(&s).warn(message));
}
