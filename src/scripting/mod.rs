// ============================================================================
// PaintFE Scripting Bridge: Rhai engine, sandbox and run entry points
// ============================================================================
//
// A script runs against one `Session`. Every host function locks the session
// for the duration of a single call, so a bridge call always runs to
// completion before the next one starts.

mod api;
pub mod convert;
pub mod error;
pub mod types;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::Ordering;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rhai::{AST, Engine, Scope};
use tracing::{info, warn};

use crate::config::{BridgeConfig, SandboxLimits};
use crate::document::Document;
use crate::error::BridgeError;
use crate::guard::CancelToken;
use crate::session::Session;

pub use error::ScriptError;
pub use types::{SharedSession, lock};

// ============================================================================
// Messages sent from the script worker to the host
// ============================================================================

#[derive(Debug)]
pub enum ScriptMessage {
    /// Final result (success)
    Completed(ScriptOutcome),
    /// Script error; the document is still handed back
    Error(ScriptFailure),
    /// Console output line (from print())
    ConsoleOutput(String),
    Progress { current: u64, total: u64 },
    /// Non-fatal problem, e.g. a transaction the script left open
    Warning(String),
}

#[derive(Debug)]
pub struct ScriptOutcome {
    pub document: Document,
    pub console_output: Vec<String>,
    pub warnings: Vec<String>,
    /// Iterator steps consumed.
    pub steps: u64,
    pub elapsed_ms: u64,
}

#[derive(Debug)]
pub struct ScriptFailure {
    pub error: ScriptError,
    /// Edits committed before the failure are kept.
    pub document: Document,
    pub console_output: Vec<String>,
    pub warnings: Vec<String>,
    pub elapsed_ms: u64,
}

// ============================================================================
// Engine construction with full sandbox + API registration
// ============================================================================

/// Create a sandboxed Rhai engine bound to `session`.
pub fn create_engine(session: &SharedSession, limits: &SandboxLimits, sender: Option<Sender<ScriptMessage>>) -> Engine {
    let mut engine = Engine::new();

    // ── Sandbox limits ──
    engine.set_max_operations(limits.max_operations);
    engine.set_max_call_levels(limits.max_call_levels);
    engine.set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth);
    engine.set_max_string_size(limits.max_string_size);
    engine.set_max_array_size(limits.max_array_size);
    engine.set_max_map_size(limits.max_map_size);

    // ── Cancellation check via progress callback ──
    let cancel_flag = lock(session).guard().cancel_token().flag();
    engine.on_progress(move |_ops| {
        if cancel_flag.load(Ordering::Relaxed) {
            Some(convert::error_value(&BridgeError::Cancelled))
        } else {
            None
        }
    });

    let s = session.clone();
    engine.on_print(move |msg| {
        lock(&s).print(msg);
        if let Some(tx) = &sender {
            let _ = tx.send(ScriptMessage::ConsoleOutput(msg.to_string()));
        }
    });

    api::register_all(&mut engine, session);
    engine
}

// ============================================================================
// Public execution API
// ============================================================================

/// Compile a script and return the AST, or a ScriptError.
pub fn compile_script(source: &str) -> Result<AST, ScriptError> {
    Engine::new().compile(source).map_err(|e| ScriptError::from_parse(&e))
}

fn run(session: &SharedSession, source: &str, limits: &SandboxLimits, sender: Option<Sender<ScriptMessage>>) -> Result<(), ScriptError> {
    let engine = create_engine(session, limits, sender);
    let ast = engine.compile(source).map_err(|e| ScriptError::from_parse(&e))?;
    let mut scope = Scope::new();
    engine.run_ast_with_scope(&mut scope, &ast).map_err(|e| ScriptError::from_eval(&e))
}

/// Tear the session down and package the result.
fn finish(session: &SharedSession, result: Result<(), ScriptError>, start: Instant) -> Result<ScriptOutcome, ScriptFailure> {
    let report = lock(session).take_report();
    let elapsed_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(()) => {
            info!("Script completed in {} ms", elapsed_ms);
            Ok(ScriptOutcome {
                document: report.document,
                console_output: report.console_output,
                warnings: report.warnings,
                steps: report.steps,
                elapsed_ms,
            })
        }
        Err(error) => {
            if error.is_cancelled() {
                info!("Script cancelled after {} ms", elapsed_ms);
            } else {
                warn!("Script failed after {} ms: {}", elapsed_ms, error);
            }
            Err(ScriptFailure {
                error,
                document: report.document,
                console_output: report.console_output,
                warnings: report.warnings,
                elapsed_ms,
            })
        }
    }
}

/// Run a script on the calling thread. Used by the CLI and tests.
pub fn execute_script_sync(source: &str, document: Document, config: &BridgeConfig) -> Result<ScriptOutcome, ScriptFailure> {
    let start = Instant::now();
    info!("Running script ({} bytes) on '{}'", source.len(), document.name);
    let session: SharedSession = Arc::new(Mutex::new(Session::new(document, config)));
    let result = run(&session, source, &config.sandbox, None);
    finish(&session, result, start)
}

/// Execute a script on a background thread. Progress, console output and
/// warnings are streamed through `sender`; the last message is always
/// `Completed` or `Error`.
pub fn execute_script(
    source: String,
    document: Document,
    config: BridgeConfig,
    cancel: CancelToken,
    sender: Sender<ScriptMessage>,
) {
    rayon::spawn(move || {
        let start = Instant::now();
        info!("Running script ({} bytes) on '{}' in background", source.len(), document.name);

        let progress_tx = sender.clone();
        let mut session = Session::new(document, &config).with_cancel_token(cancel);
        session.attach_progress(Box::new(move |current, total| {
            let _ = progress_tx.send(ScriptMessage::Progress { current, total });
        }));
        // Created outside catch_unwind so the document survives a panic.
        let session: SharedSession = Arc::new(Mutex::new(session));

        let result = catch_unwind(AssertUnwindSafe(|| run(&session, &source, &config.sandbox, Some(sender.clone()))))
            .unwrap_or_else(|_| Err(ScriptError::new("Script panicked (internal error)")));

        let message = match finish(&session, result, start) {
            Ok(outcome) => {
                for w in &outcome.warnings {
                    let _ = sender.send(ScriptMessage::Warning(w.clone()));
                }
                ScriptMessage::Completed(outcome)
            }
            Err(failure) => {
                for w in &failure.warnings {
                    let _ = sender.send(ScriptMessage::Warning(w.clone()));
                }
                ScriptMessage::Error(failure)
            }
        };
        let _ = sender.send(message);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::PixelFormat;
    use std::sync::mpsc;
    use std::time::Duration;

    fn doc() -> Document {
        Document::new("t", 4, 4, PixelFormat::Rgba8)
    }

    #[test]
    fn compile_reports_location() {
        let err = compile_script("let x = ;").unwrap_err();
        assert_eq!(err.line, Some(1));
        assert!(err.friendly_message().starts_with("Error on line 1"));
    }

    #[test]
    fn print_is_captured() {
        let outcome = execute_script_sync(r#"print("hi"); print(1 + 2);"#, doc(), &BridgeConfig::default()).unwrap();
        assert_eq!(outcome.console_output, vec!["hi".to_string(), "3".to_string()]);
    }

    #[test]
    fn operation_limit_stops_runaway_scripts() {
        let mut config = BridgeConfig::default();
        config.sandbox.max_operations = 1_000;
        let failure = execute_script_sync("loop { }", doc(), &config).unwrap_err();
        assert!(failure.error.friendly_message().contains("maximum operation limit"));
    }

    #[test]
    fn background_run_streams_messages() {
        let (tx, rx) = mpsc::channel();
        let source = r#"
            set_progress_total_steps(2);
            inc_progress();
            print("halfway");
            inc_progress();
        "#;
        execute_script(source.to_string(), doc(), BridgeConfig::default(), CancelToken::new(), tx);

        let mut progress = Vec::new();
        let mut console = Vec::new();
        loop {
            match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
                ScriptMessage::Progress { current, total } => progress.push((current, total)),
                ScriptMessage::ConsoleOutput(line) => console.push(line),
                ScriptMessage::Warning(w) => panic!("unexpected warning {w}"),
                ScriptMessage::Completed(outcome) => {
                    assert_eq!(outcome.console_output, vec!["halfway".to_string()]);
                    break;
                }
                ScriptMessage::Error(f) => panic!("script failed: {}", f.error),
            }
        }
        assert_eq!(progress, vec![(0, 2), (1, 2), (2, 2)]);
        assert_eq!(console, vec!["halfway".to_string()]);
    }

    #[test]
    fn background_run_can_be_cancelled() {
        let (tx, rx) = mpsc::channel();
        let cancel = CancelToken::new();
        cancel.cancel();
        execute_script("loop { }".to_string(), doc(), BridgeConfig::default(), cancel, tx);
        loop {
            match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
                ScriptMessage::Error(failure) => {
                    assert!(failure.error.is_cancelled());
                    assert_eq!(failure.document.name, "t");
                    break;
                }
                ScriptMessage::Completed(_) => panic!("cancelled script completed"),
                _ => {}
            }
        }
    }
}
