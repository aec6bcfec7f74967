// ============================================================================
// Error type
// ============================================================================

use rhai::{EvalAltResult, Map, ParseError, Position};

/// An uncaught script failure with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptError {
    pub message: String,
    /// Bridge error kind (`nested_transaction`, `cancelled`, ...) when the
    /// failure came from a bridge call.
    pub kind: Option<String>,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

fn location(pos: Position) -> (Option<usize>, Option<usize>) {
    let line = pos.line().filter(|l| *l > 0);
    let column = pos.position().filter(|c| *c > 0);
    (line, column)
}

/// `kind` and `message` of a thrown bridge error map.
fn bridge_fields(value: &rhai::Dynamic) -> Option<(String, String)> {
    let map = value.clone().try_cast::<Map>()?;
    let kind = map.get("kind")?.clone().into_string().ok()?;
    let message = map
        .get("message")
        .and_then(|m| m.clone().into_string().ok())
        .unwrap_or_default();
    Some((kind, message))
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), kind: None, line: None, column: None }
    }

    pub fn from_parse(err: &ParseError) -> Self {
        let (line, column) = location(err.position());
        Self { message: err.to_string(), kind: None, line, column }
    }

    pub fn from_eval(err: &EvalAltResult) -> Self {
        let (line, column) = location(err.position());
        let (kind, message) = match Self::innermost(err) {
            EvalAltResult::ErrorRuntime(value, _) | EvalAltResult::ErrorTerminated(value, _) => {
                match bridge_fields(value) {
                    Some((kind, message)) => (Some(kind), message),
                    None => (None, err.to_string()),
                }
            }
            _ => (None, err.to_string()),
        };
        Self { message, kind, line, column }
    }

    /// Unwrap errors re-raised through script-defined function calls.
    fn innermost(err: &EvalAltResult) -> &EvalAltResult {
        match err {
            EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => Self::innermost(inner),
            other => other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind.as_deref() == Some("cancelled")
    }

    /// Error explanation with line/column context and suggestions.
    pub fn friendly_message(&self) -> String {
        let raw = &self.message;
        let mut parts = Vec::new();

        // Location header
        match (self.line, self.column) {
            (Some(line), Some(col)) => parts.push(format!("Error on line {}, column {}:", line, col)),
            (Some(line), None) => parts.push(format!("Error on line {}:", line)),
            _ => parts.push("Script error:".to_string()),
        }

        if let Some(kind) = &self.kind {
            parts.push(format!("  {}", raw));
            let tip: &[&str] = match kind.as_str() {
                "nested_transaction" => &["Call end_painting() before beginning another transaction on the same layer."],
                "no_open_transaction" => &[
                    "Open a transaction first:",
                    "    layer.begin_painting(\"my edit\");",
                    "    ...",
                    "    layer.end_painting();",
                ],
                "invalid_iterator" => &[
                    "Iterators stop working once their transaction closes or the layer is",
                    "converted to another format. Create a new iterator instead.",
                ],
                "invalid_painter" => &["Painters are discarded at end_painting(). Create one per transaction."],
                "incompatible_format" => &[
                    "Wrap the call in try/catch to skip layers this filter cannot process:",
                    "    try { f.process(layer); } catch (err) { print(err.kind); }",
                ],
                "filter_not_found" => &["Use filter_ids() to list the available filters."],
                "budget_exhausted" => &["Process a smaller region, or raise step_budget in the configuration."],
                _ => &[],
            };
            if let Some((first, rest)) = tip.split_first() {
                parts.push(String::new());
                parts.push(format!("  Tip: {}", first));
                parts.extend(rest.iter().map(|line| format!("  {}", line)));
            }
            return parts.join("\n");
        }

        // Categorize error type
        if raw.contains("Function not found:") {
            if let Some(fn_part) = raw.strip_prefix("Function not found: ") {
                let fn_desc = fn_part.split(" (line ").next().unwrap_or(fn_part);
                parts.push(format!("  Could not find function: {}", fn_desc.trim()));
                parts.push(String::new());
                parts.push("  Tip: Check the argument types. Numbers like 10 and 10.0 are different types.".to_string());
            } else {
                parts.push(format!("  {}", raw));
            }
        } else if raw.contains("Variable not found:") {
            if let Some(var_part) = raw.split("Variable not found:").nth(1) {
                let var_name = var_part.split('(').next().unwrap_or(var_part).trim();
                parts.push(format!("  Variable '{}' is not defined.", var_name));
                parts.push(String::new());
                parts.push("  Tip: Make sure you declared it with 'let' before using it:".to_string());
                parts.push(format!("    let {} = 0;", var_name));
            } else {
                parts.push(format!("  {}", raw));
            }
        } else if raw.contains("Syntax error") || raw.contains("Expected") {
            parts.push(format!("  Syntax error: {}", raw.split(" (line ").next().unwrap_or(raw)));
            parts.push(String::new());
            parts.push("  Tip: Check for missing semicolons, brackets, or typos near this line.".to_string());
        } else if raw.contains("Too many operations") {
            parts.push("  Script exceeded the maximum operation limit.".to_string());
            parts.push(String::new());
            parts.push("  Tip: Your script may have an infinite loop, or is processing".to_string());
            parts.push("  too many pixels. Try a smaller iterator region or a built-in filter.".to_string());
        } else if raw.contains("panicked") || raw.contains("internal error") {
            parts.push("  An internal error occurred (this is a bug in the bridge).".to_string());
            parts.push(String::new());
            parts.push("  Please report this issue.".to_string());
        } else {
            // Generic fallback: clean up Rhai's raw message
            let cleaned = raw.split(" (line ").next().unwrap_or(raw);
            parts.push(format!("  {}", cleaned));
        }

        parts.join("\n")
    }
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let (Some(line), Some(col)) = (self.line, self.column) {
            write!(f, "Line {}, Col {}: {}", line, col, self.message)
        } else if let Some(line) = self.line {
            write!(f, "Line {}: {}", line, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ScriptError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_errors_keep_their_kind() {
        let mut map = Map::new();
        map.insert("kind".into(), "nested_transaction".into());
        map.insert("message".into(), "already open".into());
        let err = EvalAltResult::ErrorRuntime(map.into(), Position::new(3, 5));
        let script_err = ScriptError::from_eval(&err);
        assert_eq!(script_err.kind.as_deref(), Some("nested_transaction"));
        assert_eq!(script_err.message, "already open");
        assert_eq!((script_err.line, script_err.column), (Some(3), Some(5)));
        assert!(script_err.friendly_message().starts_with("Error on line 3, column 5:"));
        assert!(script_err.friendly_message().contains("end_painting()"));
    }

    #[test]
    fn plain_runtime_errors_use_rhai_text() {
        let err = EvalAltResult::ErrorRuntime("boom".into(), Position::NONE);
        let script_err = ScriptError::from_eval(&err);
        assert_eq!(script_err.kind, None);
        assert!(script_err.message.contains("boom"));
        assert!(script_err.friendly_message().starts_with("Script error:"));
    }
}
