//! Execution of the tool calls requested by one assistant reply.

use std::time::Duration;

use hostagent_exec::{SecurityMiddleware, ToolOutcome};
use hostagent_llm::ToolCall;
use hostagent_tools::{ToolArgs, ToolRegistry};
use serde_json::Value;
use tracing::{error, info, warn};

/// Decode tool-call arguments.  Accepts an object or a string holding a JSON
/// object; anything else (including malformed JSON) yields no arguments.
pub fn parse_arguments(raw: &Value) -> ToolArgs {
    match raw {
        Value::Object(map) => map.clone(),
        Value::String(s) if s.trim().is_empty() => ToolArgs::new(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                warn!(arguments = %other, "tool arguments are not an object; ignoring");
                ToolArgs::new()
            }
            Err(e) => {
                error!(arguments = %s, error = %e, "failed to parse tool arguments");
                ToolArgs::new()
            }
        },
        Value::Null => ToolArgs::new(),
        other => {
            warn!(arguments = %other, "tool arguments are not an object; ignoring");
            ToolArgs::new()
        }
    }
}

/// Tool result as message content: strings verbatim, everything else as
/// pretty JSON.
pub fn render_value(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string()),
    }
}

pub fn tool_error(tool_name: &str, reason: impl std::fmt::Display) -> String {
    format!("Error executing tool '{tool_name}': {reason}")
}

/// Run one tool call through the security middleware and return the content
/// of the resulting `tool` message.  Never fails: every problem becomes text
/// the model can read.  `timeout` bounds the tool invocation only.
pub async fn execute_tool_call(
    call: &ToolCall,
    registry: &ToolRegistry,
    security: &SecurityMiddleware,
    timeout: Duration,
) -> String {
    let name = call.function.name.as_str();
    let args = parse_arguments(&call.function.arguments);

    let Some(tool) = registry.get(name) else {
        error!(tool = name, "tool not found");
        return tool_error(name, format!("Tool '{name}' not found in registry"));
    };

    info!(tool = name, call_id = %call.id, "executing tool call");
    match security.execute_with_security(tool, &args, timeout).await {
        Ok(ToolOutcome::Completed(value)) => render_value(value),
        Ok(cancelled @ ToolOutcome::Cancelled { .. }) => render_value(cancelled.into_value()),
        Err(e) => tool_error(name, e),
    }
}
