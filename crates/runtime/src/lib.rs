//! Conversation driver: feeds user turns to the model, executes the tool
//! calls it requests through the security middleware, and keeps the history
//! bounded.

pub mod agent;
pub mod history;
pub mod tool_loop;

pub use agent::{Agent, AgentSettings, MAX_ITERATIONS_MESSAGE};
pub use history::{reset_history, trim_history};
pub use tool_loop::{execute_tool_call, parse_arguments, render_value};
