//! Security pipeline wrapped around every tool invocation: permission tier
//! check, optional OS elevation, human confirmation, execution and audit.

pub mod confirmation;
pub mod permissions;
pub mod privilege;

use std::sync::Arc;
use std::time::{Duration, Instant};

use hostagent_audit::{AuditLogger, ToolExecutionEntry};
use hostagent_config::{PermissionLevel, SecurityConfig};
use hostagent_tools::{Tool, ToolArgs};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{info, warn};

pub use confirmation::{
    ChannelPrompt, ConfirmationManager, ConfirmationOutcome, ConfirmationPrompt, ConfirmationReply,
    ConfirmationRequest, ConfirmationSettings, StaticPrompt, confirmation_channel,
};
pub use permissions::PermissionManager;
pub use privilege::{FixedPrivileges, PrivilegeBroker, SystemPrivileges};

pub const CANCELLED_MESSAGE: &str = "Action cancelled by user";

// ── Errors and outcomes ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Permission denied: {tool} requires {required} level, current level is {current} ({reason})")]
    PermissionDenied {
        tool: String,
        required: PermissionLevel,
        current: PermissionLevel,
        reason: String,
    },

    #[error("{error}")]
    Tool { tool: String, error: anyhow::Error },

    #[error("Tool execution timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },
}

/// A tool call that got past the permission gate.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Completed(Value),
    /// The user declined the confirmation prompt.
    Cancelled { reason: String },
}

impl ToolOutcome {
    /// Payload handed back to the model.
    pub fn into_value(self) -> Value {
        match self {
            ToolOutcome::Completed(value) => value,
            ToolOutcome::Cancelled { reason } => json!({
                "success": false,
                "error": reason,
                "message": CANCELLED_MESSAGE,
            }),
        }
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Composes permission, confirmation and audit around a single tool call.
///
/// The permission manager and audit logger are typically shared between
/// conversations; the confirmation manager (and its decision cache) belongs to
/// this middleware.
pub struct SecurityMiddleware {
    permissions: Arc<PermissionManager>,
    confirmations: ConfirmationManager,
    audit: Arc<AuditLogger>,
}

impl SecurityMiddleware {
    pub fn new(
        permissions: Arc<PermissionManager>,
        confirmations: ConfirmationManager,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            permissions,
            confirmations,
            audit,
        }
    }

    /// Wire up the host privilege broker and the configured audit log.
    pub fn from_config(cfg: &SecurityConfig, prompt: Arc<dyn ConfirmationPrompt>) -> Self {
        Self::new(
            Arc::new(PermissionManager::new(cfg.level())),
            ConfirmationManager::new(ConfirmationSettings::from(cfg), prompt),
            Arc::new(AuditLogger::from_config(cfg)),
        )
    }

    pub fn permissions(&self) -> &PermissionManager {
        &self.permissions
    }

    pub fn confirmations(&self) -> &ConfirmationManager {
        &self.confirmations
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    fn deny(&self, tool: &str, required: PermissionLevel, reason: &str) -> ExecError {
        let current = self.permissions.current_level();
        self.audit.log_permission_denied(tool, required, current);
        warn!(tool, required = %required, current = %current, reason, "permission denied");
        ExecError::PermissionDenied {
            tool: tool.to_string(),
            required,
            current,
            reason: reason.to_string(),
        }
    }

    /// Run `tool` through the full pipeline.  `timeout` bounds only the tool
    /// invocation; waiting on a human confirmation is not counted against it.
    pub async fn execute_with_security(
        &self,
        tool: &dyn Tool,
        args: &ToolArgs,
        timeout: Duration,
    ) -> Result<ToolOutcome, ExecError> {
        let spec = tool.spec();
        let name = spec.name.as_str();
        let started = Instant::now();
        let params = Value::Object(args.clone());
        let current = self.permissions.current_level();

        // 1. Permission tier, with an elevation attempt for admin tools.
        let required = self.permissions.required_level(name);
        if !self.permissions.check(name, Some(required)) {
            if required != PermissionLevel::Admin {
                return Err(self.deny(name, required, "insufficient permission level"));
            }
            let elevated = self.permissions.request_elevation().await;
            self.audit
                .log_elevation_request(name, elevated, &format!("Required for {name}"));
            if !elevated {
                return Err(self.deny(name, required, "privilege elevation failed"));
            }
            if current != PermissionLevel::Admin {
                return Err(self.deny(
                    name,
                    required,
                    "elevation succeeded but the configured permission level prevents execution",
                ));
            }
        }

        // 2. Human confirmation.
        let mut user_confirmed = false;
        if self.confirmations.is_required(name) {
            let sensitivity = required.as_str().to_uppercase();
            let outcome = self
                .confirmations
                .request_confirmation(name, &params, &sensitivity)
                .await;
            self.audit
                .log_user_confirmation(name, outcome.allowed, outcome.cached);

            if !outcome.allowed {
                let reason = format!("User denied execution of {name}");
                self.audit.log_tool_execution(ToolExecutionEntry {
                    tool_name: name,
                    parameters: &params,
                    result: None,
                    error: Some(&reason),
                    user_confirmed: false,
                    execution_time: started.elapsed(),
                    permission_level: current,
                });
                info!(tool = name, cached = outcome.cached, "tool execution cancelled by user");
                return Ok(ToolOutcome::Cancelled { reason });
            }
            user_confirmed = true;
        }

        // 3. Validate and run.
        info!(tool = name, "executing tool");
        let result = match spec.validate_args(args) {
            Ok(()) => match tokio::time::timeout(timeout, tool.run(args)).await {
                Ok(result) => result,
                Err(_) => {
                    let err = ExecError::Timeout {
                        tool: name.to_string(),
                        secs: timeout.as_secs(),
                    };
                    let message = err.to_string();
                    self.audit.log_tool_execution(ToolExecutionEntry {
                        tool_name: name,
                        parameters: &params,
                        result: None,
                        error: Some(&message),
                        user_confirmed,
                        execution_time: started.elapsed(),
                        permission_level: current,
                    });
                    warn!(tool = name, timeout_secs = timeout.as_secs(), "tool execution timed out");
                    return Err(err);
                }
            },
            Err(e) => Err(anyhow::Error::from(e)),
        };

        match result {
            Ok(value) => {
                self.audit.log_tool_execution(ToolExecutionEntry {
                    tool_name: name,
                    parameters: &params,
                    result: Some(&value),
                    error: None,
                    user_confirmed,
                    execution_time: started.elapsed(),
                    permission_level: current,
                });
                Ok(ToolOutcome::Completed(value))
            }
            Err(error) => {
                let message = error.to_string();
                self.audit.log_tool_execution(ToolExecutionEntry {
                    tool_name: name,
                    parameters: &params,
                    result: None,
                    error: Some(&message),
                    user_confirmed,
                    execution_time: started.elapsed(),
                    permission_level: current,
                });
                warn!(tool = name, error = %message, "tool execution failed");
                Err(ExecError::Tool {
                    tool: name.to_string(),
                    error,
                })
            }
        }
    }
}
