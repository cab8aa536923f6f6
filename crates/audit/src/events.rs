use chrono::{DateTime, Utc};
use hostagent_config::PermissionLevel;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One line of the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AuditEvent,
}

impl AuditRecord {
    pub fn now(event: AuditEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }

    pub fn tool_name(&self) -> &str {
        match &self.event {
            AuditEvent::ToolExecution { tool_name, .. }
            | AuditEvent::PermissionDenied { tool_name, .. }
            | AuditEvent::ElevationRequest { tool_name, .. }
            | AuditEvent::UserConfirmation { tool_name, .. } => tool_name,
        }
    }
}

/// Security-relevant events, discriminated by `event_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    ToolExecution {
        tool_name: String,
        /// Already redacted.
        parameters: Value,
        success: bool,
        user_confirmed: bool,
        /// Seconds.
        execution_time: f64,
        permission_level: PermissionLevel,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result_summary: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    PermissionDenied {
        tool_name: String,
        required_level: PermissionLevel,
        current_level: PermissionLevel,
    },
    ElevationRequest {
        tool_name: String,
        success: bool,
        reason: String,
    },
    UserConfirmation {
        tool_name: String,
        confirmed: bool,
        cached: bool,
    },
}

impl AuditEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::ToolExecution { .. } => "tool_execution",
            AuditEvent::PermissionDenied { .. } => "permission_denied",
            AuditEvent::ElevationRequest { .. } => "elevation_request",
            AuditEvent::UserConfirmation { .. } => "user_confirmation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_serializes_flat_with_event_type() {
        let rec = AuditRecord::now(AuditEvent::PermissionDenied {
            tool_name: "delete_file".into(),
            required_level: PermissionLevel::Admin,
            current_level: PermissionLevel::Advanced,
        });
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["event_type"], "permission_denied");
        assert_eq!(v["tool_name"], "delete_file");
        assert_eq!(v["required_level"], "admin");
        assert_eq!(v["current_level"], "advanced");
        assert!(v["timestamp"].is_string());
    }

    #[test]
    fn optional_fields_are_omitted() {
        let rec = AuditRecord::now(AuditEvent::ToolExecution {
            tool_name: "echo".into(),
            parameters: json!({"message": "hi"}),
            success: true,
            user_confirmed: false,
            execution_time: 0.01,
            permission_level: PermissionLevel::Basic,
            result_summary: Some("hi".into()),
            error: None,
        });
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["result_summary"], "hi");
        assert!(v.get("error").is_none());
    }

    #[test]
    fn record_roundtrip() {
        let rec = AuditRecord::now(AuditEvent::UserConfirmation {
            tool_name: "write_file".into(),
            confirmed: false,
            cached: true,
        });
        let line = serde_json::to_string(&rec).unwrap();
        let back: AuditRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back, rec);
        assert_eq!(back.tool_name(), "write_file");
        assert_eq!(back.event.kind(), "user_confirmation");
    }
}
