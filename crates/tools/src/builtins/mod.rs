//! Built-in demonstration tools.  Enough to exercise the agent loop end to
//! end without any OS automation backend installed.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};
use sysinfo::System;
use tracing::{debug, warn};

use crate::{ParamType, Tool, ToolArgs, ToolParam, ToolRegistry, ToolSpec};

pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Echoes its `message` argument back.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "echo".to_string(),
            description: "Echo back the provided message. Useful for testing and verification."
                .to_string(),
            params: vec![ToolParam::required("message", "Message to echo back")],
        }
    }

    async fn run(&self, args: &ToolArgs) -> Result<Value> {
        let message = args
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("missing required param: message"))?;
        debug!(len = message.len(), "echo");
        Ok(Value::String(message.to_string()))
    }
}

/// Returns the current local time, formatted with a strftime pattern.
pub struct GetTimeTool;

#[async_trait]
impl Tool for GetTimeTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_time".to_string(),
            description: "Get the current local date and time.".to_string(),
            params: vec![ToolParam {
                default: Some(json!(DEFAULT_TIME_FORMAT)),
                ..ToolParam::optional("format", "strftime-style format string")
            }],
        }
    }

    async fn run(&self, args: &ToolArgs) -> Result<Value> {
        let format = args
            .get("format")
            .and_then(Value::as_str)
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(DEFAULT_TIME_FORMAT);

        let now = chrono::Local::now();
        // chrono panics on Display for malformed patterns; validate first.
        let items: Vec<_> = chrono::format::StrftimeItems::new(format).collect();
        if items.iter().any(|i| matches!(i, chrono::format::Item::Error)) {
            warn!(format, "invalid time format, using default");
            return Ok(Value::String(now.format(DEFAULT_TIME_FORMAT).to_string()));
        }
        Ok(Value::String(
            now.format_with_items(items.into_iter()).to_string(),
        ))
    }
}

/// Reports CPU, memory and OS facts about the host.
pub struct GetSystemInfoTool;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

fn gib(bytes: u64) -> f64 {
    (bytes as f64 / GIB * 10.0).round() / 10.0
}

/// Coarse class of model the host can run, judged by installed RAM.
pub fn hardware_tier(ram_gb: f64) -> &'static str {
    if ram_gb >= 32.0 {
        "high"
    } else if ram_gb >= 8.0 {
        "medium"
    } else {
        "low"
    }
}

#[async_trait]
impl Tool for GetSystemInfoTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_system_info".to_string(),
            description: "Get system hardware information including CPU, RAM and operating system."
                .to_string(),
            params: vec![ToolParam {
                default: Some(json!(false)),
                ..ToolParam::optional("detailed", "Include detailed information about the hardware")
                    .with_type(ParamType::Boolean)
            }],
        }
    }

    async fn run(&self, args: &ToolArgs) -> Result<Value> {
        let detailed = args
            .get("detailed")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_all();

        let cpu_threads = sys.cpus().len().max(1);
        let cpu_cores = sys.physical_core_count().unwrap_or(cpu_threads);
        let ram_gb = gib(sys.total_memory());

        let mut info = json!({
            "os": System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            "arch": std::env::consts::ARCH,
            "cpu_cores": cpu_cores,
            "ram_gb": ram_gb,
            "hardware_tier": hardware_tier(ram_gb),
        });
        if let Some(host) = System::host_name().filter(|h| !h.trim().is_empty()) {
            info["hostname"] = Value::String(host);
        }

        if detailed {
            info["os_version"] = json!(System::os_version());
            info["kernel_version"] = json!(System::kernel_version());
            info["family"] = json!(std::env::consts::FAMILY);
            info["cpu_threads"] = json!(cpu_threads);
            info["cpu_brand"] = json!(sys.cpus().first().map(|c| c.brand().trim().to_string()));
            info["ram_available_gb"] = json!(gib(sys.available_memory()));
        }

        debug!(detailed, cpu_cores, ram_gb, "system info collected");
        Ok(info)
    }
}

/// Registry pre-populated with every built-in tool.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    let tools: Vec<Box<dyn Tool>> = vec![
        Box::new(EchoTool),
        Box::new(GetTimeTool),
        Box::new(GetSystemInfoTool),
    ];
    for tool in tools {
        if let Err(e) = registry.register(tool) {
            warn!(error = %e, "failed to register built-in tool");
        }
    }
    registry
}
