//! Human confirmation for sensitive tool calls, with a time-bounded cache of
//! remembered decisions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use hostagent_config::SecurityConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Tool-name fragments that mark an action as sensitive.
pub const SENSITIVE_KEYWORDS: &[&str] = &[
    "delete", "kill", "shutdown", "write", "move", "type", "click", "press", "hotkey", "drag",
    "registry", "service", "system", "mouse", "scroll", "key", "launch",
];

pub const DEFAULT_CONFIRMATION_TTL: Duration = Duration::from_secs(3600);

// ── Prompt seam ──────────────────────────────────────────────────────────────

/// What the user is asked to approve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub tool_name: String,
    pub parameters: Value,
    /// Upper-case tier label, e.g. `ADMIN`.
    pub sensitivity: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationReply {
    pub allowed: bool,
    /// Cache this decision for the configured TTL.
    pub remember: bool,
}

/// Asks a human (or a stand-in) to approve a tool call.
#[async_trait]
pub trait ConfirmationPrompt: Send + Sync {
    async fn prompt(&self, request: &ConfirmationRequest) -> Result<ConfirmationReply>;
}

/// Always gives the same answer.  For non-interactive runs and tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticPrompt {
    pub reply: ConfirmationReply,
}

impl StaticPrompt {
    pub fn allow() -> Self {
        Self {
            reply: ConfirmationReply {
                allowed: true,
                remember: false,
            },
        }
    }

    pub fn deny() -> Self {
        Self {
            reply: ConfirmationReply {
                allowed: false,
                remember: false,
            },
        }
    }
}

#[async_trait]
impl ConfirmationPrompt for StaticPrompt {
    async fn prompt(&self, _request: &ConfirmationRequest) -> Result<ConfirmationReply> {
        Ok(self.reply)
    }
}

/// Channel-based prompt.  The middleware sends a [`ConfirmationRequest`] and
/// the UI side answers through the oneshot.
pub type ConfirmationSender = mpsc::Sender<(ConfirmationRequest, oneshot::Sender<ConfirmationReply>)>;
pub type ConfirmationReceiver =
    mpsc::Receiver<(ConfirmationRequest, oneshot::Sender<ConfirmationReply>)>;

/// Create a new confirmation channel pair.
pub fn confirmation_channel() -> (ConfirmationSender, ConfirmationReceiver) {
    mpsc::channel(16)
}

pub struct ChannelPrompt {
    tx: ConfirmationSender,
}

impl ChannelPrompt {
    pub fn new(tx: ConfirmationSender) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl ConfirmationPrompt for ChannelPrompt {
    async fn prompt(&self, request: &ConfirmationRequest) -> Result<ConfirmationReply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((request.clone(), reply_tx))
            .await
            .map_err(|_| anyhow!("confirmation channel closed"))?;
        reply_rx
            .await
            .map_err(|_| anyhow!("confirmation responder dropped without answering"))
    }
}

// ── Manager ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct CachedDecision {
    allowed: bool,
    expires_at: Instant,
}

/// Result of [`ConfirmationManager::request_confirmation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationOutcome {
    pub allowed: bool,
    /// The decision came from the cache; nobody was prompted.
    pub cached: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ConfirmationSettings {
    pub require_confirmation: bool,
    pub sensitive_actions_require_confirmation: bool,
    pub ttl: Duration,
}

impl Default for ConfirmationSettings {
    fn default() -> Self {
        Self {
            require_confirmation: true,
            sensitive_actions_require_confirmation: true,
            ttl: DEFAULT_CONFIRMATION_TTL,
        }
    }
}

impl From<&SecurityConfig> for ConfirmationSettings {
    fn from(cfg: &SecurityConfig) -> Self {
        Self {
            require_confirmation: cfg.require_confirmation,
            sensitive_actions_require_confirmation: cfg.sensitive_actions_require_confirmation,
            ttl: Duration::from_secs(cfg.confirmation_ttl_secs),
        }
    }
}

pub struct ConfirmationManager {
    settings: ConfirmationSettings,
    prompt: Arc<dyn ConfirmationPrompt>,
    cache: Mutex<HashMap<String, CachedDecision>>,
}

impl ConfirmationManager {
    pub fn new(settings: ConfirmationSettings, prompt: Arc<dyn ConfirmationPrompt>) -> Self {
        Self {
            settings,
            prompt,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &ConfirmationSettings {
        &self.settings
    }

    /// Both switches on and the tool name contains a sensitive keyword.
    pub fn is_required(&self, tool_name: &str) -> bool {
        if !self.settings.require_confirmation || !self.settings.sensitive_actions_require_confirmation {
            return false;
        }
        let lower = tool_name.to_lowercase();
        SENSITIVE_KEYWORDS.iter().any(|k| lower.contains(k))
    }

    pub fn cache_decision(&self, tool_name: &str, allowed: bool, ttl: Duration) {
        self.cache_decision_at(tool_name, allowed, ttl, Instant::now());
    }

    pub fn cache_decision_at(&self, tool_name: &str, allowed: bool, ttl: Duration, now: Instant) {
        let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        cache.insert(
            tool_name.to_string(),
            CachedDecision {
                allowed,
                expires_at: now + ttl,
            },
        );
    }

    pub fn cached_decision(&self, tool_name: &str) -> Option<bool> {
        self.cached_decision_at(tool_name, Instant::now())
    }

    /// Unexpired decision for `tool_name` as of `now`.  Expired entries are
    /// dropped.
    pub fn cached_decision_at(&self, tool_name: &str, now: Instant) -> Option<bool> {
        let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        let entry = *cache.get(tool_name)?;
        if now > entry.expires_at {
            cache.remove(tool_name);
            debug!(tool = tool_name, "cached confirmation expired");
            return None;
        }
        Some(entry.allowed)
    }

    pub fn clear(&self) {
        self.cache.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }

    /// Consult the cache, otherwise prompt.  A failing prompt counts as a
    /// denial.
    pub async fn request_confirmation(
        &self,
        tool_name: &str,
        parameters: &Value,
        sensitivity: &str,
    ) -> ConfirmationOutcome {
        if let Some(allowed) = self.cached_decision(tool_name) {
            debug!(tool = tool_name, allowed, "using cached confirmation");
            return ConfirmationOutcome {
                allowed,
                cached: true,
            };
        }

        let request = ConfirmationRequest {
            tool_name: tool_name.to_string(),
            parameters: parameters.clone(),
            sensitivity: sensitivity.to_string(),
        };
        let reply = match self.prompt.prompt(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(tool = tool_name, error = %e, "confirmation prompt failed; denying");
                ConfirmationReply {
                    allowed: false,
                    remember: false,
                }
            }
        };

        if reply.remember {
            self.cache_decision(tool_name, reply.allowed, self.settings.ttl);
        }
        info!(tool = tool_name, allowed = reply.allowed, remember = reply.remember, "user confirmation");
        ConfirmationOutcome {
            allowed: reply.allowed,
            cached: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPrompt {
        reply: ConfirmationReply,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ConfirmationPrompt for CountingPrompt {
        async fn prompt(&self, _request: &ConfirmationRequest) -> Result<ConfirmationReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply)
        }
    }

    fn counting(allowed: bool, remember: bool) -> Arc<CountingPrompt> {
        Arc::new(CountingPrompt {
            reply: ConfirmationReply { allowed, remember },
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn keyword_match_is_case_insensitive_substring() {
        let mgr = ConfirmationManager::new(ConfirmationSettings::default(), Arc::new(StaticPrompt::allow()));
        assert!(mgr.is_required("delete_file"));
        assert!(mgr.is_required("Windows_SERVICE_Control"));
        assert!(mgr.is_required("type_text"));
        assert!(mgr.is_required("get_system_info"));
        assert!(mgr.is_required("scroll_mouse"));
        assert!(mgr.is_required("launch_application"));
        assert!(mgr.is_required("keyboard_shortcut"));
        assert!(!mgr.is_required("read_file"));
        assert!(!mgr.is_required("echo"));
        assert!(!mgr.is_required("get_time"));
    }

    #[test]
    fn either_switch_off_disables_confirmation() {
        for (global, sensitive) in [(false, true), (true, false), (false, false)] {
            let settings = ConfirmationSettings {
                require_confirmation: global,
                sensitive_actions_require_confirmation: sensitive,
                ..Default::default()
            };
            let mgr = ConfirmationManager::new(settings, Arc::new(StaticPrompt::allow()));
            assert!(!mgr.is_required("delete_file"));
        }
    }

    #[test]
    fn cache_honours_ttl_boundary() {
        let mgr = ConfirmationManager::new(ConfirmationSettings::default(), Arc::new(StaticPrompt::allow()));
        let t0 = Instant::now();
        let ttl = Duration::from_secs(60);
        mgr.cache_decision_at("write_file", false, ttl, t0);

        assert_eq!(mgr.cached_decision_at("write_file", t0), Some(false));
        assert_eq!(mgr.cached_decision_at("write_file", t0 + ttl), Some(false));
        assert_eq!(mgr.cached_decision_at("write_file", t0 + ttl + Duration::from_millis(1)), None);
        // Expired entry was evicted on read.
        assert_eq!(mgr.cached_decision_at("write_file", t0), None);
    }

    #[test]
    fn cache_keeps_one_decision_per_tool() {
        let mgr = ConfirmationManager::new(ConfirmationSettings::default(), Arc::new(StaticPrompt::allow()));
        mgr.cache_decision("move_file", false, Duration::from_secs(60));
        mgr.cache_decision("move_file", true, Duration::from_secs(60));
        assert_eq!(mgr.cached_decision("move_file"), Some(true));
        mgr.clear();
        assert_eq!(mgr.cached_decision("move_file"), None);
    }

    #[tokio::test]
    async fn remembered_decision_skips_prompt() {
        let prompt = counting(false, true);
        let mgr = ConfirmationManager::new(ConfirmationSettings::default(), prompt.clone());
        let args = serde_json::json!({"path": "/tmp/x"});

        let first = mgr.request_confirmation("delete_file", &args, "ADMIN").await;
        assert_eq!(first, ConfirmationOutcome { allowed: false, cached: false });
        let second = mgr.request_confirmation("delete_file", &args, "ADMIN").await;
        assert_eq!(second, ConfirmationOutcome { allowed: false, cached: true });
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unremembered_decision_prompts_each_time() {
        let prompt = counting(true, false);
        let mgr = ConfirmationManager::new(ConfirmationSettings::default(), prompt.clone());
        let args = Value::Null;
        for _ in 0..3 {
            let out = mgr.request_confirmation("click_mouse", &args, "ADVANCED").await;
            assert!(out.allowed && !out.cached);
        }
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn channel_prompt_roundtrip() {
        let (tx, mut rx) = confirmation_channel();
        tokio::spawn(async move {
            while let Some((req, reply)) = rx.recv().await {
                assert_eq!(req.sensitivity, "ADVANCED");
                let _ = reply.send(ConfirmationReply {
                    allowed: req.tool_name == "write_file",
                    remember: false,
                });
            }
        });
        let mgr = ConfirmationManager::new(ConfirmationSettings::default(), Arc::new(ChannelPrompt::new(tx)));
        assert!(mgr.request_confirmation("write_file", &Value::Null, "ADVANCED").await.allowed);
        assert!(!mgr.request_confirmation("type_text", &Value::Null, "ADVANCED").await.allowed);
    }

    #[tokio::test]
    async fn closed_channel_is_a_denial() {
        let (tx, rx) = confirmation_channel();
        drop(rx);
        let mgr = ConfirmationManager::new(ConfirmationSettings::default(), Arc::new(ChannelPrompt::new(tx)));
        let out = mgr.request_confirmation("write_file", &Value::Null, "ADVANCED").await;
        assert!(!out.allowed);
        assert_eq!(mgr.cached_decision("write_file"), None);
    }
}
