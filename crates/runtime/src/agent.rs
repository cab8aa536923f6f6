use std::sync::Arc;
use std::time::Duration;

use hostagent_config::AppConfig;
use hostagent_exec::SecurityMiddleware;
use hostagent_llm::{ChatMessage, ModelBackend};
use hostagent_tools::ToolRegistry;
use tracing::{debug, error, info, warn};

use crate::history::{reset_history, trim_history};
use crate::tool_loop::execute_tool_call;

pub const MAX_ITERATIONS_MESSAGE: &str = "I apologize, but I've reached the maximum number of tool execution steps. Please try rephrasing your request.";

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model: String,
    pub max_iterations: usize,
    pub tool_timeout: Duration,
    pub max_history: usize,
    pub system_prompt: String,
}

impl AgentSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            model: cfg.llm.model.clone(),
            max_iterations: cfg.agent.max_iterations,
            tool_timeout: Duration::from_secs(cfg.agent.tool_execution_timeout_secs),
            max_history: cfg.agent.max_chat_history,
            system_prompt: cfg.agent.system_prompt.clone(),
        }
    }
}

/// One conversation with a tool-calling model.
///
/// Each user turn may take several model round-trips: whenever the model
/// answers with tool calls they are executed in order through the security
/// middleware and their results fed back, until the model replies with plain
/// text or `max_iterations` is reached.
pub struct Agent {
    backend: Arc<dyn ModelBackend>,
    registry: Arc<ToolRegistry>,
    security: SecurityMiddleware,
    settings: AgentSettings,
    history: Vec<ChatMessage>,
}

impl Agent {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        registry: Arc<ToolRegistry>,
        security: SecurityMiddleware,
        settings: AgentSettings,
    ) -> Self {
        let mut history = Vec::new();
        if !settings.system_prompt.trim().is_empty() {
            history.push(ChatMessage::system(settings.system_prompt.clone()));
        }
        info!(model = %settings.model, tools = registry.len(), "agent initialized");
        Self {
            backend,
            registry,
            security,
            settings,
            history,
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn security(&self) -> &SecurityMiddleware {
        &self.security
    }

    /// Start over: keep the system prompt, forget remembered confirmations.
    pub fn clear_history(&mut self) {
        reset_history(&mut self.history);
        self.security.confirmations().clear();
        info!("conversation history cleared");
    }

    fn push(&mut self, message: ChatMessage) {
        self.history.push(message);
        trim_history(&mut self.history, self.settings.max_history);
    }

    pub async fn process_message(&mut self, user_text: &str) -> String {
        self.push(ChatMessage::user(user_text));
        let tools = self.registry.schema_export();

        for iteration in 1..=self.settings.max_iterations {
            debug!(iteration, max = self.settings.max_iterations, "agent iteration");

            let reply = match self
                .backend
                .chat(&self.settings.model, &self.history, &tools)
                .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    error!(error = %e, "model backend failed");
                    let text = format!("An error occurred: {e}");
                    self.push(ChatMessage::assistant(text.clone()));
                    return text;
                }
            };

            let calls = reply.tool_calls.clone();
            let content = reply.content.clone();
            self.push(reply);

            if calls.is_empty() {
                debug!(iteration, "agent turn complete");
                return content;
            }

            info!(count = calls.len(), "processing tool calls");
            for call in &calls {
                let result = execute_tool_call(
                    call,
                    &self.registry,
                    &self.security,
                    self.settings.tool_timeout,
                )
                .await;
                self.push(ChatMessage::tool(
                    call.id.clone(),
                    call.function.name.clone(),
                    result,
                ));
            }
        }

        warn!(max = self.settings.max_iterations, "agent reached max iterations");
        MAX_ITERATIONS_MESSAGE.to_string()
    }
}
