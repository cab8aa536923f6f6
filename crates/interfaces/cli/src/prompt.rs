use std::io::{self, IsTerminal, Write};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use hostagent_audit::sanitize_parameters;
use hostagent_exec::{ConfirmationPrompt, ConfirmationReply, ConfirmationRequest};

/// Asks on the terminal.  Without a terminal every request is denied.
pub struct StdinPrompt;

/// Map a typed answer to a reply.  `None` for anything unrecognised.
pub(crate) fn parse_answer(answer: &str) -> Option<ConfirmationReply> {
    let (allowed, remember) = match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => (true, false),
        "a" | "always" => (true, true),
        "n" | "no" | "" => (false, false),
        "d" | "never" => (false, true),
        _ => return None,
    };
    Some(ConfirmationReply { allowed, remember })
}

fn ask(request: &ConfirmationRequest) -> Result<ConfirmationReply> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        bail!("confirmation needs an interactive terminal");
    }

    let params = serde_json::to_string_pretty(&sanitize_parameters(&request.parameters))
        .unwrap_or_else(|_| request.parameters.to_string());
    let mut out = io::stdout();
    writeln!(out)?;
    writeln!(out, "[{}] confirm tool call: {}", request.sensitivity, request.tool_name)?;
    writeln!(out, "{params}")?;

    loop {
        write!(out, "allow? [y]es / [n]o / [a]lways / [d]eny always: ")?;
        out.flush()?;
        let mut line = String::new();
        let bytes = stdin.read_line(&mut line).context("failed to read answer")?;
        if bytes == 0 {
            bail!("stdin closed");
        }
        if let Some(reply) = parse_answer(&line) {
            return Ok(reply);
        }
    }
}

#[async_trait]
impl ConfirmationPrompt for StdinPrompt {
    async fn prompt(&self, request: &ConfirmationRequest) -> Result<ConfirmationReply> {
        let request = request.clone();
        tokio::task::spawn_blocking(move || ask(&request))
            .await
            .context("confirmation prompt task failed")?
    }
}
