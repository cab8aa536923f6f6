mod audit_cmds;
mod interactive;
mod logging;
mod prompt;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use hostagent_config::AppConfig;
use hostagent_exec::{PermissionManager, SecurityMiddleware};
use hostagent_llm::OllamaClient;
use hostagent_runtime::{Agent, AgentSettings};
use hostagent_tools::default_registry;

use crate::prompt::StdinPrompt;

#[derive(Debug, Parser)]
#[command(
    name = "hostagent",
    version,
    about = "A local-model assistant that operates the host through audited, permission-gated tools"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "config/default.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Interactive chat session (default).
    Chat,
    /// Send a single message and print the answer.
    Ask {
        #[arg(trailing_var_arg = true, required = true)]
        text: Vec<String>,
    },
    /// List registered tools and the permission level each one needs.
    Tools,
    /// List models installed on the Ollama server.
    Models,
    #[command(about = "Inspect or manage the security audit log")]
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },
}

#[derive(Debug, Subcommand)]
enum AuditCommands {
    /// Show the newest audit records.
    Recent {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Export records in a time window.
    Export {
        #[arg(long, value_enum, default_value = "json")]
        format: CliExportFormat,
        /// Inclusive lower bound (RFC 3339).
        #[arg(long)]
        start: Option<DateTime<Utc>>,
        /// Inclusive upper bound (RFC 3339).
        #[arg(long)]
        end: Option<DateTime<Utc>>,
        /// Write to a file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Move the live log to a `.bak` backup and start a new one.
    Clear {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliExportFormat {
    Json,
    Csv,
}

impl From<CliExportFormat> for hostagent_audit::ExportFormat {
    fn from(f: CliExportFormat) -> Self {
        match f {
            CliExportFormat::Json => hostagent_audit::ExportFormat::Json,
            CliExportFormat::Csv => hostagent_audit::ExportFormat::Csv,
        }
    }
}

fn build_agent(config: &AppConfig) -> Result<Agent> {
    let backend = Arc::new(OllamaClient::from_config(&config.llm)?);
    let registry = Arc::new(default_registry());
    let security = SecurityMiddleware::from_config(&config.security, Arc::new(StdinPrompt));
    Ok(Agent::new(
        backend,
        registry,
        security,
        AgentSettings::from_config(config),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;
    let _log_guard = logging::init(&config.telemetry)?;
    info!(
        config = %cli.config.display(),
        model = %config.llm.model,
        permission_level = %config.security.level(),
        "hostagent starting"
    );

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let agent = build_agent(&config)?;
            interactive::run_chat_session(agent).await?;
        }
        Commands::Ask { text } => {
            let mut agent = build_agent(&config)?;
            let answer = agent.process_message(&text.join(" ")).await;
            println!("{answer}");
        }
        Commands::Tools => {
            let registry = default_registry();
            let permissions = PermissionManager::new(config.security.level());
            println!("permission level: {}", permissions.current_level());
            for spec in registry.list_specs() {
                let required = permissions.required_level(&spec.name);
                let marker = if permissions.check(&spec.name, Some(required)) {
                    " "
                } else {
                    "!"
                };
                println!("{marker} {:<20} {:<9} {}", spec.name, required.as_str(), spec.description);
            }
        }
        Commands::Models => {
            let client = OllamaClient::from_config(&config.llm)?;
            let models = client.list_models().await?;
            if models.is_empty() {
                println!("no models installed (run: ollama pull <model>)");
            }
            for model in models {
                let marker = if model == config.llm.model { "*" } else { " " };
                println!("{marker} {model}");
            }
        }
        Commands::Audit { command } => {
            let audit = hostagent_audit::AuditLogger::from_config(&config.security);
            match command {
                AuditCommands::Recent { limit } => audit_cmds::print_recent(&audit, limit)?,
                AuditCommands::Export {
                    format,
                    start,
                    end,
                    output,
                } => audit_cmds::export(&audit, format.into(), start, end, output.as_deref())?,
                AuditCommands::Clear { yes } => audit_cmds::clear(&audit, yes)?,
            }
        }
    }

    Ok(())
}
