mod config_commands;
mod model_commands;
mod provider_commands;

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::Context,
    chatdesk_config::{ConsoleConfig, apply_env_overrides, discover_and_load, load_config},
    chatdesk_provider_setup::{HttpBackend, ProviderConsole},
    clap::{Parser, Subcommand},
    tracing::{debug, info},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "chatdesk", about = "chatdesk: provider connection console")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to use instead of the discovered one.
    #[arg(long, global = true, env = "CHATDESK_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Provider onboarding: list, test, connect, refresh.
    Providers {
        #[command(subcommand)]
        action: provider_commands::ProviderAction,
    },
    /// Model catalog queries and flag changes.
    Models {
        #[command(subcommand)]
        action: model_commands::ModelAction,
    },
    /// Configuration validation.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn load(config: Option<&PathBuf>) -> anyhow::Result<ConsoleConfig> {
    match config {
        Some(path) => {
            let loaded = load_config(path)?;
            Ok(apply_env_overrides(loaded, |name| std::env::var(name).ok()))
        },
        None => Ok(discover_and_load()),
    }
}

/// Build a console against the configured backend and hydrate its provider
/// list.
async fn connect_console(config: Option<&PathBuf>) -> anyhow::Result<ProviderConsole> {
    let config = load(config)?;
    debug!(backend = %config.backend.base_url, "using backend");
    let backend = HttpBackend::from_config(&config.backend).context("invalid backend config")?;
    let console = ProviderConsole::new(Arc::new(backend), &config.timeouts);
    console
        .load_providers()
        .await
        .context("failed to list providers")?;
    Ok(console)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "chatdesk starting");

    match cli.command {
        Commands::Providers { action } => {
            let console = connect_console(cli.config.as_ref()).await?;
            provider_commands::handle_providers(&console, action).await
        },
        Commands::Models { action } => {
            let console = connect_console(cli.config.as_ref()).await?;
            model_commands::handle_models(&console, action).await
        },
        Commands::Config { action } => {
            config_commands::handle_config(action, cli.config.as_deref())
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "chatdesk",
            "models",
            "list",
            "openai",
            "--log-level",
            "debug",
            "--json-logs",
        ])
        .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(cli.log_level, "debug");
        assert!(cli.json_logs);
        assert!(matches!(cli.command, Commands::Models { .. }));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["chatdesk"]).is_err());
    }
}
