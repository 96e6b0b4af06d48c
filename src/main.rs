#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::assigning_clones,
    clippy::bool_to_int_with_if,
    clippy::case_sensitive_file_extension_comparisons,
    clippy::cast_possible_wrap,
    clippy::doc_markdown,
    clippy::field_reassign_with_default,
    clippy::float_cmp,
    clippy::implicit_clone,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::manual_let_else,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::needless_raw_string_hashes,
    clippy::redundant_closure_for_method_calls,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unused_self,
    clippy::cast_precision_loss,
    clippy::unnecessary_cast,
    clippy::unnecessary_lazy_evaluations,
    clippy::unnecessary_literal_bound,
    clippy::unnecessary_map_or,
    clippy::unnecessary_wraps,
    dead_code
)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use easly::config::CONFIG_DIR_ENV;
use easly::health::{check_health, HealthOutcome};
use easly::rag::{create_probe, CheckOptions};
use easly::sessions::{create_session_store, SessionStore};
use easly::{gateway, Config, SessionCommands};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// `Easly` - storefront assistant backend.
#[derive(Parser, Debug)]
#[command(name = "easly")]
#[command(version)]
#[command(about = "Webhook fulfillment and status service for the Easly storefront assistant.", long_about = None)]
struct Cli {
    /// Config directory (holds config.toml and the workspace); overrides EASLY_CONFIG_DIR
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway server (fulfillment webhook, status routes, event feed)
    #[command(long_about = "\
Start the gateway server.

Serves POST /fulfillment for the NLU platform plus the /health, \
/ai/health, /ai/rag, /ai/sessions/{user_id} and /ai/events routes. \
Bind address defaults to the values in your config file \
(gateway.host / gateway.port), then PORT / HOST.

Examples:
  easly gateway                  # use config defaults
  easly gateway -p 8080          # listen on port 8080
  easly gateway --host 0.0.0.0   # bind to all interfaces
  easly gateway -p 0             # random available port")]
    Gateway {
        /// Port to listen on (use 0 for random available port); defaults to config gateway.port
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to; defaults to config gateway.host
        #[arg(long)]
        host: Option<String>,
    },

    /// Probe a running gateway's /ai/health and exit 0 (ok), 2 (not ok) or 1 (unreachable)
    #[command(long_about = "\
Probe a running gateway's health endpoint.

Prints the JSON body. Exit status is 0 when the body reports ok, \
2 when the endpoint answered without ok, and 1 when it could not \
be reached.

Examples:
  easly health-check
  easly health-check --url http://10.0.0.5:3001/ai/health
  AI_HEALTH_URL=http://shop:3001/ai/health easly health-check")]
    HealthCheck {
        /// Health endpoint; defaults to config health.url (AI_HEALTH_URL)
        #[arg(long)]
        url: Option<String>,

        /// Request timeout in milliseconds; defaults to config health.timeout_ms
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Check whether the retrieval backend is reachable
    RagStatus {
        /// Discard any cached result and probe again
        #[arg(long)]
        force: bool,
    },

    /// Inspect recorded session memory
    Sessions {
        #[command(subcommand)]
        session_command: SessionCommands,
    },

    /// Show resolved configuration
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.trim().is_empty() {
            bail!("--config-dir cannot be empty");
        }
        std::env::set_var(CONFIG_DIR_ENV, config_dir);
    }

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut config = Config::load_or_init().await?;

    match cli.command {
        Commands::Gateway { port, host } => {
            if let Some(port) = port {
                config.gateway.port = port;
            }
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if config.gateway.port == 0 {
                info!("Starting Easly gateway on {} (random port)", config.gateway.host);
            } else {
                info!(
                    "Starting Easly gateway on {}:{}",
                    config.gateway.host, config.gateway.port
                );
            }
            gateway::run_gateway(config).await
        }

        Commands::HealthCheck { url, timeout_ms } => {
            if let Some(url) = url {
                config.health.url = url;
            }
            if let Some(timeout_ms) = timeout_ms {
                config.health.timeout_ms = timeout_ms;
            }
            let outcome = check_health(&config.health).await;
            match &outcome {
                HealthOutcome::Healthy(body) | HealthOutcome::Unhealthy(body) => {
                    println!("{}", serde_json::to_string_pretty(body)?);
                }
                HealthOutcome::Failed(reason) => eprintln!("AI health check failed: {reason}"),
            }
            std::process::exit(outcome.exit_code());
        }

        Commands::RagStatus { force } => {
            let probe = create_probe(&config.rag);
            let result = probe.check(CheckOptions { force }).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }

        Commands::Sessions { session_command } => {
            let store = create_session_store(&config.sessions, &config.workspace_dir)
                .await
                .context("failed to open session store")?;
            handle_session_command(session_command, store.as_ref()).await
        }

        Commands::Status => {
            println!("🛍️  Easly Status");
            println!();
            println!("Version:     {}", env!("CARGO_PKG_VERSION"));
            println!("Workspace:   {}", config.workspace_dir.display());
            println!("Config:      {}", config.config_path.display());
            println!();
            println!(
                "🌐 Gateway:     {}:{} (timeout {}s, body limit {} bytes)",
                config.gateway.host,
                config.gateway.port,
                config.gateway.request_timeout_secs,
                config.gateway.max_body_bytes
            );
            println!(
                "🧠 Sessions:    {} (hydrate on start: {})",
                if config.sessions.path.trim().is_empty() {
                    "in-memory".to_string()
                } else {
                    config
                        .resolve_workspace_path(&config.sessions.path)
                        .display()
                        .to_string()
                },
                if config.sessions.hydrate_on_start { "on" } else { "off" }
            );
            println!(
                "🔎 Retrieval:   {} at {} (collection {})",
                config.rag.backend, config.rag.url, config.rag.collection
            );
            println!(
                "📦 Catalog:     {} ({})",
                config.catalog.source,
                config.resolve_workspace_path(&config.catalog.data_dir).display()
            );
            println!("🩺 Health URL:  {}", config.health.url);
            println!(
                "📊 Event log:   {}",
                if config.observability.log_events { "on" } else { "off" }
            );
            Ok(())
        }
    }
}

async fn handle_session_command(command: SessionCommands, store: &dyn SessionStore) -> Result<()> {
    match command {
        SessionCommands::List => {
            let users = store.users().await?;
            if users.is_empty() {
                println!("No recorded sessions ({}).", store.name());
                return Ok(());
            }
            for user in users {
                let count = store.recall(&user).await?.len();
                println!("  {user:<32} {count} interaction(s)");
            }
            Ok(())
        }
        SessionCommands::Show { user_id } => {
            let entries = store.recall(&user_id).await?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use easly::sessions::InMemorySessionStore;

    #[test]
    fn cli_definition_has_no_flag_conflicts() {
        Cli::command().debug_assert();
    }

    #[test]
    fn gateway_flags_parse() {
        let cli = Cli::try_parse_from(["easly", "gateway", "-p", "0", "--host", "0.0.0.0"])
            .expect("gateway invocation should parse");
        match cli.command {
            Commands::Gateway { port, host } => {
                assert_eq!(port, Some(0));
                assert_eq!(host.as_deref(), Some("0.0.0.0"));
            }
            other => panic!("expected gateway command, got {other:?}"),
        }
    }

    #[test]
    fn global_config_dir_parses_after_subcommand() {
        let cli = Cli::try_parse_from([
            "easly",
            "health-check",
            "--url",
            "http://x/ai/health",
            "--config-dir",
            "/tmp/easly",
        ])
        .expect("health-check invocation should parse");
        assert_eq!(cli.config_dir.as_deref(), Some("/tmp/easly"));
        match cli.command {
            Commands::HealthCheck { url, timeout_ms } => {
                assert_eq!(url.as_deref(), Some("http://x/ai/health"));
                assert!(timeout_ms.is_none());
            }
            other => panic!("expected health-check command, got {other:?}"),
        }
    }

    #[test]
    fn sessions_show_requires_user_id() {
        assert!(Cli::try_parse_from(["easly", "sessions", "show"]).is_err());
        let cli = Cli::try_parse_from(["easly", "sessions", "show", "u1"]).unwrap();
        match cli.command {
            Commands::Sessions {
                session_command: SessionCommands::Show { user_id },
            } => assert_eq!(user_id, "u1"),
            other => panic!("expected sessions show, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn session_commands_run_against_store() {
        let store = InMemorySessionStore::new();
        store
            .remember("u1", serde_json::json!({"intent": "dashboard"}), serde_json::json!({}))
            .await
            .unwrap();

        handle_session_command(SessionCommands::List, &store)
            .await
            .unwrap();
        handle_session_command(
            SessionCommands::Show {
                user_id: "u1".into(),
            },
            &store,
        )
        .await
        .unwrap();
    }
}
