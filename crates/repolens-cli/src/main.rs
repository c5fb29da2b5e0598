use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use repolens_agent::ScriptedSource;
use repolens_client::{RunController, StreamClient};
use repolens_core::config::Config;
use repolens_core::types::{Turn, TurnStatus};
use repolens_gateway::{start_gateway, GatewayState};
use repolens_store::{ConversationStore, JsonlBackend, MemoryBackend, StorageBackend};

#[derive(Parser)]
#[command(
    name = "repolens",
    about = "Converse with an AI agent that explores a source repository",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server with the scripted demo agent
    Serve {
        /// Port to listen on (default: 8787)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Submit one prompt to a gateway and print the finished turn
    Ask {
        /// The prompt to send
        message: String,

        /// Gateway base URL
        #[arg(long)]
        url: Option<String>,
    },

    /// Show version and config summary
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    // Load config
    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_path);
    let config = Config::load(&config_path)?;

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or_else(|| config.gateway_port());
            let backend: Arc<dyn StorageBackend> =
                Arc::new(JsonlBackend::new(config.store_dir()));
            let source = Arc::new(ScriptedSource::demo());

            tracing::info!("Starting RepoLens gateway on port {port}");
            let state = Arc::new(GatewayState::new(Arc::new(config), source, backend));
            start_gateway(state, port).await?;
        }
        Commands::Ask { message, url } => {
            let base_url = url.unwrap_or_else(|| config.base_url());
            let store = Arc::new(ConversationStore::new(Arc::new(MemoryBackend::new())));
            let controller = RunController::new(
                Arc::clone(&store),
                StreamClient::new(base_url),
                config.idle_timeout(),
            );

            let outcome = controller.submit(None, &message).await?;
            if let Some(conversation) = store.conversation(&outcome.conversation_id) {
                for turn in &conversation.turns {
                    print_turn(turn);
                }
            }
        }
        Commands::Status => {
            println!("RepoLens v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!(
                "Gateway: {}:{}",
                config.gateway_bind(),
                config.gateway_port()
            );
            println!("Store: {}", config.store_dir().display());
        }
    }

    Ok(())
}

fn print_turn(turn: &Turn) {
    match turn {
        Turn::User { content, .. } => println!("> {content}"),
        Turn::Assistant {
            tool_calls, phase, ..
        } => {
            let Some((narration, answer)) = turn.narration_split() else {
                return;
            };
            if !narration.is_empty() {
                println!("{narration}");
            }
            for call in tool_calls {
                match &call.result {
                    Some(result) => {
                        println!("  [{}] {}", call.tool, result.lines().next().unwrap_or(""));
                    }
                    None => println!("  [{}] ...", call.tool),
                }
            }
            if !answer.is_empty() {
                println!("{answer}");
            }
            if let Some(stats) = phase.stats() {
                println!(
                    "\n({} tool uses, {} tokens, {} ms)",
                    stats.tool_uses, stats.tokens, stats.duration_ms
                );
            }
            if phase.status() == TurnStatus::Cancelled {
                println!("\n(run cancelled)");
            }
        }
    }
}
