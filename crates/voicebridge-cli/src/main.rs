use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;

use voicebridge_core::config::{Config, Settings};
use voicebridge_gateway::{GatewayState, build_relay, start_gateway};

#[derive(Parser)]
#[command(
    name = "voicebridge",
    about = "LINE voice chat relay: speech in, completion, speech out",
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

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server
    Serve {
        /// Address to bind (default: 0.0.0.0)
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on (default: 5000)
        #[arg(long)]
        port: Option<u16>,

        /// Additional `host:port` serving the same endpoints
        #[arg(long)]
        alt_bind: Option<String>,
    },

    /// Validate configuration and print the resolved, non-secret settings
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    let config = Config::load(&config_path)?;
    let mut settings = config.resolve()?;

    match cli.command {
        Commands::Serve {
            bind,
            port,
            alt_bind,
        } => {
            if let Some(bind) = bind {
                settings.gateway.bind = bind;
            }
            if let Some(port) = port {
                anyhow::ensure!(port != 0, "Gateway port cannot be 0");
                settings.gateway.port = port;
            }
            if alt_bind.is_some() {
                settings.gateway.alt_bind = alt_bind;
            }

            let relay = build_relay(&settings)?;
            tracing::info!(
                config = %config_path.display(),
                model = %settings.completion.model,
                voice = %settings.speech.voice,
                region = %settings.speech.region,
                "Starting Voicebridge v{}",
                env!("CARGO_PKG_VERSION")
            );

            let state = Arc::new(GatewayState::new(relay));
            start_gateway(state, &settings.gateway).await?;
        }
        Commands::Check => {
            println!("Voicebridge v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("{}", serde_json::to_string_pretty(&summary(&settings))?);
        }
    }

    Ok(())
}

/// Resolved settings with every credential left out.
fn summary(settings: &Settings) -> serde_json::Value {
    json!({
        "gateway": {
            "bind": settings.gateway.bind,
            "port": settings.gateway.port,
            "alt_bind": settings.gateway.alt_bind,
        },
        "line": {
            "api_base_url": settings.line.api_base_url,
            "data_base_url": settings.line.data_base_url,
        },
        "completion": {
            "base_url": settings.completion.base_url,
            "model": settings.completion.model,
            "max_tokens": settings.completion.max_tokens,
            "temperature": settings.completion.temperature,
            "timeout_secs": settings.completion.timeout_secs,
        },
        "speech": {
            "region": settings.speech.region,
            "voice": settings.speech.voice,
            "language": settings.speech.language,
            "input_content_type": settings.speech.input_content_type,
            "timeout_secs": settings.speech.timeout_secs,
        },
        "storage": {
            "container": settings.storage.container,
        },
    })
}
