use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use voxgate_core::{SystemClock, init_telemetry};
use voxgate_server::{
    TextSource, VoxgateConfig, build_state, render_to_file, router, tone_with_overrides,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Voxgate speech synthesis gateway", long_about = None)]
struct Cli {
    /// Configuration file used in place of ~/.config and ./voxgate.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Configuration profile ("default", "test" or "ci")
    #[arg(short, long, global = true)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Listen address, overriding the configuration
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Print the effective configuration with secrets masked
    CheckConfig,
    /// Render text to a WAV file with the tone synthesizer, bypassing the gateway
    Synthesize {
        /// Text to render; read from --input-file or stdin when absent
        #[arg(short, long, conflicts_with = "input_file")]
        text: Option<String>,

        /// UTF-8 file holding the text to render
        #[arg(short, long)]
        input_file: Option<PathBuf>,

        /// Destination WAV file
        #[arg(short = 'o', long)]
        audio_output: PathBuf,

        /// Samples per second, overriding the configuration
        #[arg(long)]
        sample_rate: Option<u32>,

        /// Seconds of audio per character, overriding the configuration
        #[arg(long)]
        symbol_duration: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = VoxgateConfig::load_with(cli.profile.as_deref(), cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::CheckConfig => {
            println!("{}", config.to_redacted_toml()?);
            Ok(())
        }
        Command::Synthesize {
            text,
            input_file,
            audio_output,
            sample_rate,
            symbol_duration,
        } => {
            let tone = tone_with_overrides(config.provider().tone(), sample_rate, symbol_duration)?;
            let text = TextSource::from_args(text, input_file).read()?;
            let audio = render_to_file(&tone, &text, &audio_output)?;
            println!(
                "Wrote {} bytes ({:.2}s) to {}",
                audio.audio().len(),
                audio.duration_seconds().unwrap_or_default(),
                audio_output.display()
            );
            Ok(())
        }
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.server_mut().set_bind_address(bind);
            }
            serve(config).await
        }
    }
}

async fn serve(config: VoxgateConfig) -> Result<()> {
    init_telemetry(config.telemetry())
        .map_err(|e| anyhow::anyhow!("Failed to initialise logging: {}", e))?;

    let state = build_state(&config, Arc::new(SystemClock))?;
    let listener = tokio::net::TcpListener::bind(config.server().bind_address()).await?;

    info!(
        address = %listener.local_addr()?,
        provider = %config.provider().kind(),
        "Starting voxgate"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Voxgate stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
