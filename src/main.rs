use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use secrecy::SecretString;

use verse_core::{CompletionProvider, TranscriptionProvider};
use verse_presence::{PresenceStore, ReaperConfig};
use verse_relay::{CompletionRelay, OpenAiProvider, RelayConfig};
use verse_server::ServerConfig;
use verse_store::{Database, TurnRepo};
use verse_telemetry::TelemetryConfig;

#[derive(Parser)]
#[command(name = "verse", about = "Multiplayer presence & chat relay server")]
struct Cli {
    #[arg(long, default_value_t = 9473)]
    port: u16,

    /// Path to the chat database. Defaults to ~/.verse/database/verse.db
    #[arg(long)]
    db: Option<PathBuf>,

    /// Deadline for upstream completion calls, in seconds.
    #[arg(long, default_value_t = 10)]
    completion_timeout_secs: u64,

    /// Age past which a silent player is evicted, in seconds.
    #[arg(long, default_value_t = 10)]
    stale_after_secs: u64,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    verse_telemetry::init_telemetry(TelemetryConfig {
        json: cli.json_logs,
        ..TelemetryConfig::default()
    });

    tracing::info!("starting verse server");

    // Fail fast: without a key the relay can never answer anything.
    let api_key = std::env::var("OPENAI_API_KEY")
        .expect("OPENAI_API_KEY is not set; export your API key before starting the server");

    let db_path = cli
        .db
        .unwrap_or_else(|| dirs_home().join(".verse").join("database").join("verse.db"));
    let db = Database::open(&db_path).expect("Failed to open database");

    let provider = Arc::new(OpenAiProvider::new(SecretString::from(api_key)));
    let completion: Arc<dyn CompletionProvider> = provider.clone();
    let transcription: Arc<dyn TranscriptionProvider> = provider;

    let relay = Arc::new(CompletionRelay::new(
        completion,
        transcription,
        TurnRepo::new(db.clone()),
        RelayConfig {
            timeout: Duration::from_secs(cli.completion_timeout_secs),
            ..RelayConfig::default()
        },
    ));

    let presence = Arc::new(PresenceStore::new(1024));

    let config = ServerConfig {
        port: cli.port,
        reaper: ReaperConfig {
            stale_after: Duration::from_secs(cli.stale_after_secs),
            ..ReaperConfig::default()
        },
        ..ServerConfig::default()
    };
    let port = config.port;

    let handle = verse_server::start(config, db, presence, relay)
        .await
        .expect("Failed to start server");

    tracing::info!(port = port, "verse server ready");

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl+c");

    handle.stop();
    tracing::info!("shutting down");
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
