use clap::Parser;
use log::{info, warn};
use server::auth::{SessionVerifier, StaticTokenVerifier};
use server::config::ServerConfig;
use server::endpoint::Endpoint;
use server::http::{router, AppState};
use server::manager::MatchManager;
use server::recorder::LogRecorder;
use server::session::SessionRegistry;
use std::sync::Arc;
use tokio::net::TcpListener;

// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// HTTP port for the match API
    #[clap(short, long, default_value = "8080")]
    port: u16,

    /// WebSocket port for the game channel
    #[clap(short = 'w', long, default_value = "8081")]
    ws_port: u16,

    /// Tick rate (simulation updates per second)
    #[clap(short, long, default_value = "60")]
    tick_rate: u32,

    /// Public URL clients use to reach the game channel
    #[clap(long)]
    websocket_url: Option<String>,

    /// Development session tokens as token:id:username triples
    #[clap(long = "session-token")]
    session_tokens: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::init();

    // Print a message about setting RUST_LOG if not set
    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Warning: RUST_LOG environment variable not set. Set it to display logs!");
        eprintln!("Recommended: RUST_LOG=info cargo run");
    }

    let args = Args::parse();
    let http_addr = format!("{}:{}", args.host, args.port);
    let ws_addr = format!("{}:{}", args.host, args.ws_port);

    let config = ServerConfig {
        tick_hz: args.tick_rate,
        websocket_url: args
            .websocket_url
            .unwrap_or_else(|| format!("ws://{}:{}", args.host, args.ws_port)),
        ..ServerConfig::default()
    };

    if args.session_tokens.is_empty() {
        warn!("No session tokens configured; every connection will be rejected");
    }
    let verifier: Arc<dyn SessionVerifier> = Arc::new(StaticTokenVerifier::from_entries(
        args.session_tokens.iter().map(String::as_str),
    ));

    let sessions = Arc::new(SessionRegistry::new());
    let manager = MatchManager::new(config.clone(), Arc::clone(&sessions), Arc::new(LogRecorder));

    info!(
        "Starting match service: HTTP on {}, game channel on {}",
        http_addr, ws_addr
    );
    info!(
        "Tick rate: {} Hz ({:?} per tick)",
        config.tick_hz,
        config.tick_duration()
    );

    // Game channel listener
    let ws_listener = TcpListener::bind(&ws_addr).await?;
    let endpoint = Endpoint::new(
        Arc::clone(&manager),
        Arc::clone(&sessions),
        Arc::clone(&verifier),
        config.clone(),
    );
    tokio::spawn(endpoint.run(ws_listener));

    // Match API
    let app = router(AppState { manager, verifier });
    let http_listener = TcpListener::bind(&http_addr).await?;
    axum::serve(http_listener, app).await?;

    Ok(())
}
