use clap::Parser;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use brainbrew::{
    app::App,
    config::{Config, LogFormat, SessionBackend},
    llm::ChatClient,
    pipeline::ContentPipeline,
    server::PassServer,
    session::open_store,
};

/// Study material generator: reads pass requests from stdin, writes renders to stdout.
#[derive(Debug, Parser)]
#[command(name = "brainbrew", version, about)]
struct Cli {
    /// Session for requests that do not name one (a fresh UUID by default)
    #[arg(long)]
    session: Option<String>,

    /// Session backend, overriding SESSION_BACKEND
    #[arg(long)]
    backend: Option<SessionBackend>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(backend) = cli.backend {
        config.session.backend = backend;
    }

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        model = %config.model.model,
        "BrainBrew starting..."
    );

    // Initialize session store
    let store = match open_store(&config.session).await {
        Ok(s) => {
            info!(backend = ?config.session.backend, "Session store initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize session store");
            return Err(e.into());
        }
    };

    // Initialize chat client
    let client = match ChatClient::new(&config.model, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %config.model.base_url, "Chat client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize chat client");
            return Err(e.into());
        }
    };

    let pipeline =
        ContentPipeline::new(Arc::new(client)).with_decode_retries(config.generation.decode_retries);
    let session = cli
        .session
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let server = PassServer::new(App::new(pipeline), store, session);

    info!(session_id = %server.default_session(), "Ready, waiting for passes on stdin...");

    if let Err(e) = server.run().await {
        error!(error = %e, "Runner error");
        return Err(e.into());
    }

    info!("Shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
