//! h1-engine command line.
//!
//! ```text
//! h1-engine serve --config engine.toml     run a server (404 for every path)
//! h1-engine fetch http://example.com/      one GET through the pool
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use http::Method;
use tokio::io::AsyncWriteExt;

use h1_engine::client::{pool_from_config, ClientRequest};
use h1_engine::config::{load_config, EngineConfig};
use h1_engine::lifecycle::{signals, Shutdown};
use h1_engine::observability::{logging, metrics};
use h1_engine::server::{HttpServer, NotFoundHandler};

#[derive(Debug, Parser)]
#[command(name = "h1-engine", version, about = "HTTP/1.1 connection lifecycle engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the server.
    Serve {
        /// Path to the TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Fetch a URL and print the response body.
    Fetch {
        url: String,
        /// Path to the TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print the status line and headers too.
        #[arg(short = 'i', long)]
        include: bool,
    },
}

fn load(path: Option<&PathBuf>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(load_config(path)?),
        None => Ok(EngineConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config } => {
            let config = load(config.as_ref())?;
            logging::init_logging(&config.observability)?;
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "h1-engine starting");
            serve(config).await
        }
        Command::Fetch {
            url,
            config,
            include,
        } => {
            let config = load(config.as_ref())?;
            logging::init_logging(&config.observability)?;
            fetch(&config, &url, include).await
        }
    }
}

async fn serve(config: EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        bind_address = %config.server.bind_address,
        max_connections = config.server.max_connections,
        max_concurrent_handlers = config.server.max_concurrent_handlers,
        keepalive_timeout_secs = config.server.keepalive_timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let server = HttpServer::bind(&config.server, Arc::new(NotFoundHandler), shutdown.clone()).await?;
    signals::spawn_signal_handler(shutdown);

    server.run().await?;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn fetch(
    config: &EngineConfig,
    url: &str,
    include: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let pool = pool_from_config(&config.client)?;
    let request = ClientRequest::new(Method::GET, url)?;

    let mut connection = pool.connect(request).await?;
    let result = async {
        connection.send_request(&[]).await?;
        let response = connection.read_response().await?;
        Ok::<_, Box<dyn std::error::Error>>(response)
    }
    .await;

    let (head, body) = match result {
        Ok(response) => {
            connection.release();
            response
        }
        Err(e) => {
            connection.close();
            pool.close();
            return Err(e);
        }
    };
    pool.close();

    let mut stdout = tokio::io::stdout();
    if include {
        let status = format!("HTTP/1.1 {} {}\r\n", head.status, head.reason);
        stdout.write_all(status.as_bytes()).await?;
        for (name, value) in &head.headers {
            stdout.write_all(name.as_str().as_bytes()).await?;
            stdout.write_all(b": ").await?;
            stdout.write_all(value.as_bytes()).await?;
            stdout.write_all(b"\r\n").await?;
        }
        stdout.write_all(b"\r\n").await?;
    }
    stdout.write_all(&body).await?;
    stdout.flush().await?;
    Ok(())
}
