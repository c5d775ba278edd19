//! HTTP server for the Lab Co-Pilot data API
//! Raw tokio listener, one request per connection

use anyhow::{Context, Result};
use clap::Parser;
use lab_copilot::config::ServerConfig;
use lab_copilot::http::{apply_cors, read_request, route};
use lab_copilot::service::DataService;
use lab_copilot::store::DatasetStore;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "server")]
#[command(about = "Lab Co-Pilot data API server")]
struct Args {
    /// Address to bind, overrides LAB_COPILOT_BIND
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = ServerConfig::from_env().context("Invalid server configuration")?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    let config = Arc::new(config);
    let service = DataService::new(DatasetStore::new(), &config);

    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!("Lab Co-Pilot API listening on http://{}", config.bind);
    info!("Allowed origins: {}", config.allowed_origins.join(", "));

    loop {
        let (stream, addr) = listener.accept().await?;
        debug!("New connection from {}", addr);
        tokio::spawn(handle_connection(stream, service.clone(), Arc::clone(&config)));
    }
}

async fn handle_connection(mut stream: TcpStream, service: DataService, config: Arc<ServerConfig>) {
    let request = match read_request(&mut stream, &config).await {
        Ok(request) => request,
        Err(e) => {
            warn!("Could not read request: {:?}", e);
            if let Some(response) = e.response() {
                let _ = stream.write_all(&response.to_bytes()).await;
            }
            return;
        }
    };

    info!("{} {}", request.method, request.path);
    let request = Arc::new(request);
    let routed = {
        let request = Arc::clone(&request);
        tokio::task::spawn_blocking(move || route(&service, &request)).await
    };
    let response = match routed {
        Ok(response) => response,
        Err(e) => {
            error!("Request handler panicked: {}", e);
            lab_copilot::http::Response::detail(500, "Internal Server Error")
        }
    };
    let response = apply_cors(response, &request, &config);

    if let Err(e) = stream.write_all(&response.to_bytes()).await {
        error!("Failed to write response: {}", e);
    }
    let _ = stream.shutdown().await;
}
