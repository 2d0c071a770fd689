use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Router;
use clap::Parser;
use tracing::{info, warn};

use phishing_detector::service::error_response;
use phishing_detector::{init_logging, Service, Settings};

/// Request bodies above this size are rejected before reaching the service.
const BODY_LIMIT: usize = 1 << 20;

#[derive(Parser, Debug)]
#[command(name = "serve", about = "Serves spam predictions over HTTP")]
struct Args {
    /// Address to listen on [env: SPAM_BIND_ADDR]
    #[arg(long)]
    bind: Option<String>,

    /// Spam probability at or above which an email is flagged [env: SPAM_THRESHOLD]
    #[arg(long)]
    threshold: Option<f64>,

    /// Directory holding the trained artifacts [env: SPAM_MODELS_DIR]
    #[arg(long)]
    models_dir: Option<PathBuf>,
}

async fn dispatch(State(service): State<Arc<Service>>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let bytes = match axum::body::to_bytes(body, BODY_LIMIT).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!("could not read request body: {err}");
            return error_response(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", &err)
                .map(Body::from);
        }
    };

    service
        .route(http::Request::from_parts(parts, bytes))
        .map(Body::from)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let mut settings = Settings::from_env();
    if let Some(bind) = args.bind {
        settings.bind_addr = bind;
    }
    if let Some(threshold) = args.threshold {
        settings.spam_threshold = threshold;
    }
    if let Some(models_dir) = args.models_dir {
        settings.models_dir = models_dir;
    }

    let service = Arc::new(Service::from_settings(&settings));
    if service.is_ready() {
        info!(threshold = settings.spam_threshold, "predictor ready");
    }

    let app = Router::new().fallback(dispatch).with_state(service);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("could not bind {}", settings.bind_addr))?;
    info!("listening on {}", settings.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
