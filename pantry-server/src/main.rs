use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use pantry::basic_models::{GenerationRequest, RecipeCollection};
use pantry_server::{
    config::Config,
    errors::{PipelineError, WebError, WebResult},
    generation::{default_concurrency, OpenAITextModel, StabilityImageModel},
    pipeline::Pipeline,
    storage::{ArtifactStore, MemoryStore, StorageClient, IMAGE_PREFIX},
};
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    /// The address and optionally port to bind to
    #[clap(long, default_value = "0.0.0.0:3000")]
    address: String,

    /// Whether to use HTTPS / TLS
    #[clap(long)]
    tls: bool,

    /// PEM certificate chain, when using TLS
    #[clap(long, default_value = "/etc/letsencrypt/live/pantry/fullchain.pem")]
    cert_path: String,

    /// PEM private key, when using TLS
    #[clap(long, default_value = "/etc/letsencrypt/live/pantry/privkey.pem")]
    key_path: String,

    /// Keep generated images in memory instead of the bucket
    #[clap(long)]
    memory_store: bool,

    /// How many images to generate at once (defaults to the number of cores)
    #[clap(long)]
    max_concurrency: Option<usize>,
}

#[derive(Clone)]
struct AllStates {
    pipeline: Pipeline,
    store: Arc<dyn ArtifactStore>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    // initialize tracing
    let file_appender = tracing_appender::rolling::daily(
        if std::fs::exists("/app")? {
            "/app/data/logs".into()
        } else {
            std::env::current_dir()?
        },
        "access.log",
    );
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .json()
        .with_writer(non_blocking)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Parse command line arguments
    let args = Args::parse();
    let config = Config::from_env().context("Loading configuration")?;

    let store: Arc<dyn ArtifactStore> = if args.memory_store {
        tracing::warn!("Images are kept in memory and will be lost on restart");
        Arc::new(MemoryStore::new())
    } else {
        let bucket = config
            .bucket
            .as_deref()
            .context("Could not find IMAGE_BUCKET (or S3_BUCKET_NAME) in the environment.")?;
        Arc::new(
            StorageClient::new(bucket)
                .await
                .context("Connecting to storage")?,
        )
    };
    let pipeline = Pipeline::new(
        Arc::new(OpenAITextModel::new(
            &config.openai_api_key,
            config.openai_api_base.as_deref(),
            config.text_model.clone(),
        )),
        Arc::new(StabilityImageModel::new(
            &config.image_api_url,
            &config.image_api_key,
            config.image_model.clone(),
        )),
        store.clone(),
    )
    .with_concurrency(args.max_concurrency.unwrap_or_else(default_concurrency));

    // build our application with a route
    let app = Router::new()
        // `POST /recipe-proposals` goes to `propose_recipes`
        .route("/recipe-proposals", post(propose_recipes))
        // `GET /health` goes to `health`
        .route("/health", get(health))
        // `GET /img/*path` goes to `get_image`
        .route(&format!("/{}/*path", IMAGE_PREFIX), get(get_image))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::OPTIONS, Method::POST, Method::GET])
                .allow_headers(Any),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(AllStates { pipeline, store });

    // In development, use HTTP. In production, use HTTPS.

    if args.tls {
        rustls::crypto::ring::default_provider()
            .install_default()
            .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;
        let tls_config =
            axum_server::tls_rustls::RustlsConfig::from_pem_file(&args.cert_path, &args.key_path)
                .await
                .context("Loading TLS certificate")?;

        let addr = args.address.parse()?;
        tracing::info!("Listening on {}", addr);
        axum_server::bind_rustls(addr, tls_config)
            .serve(app.into_make_service())
            .await
            .context("Starting TLS server")?;
    } else {
        let listener = tokio::net::TcpListener::bind(&args.address).await?;
        tracing::info!("Listening on {}", args.address);
        axum::serve(listener, app).await?;
    }
    Ok(())
}

// Just reply that everything is okay
async fn health() -> StatusCode {
    StatusCode::OK
}

/// Propose up to three illustrated recipes for the ingredients on hand.
async fn propose_recipes(
    State(allstates): State<AllStates>,
    body: Bytes,
) -> WebResult<Json<RecipeCollection>> {
    let request: GenerationRequest = serde_json::from_slice(&body)
        .map_err(|err| PipelineError::InvalidRequest(err.to_string()))?;
    Ok(Json(allstates.pipeline.run(&request).await?))
}

/// Serve a generated image back out of the store.
async fn get_image(
    State(allstates): State<AllStates>,
    Path(path): Path<String>,
) -> WebResult<impl IntoResponse> {
    let image = allstates
        .store
        .download_file(&format!("{}/{}", IMAGE_PREFIX, path))
        .await
        .map_err(|err| {
            tracing::info!("Image lookup failed: {:#}", err);
            WebError::NotFound
        })?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], image))
}
