use axum::{Extension, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use podcast_studio::pipeline::StageExecutor;
use podcast_studio::queue::scheduler::PipelineQueue;
use podcast_studio::queue::store::QueueCheckpointer;
use podcast_studio::queue::JobStatus;
use podcast_studio::{assistant_client, db, handlers, image_client, middleware, renderer_client,
    voice_client, AppState};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize production-grade logging
    init_logging().expect("Failed to initialize logging");

    // Ensure output directories exist before any stage writes into them
    for dir in ["outputs", "outputs/audio", "outputs/images"] {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::warn!("Failed to create {} directory: {}", dir, e);
        }
    }

    // Assistant client (episode structure + segment drafting)
    let assistant_key = match std::env::var("OPENAI_API_KEY").ok() {
        Some(key) if !key.is_empty() => {
            tracing::info!("Initializing assistant client (structure + drafting)...");
            key
        }
        _ => {
            tracing::warn!("OPENAI_API_KEY not found. Structure and draft stages will fail until it is set.");
            String::new()
        }
    };
    let mut assistant = assistant_client::AssistantClient::new(assistant_key);
    if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
        assistant = assistant.with_base_url(base_url);
    }
    let assistant = Arc::new(assistant);

    // Eleven Labs voice client
    let voice_key = match std::env::var("ELEVEN_LABS_API_KEY").ok() {
        Some(key) if !key.is_empty() => {
            tracing::info!("Initializing Eleven Labs voice client...");
            key
        }
        _ => {
            tracing::warn!("ELEVEN_LABS_API_KEY not found. Voice synthesis will fail until it is set.");
            String::new()
        }
    };
    let voice = Arc::new(voice_client::VoiceClient::new(voice_key));

    // Image generation client
    let image_key = match std::env::var("IMAGE_API_KEY").ok() {
        Some(key) if !key.is_empty() => {
            tracing::info!("Initializing image generation client...");
            key
        }
        _ => {
            tracing::warn!("IMAGE_API_KEY not found. Image generation will fail until it is set.");
            String::new()
        }
    };
    let image = Arc::new(image_client::ImageClient::new(image_key));

    // Render service client
    let renderer_url = std::env::var("RENDERER_BASE_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:8085".to_string());
    let renderer_key = std::env::var("RENDERER_API_KEY").unwrap_or_default();
    tracing::info!("Render service endpoint: {}", renderer_url);
    let renderer = Arc::new(renderer_client::RendererClient::new(
        renderer_key,
        renderer_url,
    ));

    // Durable queue store - optional; without it the queue is memory-only
    let checkpointer = match std::env::var("DATABASE_URL").ok() {
        Some(url) if !url.is_empty() => match db::create_pool(&url).await {
            Ok(pool) => {
                let checkpointer = QueueCheckpointer::new(pool);
                match checkpointer.setup().await {
                    Ok(_) => {
                        tracing::info!("✅ Queue persistence enabled (PostgreSQL)");
                        Some(checkpointer)
                    }
                    Err(e) => {
                        tracing::error!("❌ Failed to setup queue persistence: {}", e);
                        None
                    }
                }
            }
            Err(e) => {
                tracing::error!("❌ Failed to connect to database: {}", e);
                None
            }
        },
        _ => {
            tracing::warn!("DATABASE_URL not found. Queue state will not survive restarts.");
            None
        }
    };

    // Build the queue, reload whatever was persisted, start dispatching
    let executor = StageExecutor::new(assistant.clone(), assistant, voice, image, renderer);
    let queue = PipelineQueue::new(executor, checkpointer);
    if let Err(e) = queue.restore().await {
        tracing::error!("❌ Failed to restore queue snapshots: {}", e);
    }
    queue.start();
    tracing::info!("🚦 Generation queue ready");

    let shared_state = Arc::new(AppState { queue });

    // Build our application with all routes and shared state
    let app = Router::new()
        .merge(handlers::queue::queue_routes())
        .merge(handlers::videos::video_routes())
        .route("/api/status", axum::routing::get(api_status))
        .layer(axum::middleware::from_fn(
            middleware::logging::request_logging_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(Extension(shared_state.clone()));

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000")
        .await
        .expect("Failed to bind 0.0.0.0:3000");
    tracing::info!(
        "listening on {}",
        listener.local_addr().expect("listener has no local addr")
    );
    axum::serve(listener, app)
        .await
        .expect("server error");
}

/// GET /api/status - queue counters for a quick health look
async fn api_status(
    Extension(state): Extension<Arc<AppState>>,
) -> axum::response::Json<serde_json::Value> {
    let jobs = state.queue.list().await;
    let count = |status: JobStatus| jobs.iter().filter(|j| j.status == status).count();
    axum::response::Json(serde_json::json!({
        "service": "podcast_studio",
        "version": env!("CARGO_PKG_VERSION"),
        "jobs": {
            "total": jobs.len(),
            "waiting": count(JobStatus::Waiting),
            "processing": count(JobStatus::Processing),
            "awaiting_review": count(JobStatus::AwaitingReview),
            "completed": count(JobStatus::Completed),
            "error": count(JobStatus::Error),
            "cancelled": count(JobStatus::Cancelled),
        },
        "video_items": state.queue.list_video_items().await.len(),
    }))
}

// Production-grade logging configuration
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, fmt, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,podcast_studio=trace,sqlx=info,reqwest=info,hyper=info,tower=info".to_string()
        } else {
            "info,podcast_studio=info,sqlx=warn,reqwest=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    // JSON logging for production, human-readable for development
    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("🎙️ PodcastStudio starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Build mode: {}",
        if cfg!(debug_assertions) { "development" } else { "production" }
    );
    tracing::info!("Log level: {}", log_level);

    Ok(())
}
