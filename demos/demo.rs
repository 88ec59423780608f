use accesslog::{
    AccessLogConfig, AccessLogLayer, AccessLogger, AccessRecord, ExecutionContext, MetricsRecorder,
    Outcome, RequestContext, TracingLogger,
};
use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Router,
};
use bytes::Bytes;
use serde::Serialize;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{net::TcpListener, time::sleep};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

/// Logger that forwards to tracing and keeps the last records for `/stats`
#[derive(Debug, Clone, Default)]
struct DemoLogger {
    recent: Arc<Mutex<Vec<AccessRecord>>>,
}

impl AccessLogger for DemoLogger {
    fn log(&self, record: &AccessRecord) {
        TracingLogger.log(record);
        let mut recent = self.recent.lock().unwrap();
        recent.push(record.clone());
        if recent.len() > 20 {
            recent.remove(0);
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
struct MetricSummary {
    count: u64,
    total: f64,
}

/// In-memory metrics keyed by name and tags
#[derive(Debug, Clone, Default)]
struct DemoMetrics {
    summaries: Arc<Mutex<HashMap<String, MetricSummary>>>,
}

impl DemoMetrics {
    fn observe(&self, name: &str, value: f64, tags: &[String]) {
        let key = format!("{name}{{{}}}", tags.join(","));
        let mut summaries = self.summaries.lock().unwrap();
        let summary = summaries.entry(key).or_default();
        summary.count += 1;
        summary.total += value;
    }
}

impl MetricsRecorder for DemoMetrics {
    fn timing(&self, name: &str, value: Duration, tags: &[String]) {
        self.observe(name, value.as_secs_f64(), tags);
    }

    fn histogram(&self, name: &str, value: f64, tags: &[String]) {
        self.observe(name, value, tags);
    }
}

// Demo handlers
async fn hello_handler() -> impl IntoResponse {
    sleep(Duration::from_millis(100)).await; // Simulate some work
    "Hello, World!"
}

async fn echo_handler(body: Bytes) -> impl IntoResponse {
    format!("Echo: {}", String::from_utf8_lossy(&body))
}

async fn streaming_handler() -> impl IntoResponse {
    use futures::stream;
    use tokio::time::interval;

    let stream = stream::unfold(0u32, |count| async move {
        if count >= 5 {
            None
        } else {
            let mut interval = interval(Duration::from_millis(200));
            interval.tick().await;
            Some((
                Ok::<_, std::convert::Infallible>(Bytes::from(format!("chunk-{count}\n"))),
                count + 1,
            ))
        }
    });

    Response::builder()
        .header("content-type", "text/plain")
        .body(Body::from_stream(stream))
        .unwrap()
}

async fn slow_handler(Extension(ctx): Extension<RequestContext>) -> impl IntoResponse {
    // Runs past the configured deadline; the access record reports a timeout
    sleep(Duration::from_secs(3)).await;
    match ctx.err() {
        Some(e) => format!("finished anyway: {e}"),
        None => "finished".to_string(),
    }
}

async fn missing_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "nothing here")
}

async fn stats_handler(logger: DemoLogger, metrics: DemoMetrics) -> impl IntoResponse {
    let recent = logger.recent.lock().unwrap().clone();
    let summaries = metrics.summaries.lock().unwrap().clone();
    axum::Json(serde_json::json!({
        "ok_requests": recent.iter().filter(|r| r.status == Outcome::Ok).count(),
        "recent": recent,
        "metrics": summaries,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();

    info!("Starting access log demo server");

    let logger = DemoLogger::default();
    let metrics = DemoMetrics::default();
    let (stats_logger, stats_metrics) = (logger.clone(), metrics.clone());

    let config = AccessLogConfig {
        message_uri_max_len: 60,
        timeout: Some(Duration::from_secs(2)),
    };

    let app = Router::new()
        .route("/hello", get(hello_handler))
        .route("/echo", post(echo_handler))
        .route("/streaming", get(streaming_handler))
        .route("/slow", get(slow_handler))
        .route("/missing", get(missing_handler))
        .route(
            "/stats",
            get(move || stats_handler(stats_logger.clone(), stats_metrics.clone())),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(AccessLogLayer::new(config, logger, metrics))
                .into_inner(),
        );

    info!("Demo server endpoints:");
    info!("  GET  /hello      - Simple greeting");
    info!("  POST /echo       - Echo request body");
    info!("  GET  /streaming  - Streaming response");
    info!("  GET  /slow       - Outlives its 2s deadline");
    info!("  GET  /missing    - 404 response");
    info!("  GET  /stats      - Recent access records and metric totals");

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    info!("Demo server listening on http://localhost:3000");

    axum::serve(listener, app).await?;

    Ok(())
}
