//! # accesslog
//!
//! Access-logging middleware for axum and tower. Every request that passes
//! through the layer produces one structured access record and two metric
//! observations, without touching the request or response.
//!
//! ## Features
//!
//! - **Transparent**: status, headers and body frames pass through unchanged
//! - **Outcome classification**: `ok`, `error`, `timeout` or `canceled`, from the
//!   request context and the final status code
//! - **Pluggable sinks**: any [`AccessLogger`] and [`MetricsRecorder`], injected
//!   when the layer is built
//! - **Handler chains**: [`AccessRecorder::wrap`] records synchronous
//!   [`Handler`]s written against a [`ResponseWriter`]
//!
//! Each request emits, in order:
//!
//! 1. a `request_time` timing tagged `status:<outcome>` and `status_code:<code>`
//! 2. a `request_size` histogram of the body size, with the same tags
//! 3. an [`AccessRecord`] with `method`, `uri`, `type`, `status`, `status_code`,
//!    `duration`, `size` and a `message` such as `GET /path 202`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use accesslog::{AccessLogConfig, AccessLogLayer, FacadeMetrics, TracingLogger};
//! use tower::ServiceBuilder;
//!
//! async fn hello() -> &'static str {
//!     "Hello, World!"
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     tracing_subscriber::fmt().init();
//!
//!     let layer = AccessLogLayer::new(AccessLogConfig::default(), TracingLogger, FacadeMetrics::new());
//!
//!     let app = Router::new()
//!         .route("/hello", get(hello))
//!         .layer(ServiceBuilder::new().layer(layer));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```
//!
//! ## Custom Sinks
//!
//! Implement [`AccessLogger`] to ship records somewhere else:
//!
//! ```rust
//! use accesslog::{AccessLogger, AccessRecord};
//!
//! #[derive(Debug)]
//! struct StdoutLogger;
//!
//! impl AccessLogger for StdoutLogger {
//!     fn log(&self, record: &AccessRecord) {
//!         println!("{} ({}s)", record.message, record.duration);
//!     }
//! }
//! ```

use axum::{extract::Request, response::Response};
use serde::{Deserialize, Deserializer};
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::{Duration, Instant},
};
use tower::{Layer, Service};
use tracing::{debug, instrument};

pub mod body_wrapper;
use body_wrapper::count_body;

pub mod context;
pub use context::{ContextError, ExecutionContext, RequestContext};

pub mod ellipsize;
pub use ellipsize::ellipsize;

pub mod logger;
pub use logger::{AccessLogger, JsonLogger, NopLogger, TracingLogger};

pub mod metrics;
pub use self::metrics::{FacadeMetrics, MetricsRecorder, NopMetrics};

pub mod recorder;
pub use recorder::{
    classify, handler_fn, AccessHandler, AccessRecorder, Handler, HandlerFn, REQUEST_SIZE,
    REQUEST_TIME,
};

pub mod types;
pub use types::{AccessRecord, Outcome};

pub mod writer;
pub use writer::{ResponseObserver, ResponseRecorder, ResponseWriter};

/// Configuration for the access-logging middleware.
///
/// # Examples
///
/// ```rust
/// use accesslog::AccessLogConfig;
/// use std::time::Duration;
///
/// // Default configuration
/// let config = AccessLogConfig::default();
/// assert_eq!(config.message_uri_max_len, 100);
///
/// // Custom configuration
/// let config = AccessLogConfig {
///     message_uri_max_len: 60,
///     timeout: Some(Duration::from_secs(30)),
/// };
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AccessLogConfig {
    /// Maximum length of the URI shown in the summary message
    pub message_uri_max_len: usize,
    /// Deadline for requests that arrive without a [`RequestContext`], in seconds when deserialized.
    /// A timeout too large to add to the request start time means no deadline.
    #[serde(deserialize_with = "deserialize_timeout")]
    pub timeout: Option<Duration>,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            message_uri_max_len: 100,
            timeout: None,
        }
    }
}

fn deserialize_timeout<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer)?
        .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
        .transpose()
}

/// Tower layer for the access-logging middleware.
///
/// The layer owns the sinks. Every service it produces shares them, so the
/// layer can be cloned and applied to several routers.
///
/// # Examples
///
/// ```rust,no_run
/// use accesslog::{AccessLogConfig, AccessLogLayer, NopMetrics, TracingLogger};
/// use axum::{routing::get, Router};
/// use tower::ServiceBuilder;
///
/// # async fn hello() -> &'static str { "Hello" }
/// # #[tokio::main]
/// # async fn main() {
/// let layer = AccessLogLayer::new(AccessLogConfig::default(), TracingLogger, NopMetrics);
///
/// let app = Router::new()
///     .route("/hello", get(hello))
///     .layer(ServiceBuilder::new().layer(layer));
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
/// axum::serve(listener, app).await.unwrap();
/// # }
/// ```
pub struct AccessLogLayer<L = TracingLogger, M = NopMetrics> {
    recorder: Arc<AccessRecorder<L, M>>,
}

impl<L: AccessLogger, M: MetricsRecorder> AccessLogLayer<L, M> {
    /// Create a layer recording into `logger` and `metrics`.
    pub fn new(config: AccessLogConfig, logger: L, metrics: M) -> Self {
        Self::from_recorder(AccessRecorder::new(config, logger, metrics))
    }

    /// Create a layer around an already configured [`AccessRecorder`].
    pub fn from_recorder(recorder: AccessRecorder<L, M>) -> Self {
        Self {
            recorder: Arc::new(recorder),
        }
    }
}

impl<L, M> Clone for AccessLogLayer<L, M> {
    fn clone(&self) -> Self {
        Self {
            recorder: self.recorder.clone(),
        }
    }
}

impl<S, L, M> Layer<S> for AccessLogLayer<L, M> {
    type Service = AccessLogService<S, L, M>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService {
            inner,
            recorder: self.recorder.clone(),
        }
    }
}

/// Tower service implementation for the access-logging middleware.
///
/// The request is recorded once its response body has been fully sent, or
/// dropped, so `duration` and `size` cover streamed bodies too. An error from
/// the inner service is returned untouched and nothing is recorded for it.
///
/// Users typically don't interact with this type directly - it's created by [`AccessLogLayer`].
pub struct AccessLogService<S, L = TracingLogger, M = NopMetrics> {
    inner: S,
    recorder: Arc<AccessRecorder<L, M>>,
}

impl<S: Clone, L, M> Clone for AccessLogService<S, L, M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            recorder: self.recorder.clone(),
        }
    }
}

impl<S, L, M> Service<Request> for AccessLogService<S, L, M>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    L: AccessLogger,
    M: MetricsRecorder,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    #[instrument(skip_all)]
    fn call(&mut self, mut request: Request) -> Self::Future {
        let start = Instant::now();
        let method = request.method().clone();
        let uri = request.uri().clone();

        debug!(method = %method, uri = %uri, "Observing request");

        // Reuse the caller's context, or install one for downstream handlers
        let ctx = match request.extensions().get::<RequestContext>() {
            Some(ctx) => ctx.clone(),
            None => {
                let deadline = self
                    .recorder
                    .config()
                    .timeout
                    .and_then(|timeout| start.checked_add(timeout));
                let ctx = match deadline {
                    Some(deadline) => RequestContext::with_deadline(deadline),
                    None => RequestContext::background(),
                };
                request.extensions_mut().insert(ctx.clone());
                ctx
            }
        };

        let recorder = self.recorder.clone();
        let future = self.inner.call(request);

        Box::pin(async move {
            let response = match future.await {
                Ok(response) => response,
                Err(e) => {
                    debug!(method = %method, uri = %uri, "Inner service failed, not recording");
                    return Err(e);
                }
            };

            let status_code = response.status().as_u16();
            let (parts, body) = response.into_parts();
            let body = count_body(body, move |size| {
                recorder.record(
                    &ctx,
                    method.as_str(),
                    &uri.to_string(),
                    status_code,
                    size,
                    start.elapsed(),
                );
            });

            Ok(Response::from_parts(parts, body))
        })
    }
}
