//! Access recording around a synchronous handler.
//!
//! [`AccessRecorder`] times a [`Handler`], observes what it writes, classifies
//! the outcome and pushes two metric observations and one access record to
//! its sinks. [`AccessRecorder::wrap`] turns it into a handler of its own so it
//! can sit anywhere in a handler chain.

use std::time::{Duration, Instant};

use axum::http::{Request, StatusCode};
use bytes::Bytes;
use tracing::debug;

use crate::{
    context::{ContextError, ExecutionContext},
    ellipsize::ellipsize,
    logger::{AccessLogger, NopLogger},
    metrics::{MetricsRecorder, NopMetrics},
    types::{tags, AccessRecord, Outcome},
    writer::{ResponseObserver, ResponseWriter},
    AccessLogConfig,
};

/// Name of the timing observation.
pub const REQUEST_TIME: &str = "request_time";
/// Name of the response size histogram.
pub const REQUEST_SIZE: &str = "request_size";

/// A request handler that answers by writing to a [`ResponseWriter`].
pub trait Handler: Send + Sync {
    fn serve(
        &self,
        ctx: &dyn ExecutionContext,
        request: &Request<Bytes>,
        writer: &mut dyn ResponseWriter,
    );
}

impl<H: Handler + ?Sized> Handler for Box<H> {
    fn serve(
        &self,
        ctx: &dyn ExecutionContext,
        request: &Request<Bytes>,
        writer: &mut dyn ResponseWriter,
    ) {
        (**self).serve(ctx, request, writer)
    }
}

impl<H: Handler + ?Sized> Handler for std::sync::Arc<H> {
    fn serve(
        &self,
        ctx: &dyn ExecutionContext,
        request: &Request<Bytes>,
        writer: &mut dyn ResponseWriter,
    ) {
        (**self).serve(ctx, request, writer)
    }
}

/// Handler backed by a closure, see [`handler_fn`].
#[derive(Clone, Copy)]
pub struct HandlerFn<F> {
    f: F,
}

/// Build a [`Handler`] from a closure.
///
/// ```rust
/// use accesslog::{handler_fn, ResponseWriter};
/// use axum::http::StatusCode;
///
/// let hello = handler_fn(|_ctx, _req, w| {
///     w.write_status(StatusCode::OK);
///     let _ = w.write(b"hello");
/// });
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: Fn(&dyn ExecutionContext, &Request<Bytes>, &mut dyn ResponseWriter) + Send + Sync,
{
    HandlerFn { f }
}

impl<F> Handler for HandlerFn<F>
where
    F: Fn(&dyn ExecutionContext, &Request<Bytes>, &mut dyn ResponseWriter) + Send + Sync,
{
    fn serve(
        &self,
        ctx: &dyn ExecutionContext,
        request: &Request<Bytes>,
        writer: &mut dyn ResponseWriter,
    ) {
        (self.f)(ctx, request, writer)
    }
}

/// Outcome of a request from its context state and final status code.
///
/// A context error always wins over the status code.
pub fn classify<C: ExecutionContext + ?Sized>(ctx: &C, status_code: u16) -> Outcome {
    match ctx.err() {
        Some(ContextError::DeadlineExceeded) => Outcome::Timeout,
        Some(ContextError::Canceled) => Outcome::Canceled,
        None if (200..300).contains(&status_code) => Outcome::Ok,
        None => Outcome::Error,
    }
}

/// Measures requests and emits their metrics and access records.
///
/// # Examples
///
/// ```rust
/// use accesslog::{
///     handler_fn, AccessLogConfig, AccessRecorder, NopMetrics, RequestContext,
///     ResponseRecorder, ResponseWriter, TracingLogger,
/// };
/// use axum::http::{Request, StatusCode};
/// use bytes::Bytes;
///
/// let recorder = AccessRecorder::new(AccessLogConfig::default(), TracingLogger, NopMetrics);
/// let request = Request::get("/path").body(Bytes::new()).unwrap();
/// let mut response = ResponseRecorder::new();
///
/// recorder.observe(
///     &RequestContext::background(),
///     &request,
///     &mut response,
///     &handler_fn(|_ctx, _req, w| {
///         w.write_status(StatusCode::ACCEPTED);
///         let _ = w.write(b"123");
///     }),
/// );
/// assert_eq!(response.status(), StatusCode::ACCEPTED);
/// ```
#[derive(Debug, Clone, Default)]
pub struct AccessRecorder<L = NopLogger, M = NopMetrics> {
    config: AccessLogConfig,
    logger: L,
    metrics: M,
}

impl<L: AccessLogger, M: MetricsRecorder> AccessRecorder<L, M> {
    pub fn new(config: AccessLogConfig, logger: L, metrics: M) -> Self {
        Self {
            config,
            logger,
            metrics,
        }
    }

    pub fn config(&self) -> &AccessLogConfig {
        &self.config
    }

    /// Run `inner` with an observing writer, then record the request.
    ///
    /// A panic in `inner` unwinds through here untouched and nothing is
    /// recorded.
    pub fn observe<H: Handler + ?Sized>(
        &self,
        ctx: &dyn ExecutionContext,
        request: &Request<Bytes>,
        writer: &mut dyn ResponseWriter,
        inner: &H,
    ) {
        let start = Instant::now();
        let mut observer = ResponseObserver::new(writer);

        inner.serve(ctx, request, &mut observer);

        let elapsed = start.elapsed();
        let status = observer.status().unwrap_or(StatusCode::OK);
        self.record(
            ctx,
            request.method().as_str(),
            &request.uri().to_string(),
            status.as_u16(),
            observer.bytes_written(),
            elapsed,
        );
    }

    /// Classify a finished request and push its observations and record.
    ///
    /// Metrics are emitted before the access record.
    pub fn record<C: ExecutionContext + ?Sized>(
        &self,
        ctx: &C,
        method: &str,
        uri: &str,
        status_code: u16,
        size: u64,
        elapsed: Duration,
    ) -> AccessRecord {
        let outcome = classify(ctx, status_code);
        let tags = tags(outcome, status_code);

        self.metrics.timing(REQUEST_TIME, elapsed, &tags);
        self.metrics.histogram(REQUEST_SIZE, size as f64, &tags);

        let record = AccessRecord {
            method: method.to_owned(),
            uri: uri.to_owned(),
            kind: AccessRecord::KIND.to_owned(),
            status: outcome,
            status_code,
            duration: elapsed.as_secs_f64(),
            size,
            message: format!(
                "{} {} {:03}",
                method,
                ellipsize(uri, self.config.message_uri_max_len),
                status_code
            ),
        };
        debug!(outcome = %outcome, status_code, size, "Recording access");
        self.logger.log(&record);
        record
    }

    /// Wrap `inner` so every call through the result is recorded.
    pub fn wrap<H: Handler>(self, inner: H) -> AccessHandler<H, L, M> {
        AccessHandler {
            recorder: self,
            inner,
        }
    }
}

/// A handler recorded by an [`AccessRecorder`], built by [`AccessRecorder::wrap`].
#[derive(Debug, Clone)]
pub struct AccessHandler<H, L = NopLogger, M = NopMetrics> {
    recorder: AccessRecorder<L, M>,
    inner: H,
}

impl<H: Handler, L: AccessLogger, M: MetricsRecorder> Handler for AccessHandler<H, L, M> {
    fn serve(
        &self,
        ctx: &dyn ExecutionContext,
        request: &Request<Bytes>,
        writer: &mut dyn ResponseWriter,
    ) {
        self.recorder.observe(ctx, request, writer, &self.inner)
    }
}
