//! Body size counting for streamed responses.
//!
//! In the tower integration the response body is produced after the inner
//! service returns, so the byte count is only final once the body has been
//! streamed out. [`CountingBody`] passes every frame through untouched and
//! reports the total exactly once: when the stream ends, or when the body is
//! dropped early.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::{Body, HttpBody};
use bytes::Bytes;
use http_body::{Frame, SizeHint};
use pin_project_lite::pin_project;

type OnComplete = Box<dyn FnOnce(u64) + Send + 'static>;

/// Fires its callback with the byte count once, at the latest on drop.
struct Completion {
    bytes: u64,
    on_complete: Option<OnComplete>,
}

impl Completion {
    fn finish(&mut self) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete(self.bytes);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.finish();
    }
}

pin_project! {
    /// Pass-through body counting the data bytes that flow through it.
    pub struct CountingBody<B> {
        #[pin]
        inner: B,
        completion: Completion,
    }
}

impl<B> CountingBody<B> {
    /// Wrap `inner`, calling `on_complete` with the total data size once the
    /// body is finished or dropped.
    pub fn new<F>(inner: B, on_complete: F) -> Self
    where
        F: FnOnce(u64) + Send + 'static,
    {
        Self {
            inner,
            completion: Completion {
                bytes: 0,
                on_complete: Some(Box::new(on_complete)),
            },
        }
    }

    /// Data bytes seen so far.
    pub fn bytes_written(&self) -> u64 {
        self.completion.bytes
    }
}

impl<B: fmt::Debug> fmt::Debug for CountingBody<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountingBody")
            .field("inner", &self.inner)
            .field("bytes_written", &self.completion.bytes)
            .finish()
    }
}

impl<B> HttpBody for CountingBody<B>
where
    B: HttpBody<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();

        match this.inner.poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.completion.bytes += data.len() as u64;
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(None) => {
                this.completion.finish();
                Poll::Ready(None)
            }
            other => other,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Wrap an axum body so `on_complete` receives its size once it is sent.
///
/// # Examples
///
/// ```rust
/// use accesslog::body_wrapper::count_body;
/// use axum::body::Body;
/// use http_body_util::BodyExt;
///
/// # #[tokio::main]
/// # async fn main() {
/// let (tx, rx) = std::sync::mpsc::channel();
/// let body = count_body(Body::from("Hello, World!"), move |size| {
///     let _ = tx.send(size);
/// });
///
/// let collected = body.collect().await.unwrap().to_bytes();
/// assert_eq!(collected, "Hello, World!");
/// assert_eq!(rx.recv().unwrap(), 13);
/// # }
/// ```
pub fn count_body<F>(body: Body, on_complete: F) -> Body
where
    F: FnOnce(u64) + Send + 'static,
{
    Body::new(CountingBody::new(body, on_complete))
}
