//! Response writers and the observing decorator.
//!
//! [`ResponseWriter`] is the write contract handlers speak: set a status,
//! write header fields, write body bytes. [`ResponseObserver`] wraps any writer
//! and records the status and body size as they pass through, without touching
//! what reaches the delegate.

use std::io;

use axum::{
    body::Body,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use bytes::{Bytes, BytesMut};

/// Write side of an HTTP response.
pub trait ResponseWriter {
    /// Header fields that will be sent with the response.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Set the response status.
    fn write_status(&mut self, status: StatusCode);

    /// Write body bytes, returning how many were accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

impl<W: ResponseWriter + ?Sized> ResponseWriter for &mut W {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        (**self).headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) {
        (**self).write_status(status)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }
}

impl<W: ResponseWriter + ?Sized> ResponseWriter for Box<W> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        (**self).headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) {
        (**self).write_status(status)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }
}

/// Decorator recording the status and body size written through it.
///
/// The first explicit status wins. A body write without a prior status
/// records `200 OK`, the status an HTTP server sends in that case. Every call
/// is forwarded unchanged to the delegate.
///
/// # Examples
///
/// ```rust
/// use accesslog::{ResponseObserver, ResponseRecorder, ResponseWriter};
///
/// let mut recorder = ResponseRecorder::new();
/// let mut observer = ResponseObserver::new(&mut recorder);
/// observer.write(b"abc").unwrap();
/// observer.write(b"de").unwrap();
///
/// assert_eq!(observer.bytes_written(), 5);
/// assert_eq!(observer.status().map(|s| s.as_u16()), Some(200));
/// ```
#[derive(Debug)]
pub struct ResponseObserver<W> {
    inner: W,
    status: Option<StatusCode>,
    bytes_written: u64,
}

impl<W: ResponseWriter> ResponseObserver<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            status: None,
            bytes_written: 0,
        }
    }

    /// Status recorded so far, `None` if nothing has been written yet.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Total body bytes accepted by the delegate.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Give back the delegate writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: ResponseWriter> ResponseWriter for ResponseObserver<W> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
        self.inner.write_status(status);
    }

    // An empty write still commits the implicit 200.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        let n = self.inner.write(buf)?;
        self.bytes_written += n as u64;
        Ok(n)
    }
}

/// In-memory [`ResponseWriter`] that can be turned into an axum [`Response`].
///
/// Like a real connection, the status is committed by the first
/// `write_status` or `write` call; later status changes are ignored.
#[derive(Debug, Default)]
pub struct ResponseRecorder {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed status, `200 OK` if none was written.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Freeze the recorded status, headers and body into a response.
    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(Bytes::from(self.body)));
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.headers;
        response
    }
}

impl ResponseWriter for ResponseRecorder {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::CONTENT_TYPE;
    use http_body_util::BodyExt;

    /// Delegate that records every call in order
    #[derive(Default)]
    struct CallLog {
        headers: HeaderMap,
        calls: Vec<String>,
    }

    impl ResponseWriter for CallLog {
        fn headers_mut(&mut self) -> &mut HeaderMap {
            &mut self.headers
        }

        fn write_status(&mut self, status: StatusCode) {
            self.calls.push(format!("status {}", status.as_u16()));
        }

        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.calls
                .push(format!("write {}", String::from_utf8_lossy(buf)));
            Ok(buf.len())
        }
    }

    /// Delegate that only accepts part of each write
    struct ShortWriter {
        headers: HeaderMap,
    }

    impl ResponseWriter for ShortWriter {
        fn headers_mut(&mut self) -> &mut HeaderMap {
            &mut self.headers
        }

        fn write_status(&mut self, _status: StatusCode) {}

        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len().min(2))
        }
    }

    #[test]
    fn test_bytes_accumulate_across_writes() {
        let mut recorder = ResponseRecorder::new();
        let mut observer = ResponseObserver::new(&mut recorder);
        assert_eq!(observer.write(b"123").unwrap(), 3);
        assert_eq!(observer.write(b"45").unwrap(), 2);
        assert_eq!(observer.bytes_written(), 5);
        assert_eq!(recorder.body(), b"12345");
    }

    #[test]
    fn test_status_unset_without_writes() {
        let mut recorder = ResponseRecorder::new();
        let observer = ResponseObserver::new(&mut recorder);
        assert_eq!(observer.status(), None);
        assert_eq!(observer.bytes_written(), 0);
    }

    #[test]
    fn test_first_explicit_status_wins() {
        let mut recorder = ResponseRecorder::new();
        let mut observer = ResponseObserver::new(&mut recorder);
        observer.write_status(StatusCode::ACCEPTED);
        observer.write_status(StatusCode::INTERNAL_SERVER_ERROR);
        observer.write(b"x").unwrap();
        assert_eq!(observer.status(), Some(StatusCode::ACCEPTED));
    }

    #[test]
    fn test_write_implies_ok() {
        let mut recorder = ResponseRecorder::new();
        let mut observer = ResponseObserver::new(&mut recorder);
        observer.write(b"x").unwrap();
        observer.write_status(StatusCode::NOT_FOUND);
        assert_eq!(observer.status(), Some(StatusCode::OK));
        assert_eq!(recorder.status(), StatusCode::OK);
    }

    #[test]
    fn test_empty_write_commits_ok() {
        let mut recorder = ResponseRecorder::new();
        let mut observer = ResponseObserver::new(&mut recorder);
        assert_eq!(observer.write(b"").unwrap(), 0);
        assert_eq!(observer.status(), Some(StatusCode::OK));
        assert_eq!(observer.bytes_written(), 0);
    }

    #[test]
    fn test_calls_forwarded_in_order() {
        let mut observer = ResponseObserver::new(CallLog::default());
        observer
            .headers_mut()
            .insert(CONTENT_TYPE, "text/plain".parse().unwrap());
        observer.write_status(StatusCode::CREATED);
        observer.write_status(StatusCode::GONE);
        observer.write(b"ab").unwrap();
        observer.write(b"c").unwrap();

        let delegate = observer.into_inner();
        assert_eq!(
            delegate.calls,
            vec!["status 201", "status 410", "write ab", "write c"]
        );
        assert_eq!(delegate.headers[CONTENT_TYPE], "text/plain");
    }

    #[test]
    fn test_counts_accepted_bytes() {
        let mut observer = ResponseObserver::new(ShortWriter {
            headers: HeaderMap::new(),
        });
        assert_eq!(observer.write(b"hello").unwrap(), 2);
        assert_eq!(observer.bytes_written(), 2);
    }

    #[tokio::test]
    async fn test_recorder_into_response() {
        let mut recorder = ResponseRecorder::new();
        recorder
            .headers_mut()
            .insert(CONTENT_TYPE, "text/plain".parse().unwrap());
        recorder.write_status(StatusCode::ACCEPTED);
        recorder.write(b"123").unwrap();

        let response = recorder.into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, "123");
    }
}
