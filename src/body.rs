//! Response/request body types: a `Stream` that also implements
//! `http_body::Body` (1.0's `Frame`/`poll_frame` API, not the older 0.4
//! `poll_data`/`poll_trailers` split), built with `pin-project-lite`
//! since the `pin_project` crate was never a declared dependency here.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::stream::Stream;
use http_body::{Body as HttpBody, Frame};
use pin_project_lite::pin_project;

use crate::async_stream::AsyncStream;

/// The body type returned by the engine's method processors: either a
/// complete in-memory chunk, a lazily-produced stream (GET on a large
/// resource, a streamed multi-status document), or nothing at all.
pub struct Body {
    pub(crate) inner: BodyType,
}

pub(crate) enum BodyType {
    Bytes(Option<Bytes>),
    AsyncStream(AsyncStream<Bytes, io::Error>),
    Empty,
}

impl Body {
    pub fn empty() -> Body {
        Body { inner: BodyType::Empty }
    }
}

impl Stream for Body {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        match self.inner {
            BodyType::Bytes(ref mut strm) => Poll::Ready(strm.take().map(Ok)),
            BodyType::AsyncStream(ref mut strm) => Pin::new(strm).poll_next(cx),
            BodyType::Empty => Poll::Ready(None),
        }
    }
}

impl HttpBody for Body {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.poll_next(cx).map(|opt| opt.map(|res| res.map(Frame::data)))
    }
}

impl From<String> for Body {
    fn from(t: String) -> Body {
        Body { inner: BodyType::Bytes(Some(Bytes::from(t))) }
    }
}

impl From<&str> for Body {
    fn from(t: &str) -> Body {
        Body { inner: BodyType::Bytes(Some(Bytes::from(t.to_string()))) }
    }
}

impl From<Bytes> for Body {
    fn from(t: Bytes) -> Body {
        Body { inner: BodyType::Bytes(Some(t)) }
    }
}

impl From<AsyncStream<Bytes, io::Error>> for Body {
    fn from(s: AsyncStream<Bytes, io::Error>) -> Body {
        Body { inner: BodyType::AsyncStream(s) }
    }
}

pin_project! {
    /// Adapts any byte `Stream` into an `http_body::Body`, for callers
    /// that already have a stream (request bodies arriving from a host
    /// adapter) rather than one of this crate's own producers.
    pub(crate) struct StreamBody<B> {
        #[pin]
        body: B,
    }
}

impl<B> StreamBody<B> {
    pub fn new(body: B) -> StreamBody<B> {
        StreamBody { body }
    }
}

impl<B> HttpBody for StreamBody<B>
where
    B: Stream<Item = Result<Bytes, io::Error>>,
{
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        this.body.poll_next(cx).map(|opt| opt.map(|res| res.map(Frame::data)))
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    #[tokio::test]
    async fn bytes_body_yields_once() {
        let mut body: Body = Bytes::from_static(b"hello").into();
        let first = body.next().await.unwrap().unwrap();
        assert_eq!(first, Bytes::from_static(b"hello"));
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn empty_body_yields_nothing() {
        let mut body = Body::empty();
        assert!(body.next().await.is_none());
    }
}
