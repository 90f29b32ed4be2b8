use crate::body::{CompressionBody, ResponseStream};
use crate::error::BoxError;
use crate::responder::Responder;
use http::{Response, StatusCode};
use http_body::Body;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tracing::error;

pin_project! {
    /// Future for compression service responses.
    ///
    /// When a codec was negotiated, the future resolves only after the first
    /// body chunk has been inspected, so the returned head already carries the
    /// final `Content-Encoding`, `Content-Length` and `Vary` headers.
    pub struct ResponseFuture<F, B> {
        #[pin]
        inner: F,
        responder: Option<Responder>,
        stream: Option<ResponseStream<B>>,
    }
}

impl<F, B> ResponseFuture<F, B> {
    pub(crate) fn new(inner: F, responder: Option<Responder>) -> Self {
        Self {
            inner,
            responder,
            stream: None,
        }
    }
}

impl<F, B, E> Future for ResponseFuture<F, B>
where
    F: Future<Output = Result<Response<B>, E>>,
    B: Body,
    B::Error: Into<BoxError>,
{
    type Output = Result<Response<CompressionBody<B>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        let mut stream = match this.stream.take() {
            Some(stream) => stream,
            None => {
                let response = match ready!(this.inner.poll(cx)) {
                    Ok(response) => response,
                    Err(e) => return Poll::Ready(Err(e)),
                };

                let Some(responder) = this.responder.take() else {
                    return Poll::Ready(Ok(response.map(CompressionBody::passthrough)));
                };

                let (parts, body) = response.into_parts();
                let mut stream = ResponseStream::new(body, responder);
                if let Err(e) = stream.start(parts) {
                    stream.fail(e);
                }
                stream
            }
        };

        let parts = match stream.poll_head(cx) {
            Poll::Pending => {
                *this.stream = Some(stream);
                return Poll::Pending;
            }
            Poll::Ready(Ok(parts)) => parts,
            Poll::Ready(Err(e)) => {
                error!("aborting response: {e}");
                let parts = stream.take_head().unwrap_or_else(|| {
                    let (mut parts, ()) = Response::new(()).into_parts();
                    parts.status = StatusCode::INTERNAL_SERVER_ERROR;
                    parts
                });
                stream.fail(e);
                parts
            }
        };

        Poll::Ready(Ok(Response::from_parts(
            parts,
            CompressionBody::compressed(stream),
        )))
    }
}
