use crate::config::CompressionConfig;
use crate::future::ResponseFuture;
use crate::negotiate::resolve_codec;
use crate::responder::Responder;
use http::Request;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tracing::{debug, trace};

/// A Tower service that compresses HTTP response bodies.
#[derive(Debug, Clone)]
pub struct CompressionService<S> {
    inner: S,
    config: Arc<CompressionConfig>,
}

impl<S> CompressionService<S> {
    /// Creates a new compression service wrapping the given inner service.
    pub fn new(inner: S, config: Arc<CompressionConfig>) -> Self {
        Self { inner, config }
    }

    /// Returns a reference to the inner service.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns a mutable reference to the inner service.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consumes this service, returning the inner service.
    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Builds a responder for the request, or `None` when it must not be compressed.
    fn responder_for<B>(&self, req: &Request<B>) -> Option<Responder> {
        let path = req.uri().path();
        if self.config.is_excluded_path(path) {
            trace!(path, "path excluded from compression");
            return None;
        }

        let accept_encoding = req
            .headers()
            .get(http::header::ACCEPT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let codec = resolve_codec(accept_encoding, self.config.supported_codecs())?;
        debug!(%codec, accept_encoding, "negotiated response codec");

        let encoder = codec.encoder(self.config.compression_level());
        Some(Responder::new(encoder, Arc::clone(&self.config)))
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CompressionService<S>
where
    S: Service<Request<ReqBody>, Response = http::Response<ResBody>>,
    ResBody: http_body::Body,
    ResBody::Error: Into<crate::BoxError>,
{
    type Response = http::Response<crate::body::CompressionBody<ResBody>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future, ResBody>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let responder = self.responder_for(&req);
        let inner = self.inner.call(req);

        ResponseFuture::new(inner, responder)
    }
}
