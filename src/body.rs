use crate::error::{BoxError, Error};
use crate::responder::{Message, Phase, Responder};
use bytes::{Buf, Bytes};
use http::HeaderMap;
use http::response::Parts;
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tracing::warn;

pin_project! {
    /// A response body that may be compressed.
    ///
    /// This type wraps an inner body and either runs it through a
    /// [`Responder`] or passes it through unchanged.
    #[project = CompressionBodyProj]
    #[allow(missing_docs)]
    pub enum CompressionBody<B> {
        /// Body driven through a responder.
        Compressed {
            stream: ResponseStream<B>,
        },
        /// Passthrough body without compression.
        Passthrough {
            #[pin]
            inner: B,
        },
    }
}

impl<B> CompressionBody<B> {
    /// Creates a passthrough body without compression.
    pub fn passthrough(inner: B) -> Self {
        Self::Passthrough { inner }
    }

    pub(crate) fn compressed(stream: ResponseStream<B>) -> Self {
        Self::Compressed { stream }
    }
}

/// Feeds the frames of an inner body through a [`Responder`].
///
/// Each data frame becomes a body message once the next frame shows whether
/// it was the last one. If the next frame is not ready yet, the held frame is
/// forwarded as a non-final chunk and the body is closed later by an empty
/// final chunk.
pub struct ResponseStream<B> {
    inner: Pin<Box<B>>,
    responder: Responder,
    held: Option<Bytes>,
    trailers: Option<HeaderMap>,
    forwarded: VecDeque<Message>,
    body_done: bool,
    ended: bool,
    error: Option<Error>,
    failed: bool,
}

impl<B> std::fmt::Debug for ResponseStream<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream")
            .field("responder", &self.responder)
            .field("forwarded", &self.forwarded.len())
            .field("ended", &self.ended)
            .finish_non_exhaustive()
    }
}

impl<B> ResponseStream<B>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    /// Starts a stream for a response whose head the responder already holds.
    pub(crate) fn new(inner: B, responder: Responder) -> Self {
        Self {
            inner: Box::pin(inner),
            responder,
            held: None,
            trailers: None,
            forwarded: VecDeque::new(),
            body_done: false,
            ended: false,
            error: None,
            failed: false,
        }
    }

    /// Hands the response head to the responder.
    pub(crate) fn start(&mut self, head: Parts) -> Result<(), Error> {
        let forwarded = self.responder.handle(Message::Start(head))?;
        self.forwarded.extend(forwarded);
        Ok(())
    }

    /// Makes the body fail with `error` on its first poll.
    pub(crate) fn fail(&mut self, error: Error) {
        self.error = Some(error);
    }

    /// Returns the head the responder is still holding back, if any.
    pub(crate) fn take_head(&mut self) -> Option<Parts> {
        self.responder.take_head()
    }

    /// Drives the body until the responder releases the response head.
    pub(crate) fn poll_head(&mut self, cx: &mut Context<'_>) -> Poll<Result<Parts, Error>> {
        if let Some(error) = self.error.take() {
            return Poll::Ready(Err(error));
        }

        loop {
            while let Some(message) = self.forwarded.pop_front() {
                match message {
                    Message::Start(parts) => return Poll::Ready(Ok(parts)),
                    other => {
                        self.forwarded.push_front(other);
                        return Poll::Ready(Err(Error::MissingHead));
                    }
                }
            }

            match ready!(self.poll_forward(cx)) {
                Some(Ok(())) => continue,
                Some(Err(e)) => return Poll::Ready(Err(e)),
                None => return Poll::Ready(Err(Error::MissingHead)),
            }
        }
    }

    /// Runs the next body message through the responder, queueing its output.
    fn poll_forward(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<(), Error>>> {
        let message = match ready!(self.poll_message(cx)) {
            Some(Ok(message)) => message,
            Some(Err(e)) => return Poll::Ready(Some(Err(e))),
            None => return Poll::Ready(None),
        };
        let forwarded = self.responder.handle(message)?;
        self.forwarded.extend(forwarded);
        Poll::Ready(Some(Ok(())))
    }

    /// Reads the next message from the inner body.
    ///
    /// Always yields exactly one final body message, even for an empty body.
    fn poll_message(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Message, Error>>> {
        loop {
            if self.ended || self.trailers.is_some() {
                if !self.body_done {
                    self.body_done = true;
                    let chunk = self.held.take().unwrap_or_default();
                    return Poll::Ready(Some(Ok(Message::body(chunk, false))));
                }
                if let Some(trailers) = self.trailers.take() {
                    self.ended = true;
                    return Poll::Ready(Some(Ok(Message::Trailers(trailers))));
                }
                return Poll::Ready(None);
            }

            if self.held.is_some() && self.inner.is_end_stream() {
                self.ended = true;
                continue;
            }

            let frame = match self.inner.as_mut().poll_frame(cx) {
                Poll::Ready(frame) => frame,
                // Forward what has arrived rather than wait on the next frame
                Poll::Pending => {
                    return match self.held.take() {
                        Some(chunk) => Poll::Ready(Some(Ok(Message::body(chunk, true)))),
                        None => Poll::Pending,
                    };
                }
            };

            match frame {
                None => self.ended = true,
                Some(Err(e)) => return Poll::Ready(Some(Err(Error::body(e)))),
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(mut data) => {
                        let data = data.copy_to_bytes(data.remaining());
                        if let Some(chunk) = self.held.replace(data) {
                            return Poll::Ready(Some(Ok(Message::body(chunk, true))));
                        }
                    }
                    Err(frame) => {
                        if let Ok(trailers) = frame.into_trailers() {
                            self.trailers = Some(trailers);
                        }
                    }
                },
            }
        }
    }

    fn poll_frame(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Bytes>, Error>>> {
        if let Some(error) = self.error.take() {
            self.failed = true;
            self.forwarded.clear();
            return Poll::Ready(Some(Err(error)));
        }

        loop {
            if let Some(message) = self.forwarded.pop_front() {
                match message {
                    Message::Body { chunk, .. } if chunk.is_empty() => continue,
                    Message::Body { chunk, .. } => return Poll::Ready(Some(Ok(Frame::data(chunk)))),
                    Message::Trailers(trailers) => {
                        return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
                    }
                    Message::Start(_) => {
                        warn!("dropping response head forwarded after the body started");
                        continue;
                    }
                }
            }

            if self.failed {
                return Poll::Ready(None);
            }

            match ready!(self.poll_forward(cx)) {
                Some(Ok(())) => continue,
                Some(Err(e)) => {
                    self.failed = true;
                    return Poll::Ready(Some(Err(e)));
                }
                None => return Poll::Ready(None),
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.error.is_none() && self.forwarded.is_empty() && (self.failed || self.drained())
    }

    fn size_hint(&self) -> SizeHint {
        if self.error.is_some() {
            return SizeHint::default();
        }
        match self.responder.phase() {
            // Once the responder has settled on a complete body, the queue holds it all.
            Phase::Buffered if self.drained() => SizeHint::with_exact(self.queued_len()),
            // Nothing was rewritten, so the inner hint still holds for what is left.
            Phase::Passthrough => {
                let held = self.held.as_ref().map_or(0, |c| c.len() as u64);
                let queued = self.queued_len() + held;
                let inner = self.inner.size_hint();
                let mut hint = SizeHint::new();
                hint.set_lower(inner.lower().saturating_add(queued));
                if let Some(upper) = inner.upper() {
                    hint.set_upper(upper.saturating_add(queued));
                }
                hint
            }
            _ => SizeHint::default(),
        }
    }

    fn queued_len(&self) -> u64 {
        self.forwarded
            .iter()
            .map(|m| match m {
                Message::Body { chunk, .. } => chunk.len() as u64,
                _ => 0,
            })
            .sum()
    }

    /// Whether every message of the inner body has been read and handled.
    fn drained(&self) -> bool {
        self.ended && self.trailers.is_none() && self.held.is_none() && self.body_done
    }
}

impl<B> Body for CompressionBody<B>
where
    B: Body,
    B::Data: Buf,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            CompressionBodyProj::Passthrough { inner } => {
                // Pass through frames, converting data to Bytes
                match ready!(inner.poll_frame(cx)) {
                    None => Poll::Ready(None),
                    Some(Ok(frame)) => Poll::Ready(Some(Ok(
                        frame.map_data(|mut data| data.copy_to_bytes(data.remaining()))
                    ))),
                    Some(Err(e)) => Poll::Ready(Some(Err(Error::body(e)))),
                }
            }
            CompressionBodyProj::Compressed { stream } => stream.poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            CompressionBody::Passthrough { inner } => inner.is_end_stream(),
            CompressionBody::Compressed { stream } => stream.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            CompressionBody::Passthrough { inner } => inner.size_hint(),
            CompressionBody::Compressed { stream } => stream.size_hint(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_body {
    use bytes::Bytes;
    use http::HeaderMap;
    use http_body::{Body, Frame};
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// A test body that yields predefined frames, optionally failing at the end.
    ///
    /// A `None` step makes one poll return `Pending`.
    pub(crate) struct TestBody {
        frames: VecDeque<Option<Frame<Bytes>>>,
        error: Option<&'static str>,
        stalled: bool,
    }

    impl TestBody {
        pub(crate) fn new(frames: Vec<Frame<Bytes>>) -> Self {
            Self {
                frames: frames.into_iter().map(Some).collect(),
                error: None,
                stalled: false,
            }
        }

        pub(crate) fn chunks<I, T>(chunks: I) -> Self
        where
            I: IntoIterator<Item = T>,
            T: Into<Bytes>,
        {
            Self::new(chunks.into_iter().map(|c| Frame::data(c.into())).collect())
        }

        pub(crate) fn with_trailers(mut self, trailers: HeaderMap) -> Self {
            self.frames.push_back(Some(Frame::trailers(trailers)));
            self
        }

        /// Returns `Pending` once before the next frame.
        pub(crate) fn pending(mut self) -> Self {
            self.frames.push_back(None);
            self
        }

        pub(crate) fn chunk(mut self, chunk: impl Into<Bytes>) -> Self {
            self.frames.push_back(Some(Frame::data(chunk.into())));
            self
        }

        /// Never ends once the frames run out.
        pub(crate) fn stalled(mut self) -> Self {
            self.stalled = true;
            self
        }

        pub(crate) fn failing(mut self, error: &'static str) -> Self {
            self.error = Some(error);
            self
        }
    }

    impl Body for TestBody {
        type Data = Bytes;
        type Error = std::io::Error;

        fn poll_frame(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
            match self.frames.pop_front() {
                Some(Some(frame)) => Poll::Ready(Some(Ok(frame))),
                Some(None) => Poll::Pending,
                None if self.stalled => Poll::Pending,
                None => match self.error.take() {
                    Some(error) => Poll::Ready(Some(Err(std::io::Error::other(error)))),
                    None => Poll::Ready(None),
                },
            }
        }
    }
}
