//! Per-response compression state machine.
//!
//! A [`Responder`] sees the messages of exactly one response, in order: one
//! [`Message::Start`], one or more [`Message::Body`] chunks, and optionally
//! trailers. For each message it returns the messages to forward downstream.
//! The head is held back until the first body chunk shows whether the
//! response should be compressed.

use crate::codec::{Codec, Encoder};
use crate::config::CompressionConfig;
use crate::error::Error;
use crate::header::{add_vary_header, media_type};
use bytes::Bytes;
use http::HeaderMap;
use http::header::{self, HeaderValue};
use http::response::Parts;
use std::sync::Arc;
use tracing::{debug, error, trace};

/// A single event in the lifecycle of a response.
#[derive(Debug)]
pub enum Message {
    /// The response head: status, headers and extensions.
    Start(Parts),
    /// A chunk of the body; `more` is false on the last chunk.
    Body {
        /// Body bytes.
        chunk: Bytes,
        /// Whether further body chunks follow.
        more: bool,
    },
    /// Trailing headers, sent after the final body chunk.
    Trailers(HeaderMap),
}

impl Message {
    /// Creates a body message.
    pub fn body(chunk: impl Into<Bytes>, more: bool) -> Self {
        Self::Body {
            chunk: chunk.into(),
            more,
        }
    }
}

/// Where a responder is in the lifecycle of its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No body chunk has been seen yet.
    Pending,
    /// The whole body arrived at once and was compressed in one shot.
    Buffered,
    /// Chunks are being compressed as they arrive.
    Streaming,
    /// The streaming body is complete and the encoder has been finished.
    Finished,
    /// The response is not compressed; everything is forwarded as is.
    Passthrough,
}

/// Compresses one response as its messages go past.
#[derive(Debug)]
pub struct Responder {
    config: Arc<CompressionConfig>,
    codec: Codec,
    encoder: Option<Encoder>,
    head: Option<Parts>,
    phase: Phase,
}

impl Responder {
    /// Creates a responder that compresses with the given fresh encoder.
    pub fn new(encoder: Encoder, config: Arc<CompressionConfig>) -> Self {
        Self {
            config,
            codec: encoder.codec(),
            encoder: Some(encoder),
            head: None,
            phase: Phase::Pending,
        }
    }

    /// Returns the current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the codec this responder compresses with.
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Takes the response head if it is still being held back.
    pub fn take_head(&mut self) -> Option<Parts> {
        self.head.take()
    }

    /// Handles the next message and returns the messages to forward.
    pub fn handle(&mut self, message: Message) -> Result<Vec<Message>, Error> {
        match message {
            Message::Start(head) => {
                if self.phase != Phase::Pending || self.head.is_some() {
                    return Err(Error::DuplicateHead);
                }
                // Headers are still mutable until the first body chunk.
                self.head = Some(head);
                Ok(Vec::new())
            }
            Message::Body { chunk, more } => match self.phase {
                Phase::Pending => self.start_body(chunk, more),
                Phase::Streaming => self.continue_body(chunk, more),
                Phase::Passthrough => Ok(vec![Message::Body { chunk, more }]),
                Phase::Buffered | Phase::Finished => {
                    // The compressed stream is already terminated
                    error!(len = chunk.len(), "body chunk after the response completed");
                    Err(Error::EncoderFinished)
                }
            },
            other => Ok(vec![other]),
        }
    }

    fn start_body(&mut self, chunk: Bytes, more: bool) -> Result<Vec<Message>, Error> {
        let mut head = self.head.take().ok_or(Error::MissingHead)?;

        let skip = self.skip_reason(&head.headers, &chunk, more);
        let mut encoder = match (skip, self.encoder.take()) {
            (None, Some(encoder)) => encoder,
            (reason, _) => {
                let reason = reason.unwrap_or("encoder unavailable");
                debug!(reason, codec = %self.codec, "response not compressed");
                self.phase = Phase::Passthrough;
                return Ok(vec![Message::Start(head), Message::Body { chunk, more }]);
            }
        };

        let headers = &mut head.headers;
        headers.insert(
            header::CONTENT_ENCODING,
            HeaderValue::from_static(self.codec.content_encoding()),
        );
        add_vary_header(headers, "Accept-Encoding");

        // Byte ranges of the identity representation no longer apply
        headers.remove(header::ACCEPT_RANGES);

        if !more {
            let compressed = encoder
                .compress(&chunk)
                .and_then(|()| encoder.finish())
                .inspect_err(|e| error!(codec = %self.codec, "compression failed: {e}"))?;
            debug!(
                codec = %self.codec,
                original = chunk.len(),
                compressed = compressed.len(),
                "compressed complete body"
            );

            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(compressed.len()));
            self.phase = Phase::Buffered;
            return Ok(vec![Message::Start(head), Message::body(compressed, false)]);
        }

        // Final length is unknown while streaming
        headers.remove(header::CONTENT_LENGTH);

        encoder
            .compress(&chunk)
            .inspect_err(|e| error!(codec = %self.codec, "compression failed: {e}"))?;
        let flushed = encoder
            .flush()
            .inspect_err(|e| error!(codec = %self.codec, "compression failed: {e}"))?;
        debug!(codec = %self.codec, "compressing streaming body");
        trace!(original = chunk.len(), compressed = flushed.len(), "compressed first chunk");

        self.encoder = Some(encoder);
        self.phase = Phase::Streaming;
        Ok(vec![Message::Start(head), Message::body(flushed, true)])
    }

    fn continue_body(&mut self, chunk: Bytes, more: bool) -> Result<Vec<Message>, Error> {
        if chunk.is_empty() && more {
            return Ok(vec![Message::Body { chunk, more }]);
        }

        let compressed = if more {
            let Some(encoder) = self.encoder.as_mut() else {
                return Err(Error::EncoderFinished);
            };
            encoder
                .compress(&chunk)
                .and_then(|()| encoder.flush())
                .inspect_err(|e| error!(codec = %self.codec, "compression failed: {e}"))?
        } else {
            let Some(mut encoder) = self.encoder.take() else {
                return Err(Error::EncoderFinished);
            };
            self.phase = Phase::Finished;
            encoder
                .compress(&chunk)
                .and_then(|()| encoder.finish())
                .inspect_err(|e| error!(codec = %self.codec, "compression failed: {e}"))?
        };

        trace!(
            original = chunk.len(),
            compressed = compressed.len(),
            more,
            "compressed chunk"
        );
        Ok(vec![Message::body(compressed, more)])
    }

    /// Returns why this response must be sent uncompressed, if it must.
    fn skip_reason(&self, headers: &HeaderMap, chunk: &Bytes, more: bool) -> Option<&'static str> {
        if headers.contains_key(header::CONTENT_ENCODING) {
            return Some("already encoded");
        }
        if headers.contains_key(header::CONTENT_RANGE) {
            return Some("range response");
        }
        if media_type(headers).is_some_and(|m| self.config.is_excluded_media_type(&m)) {
            return Some("excluded media type");
        }
        if !more && chunk.is_empty() {
            return Some("empty body");
        }
        if !more && chunk.len() < self.config.minimum_size() {
            return Some("below minimum size");
        }
        None
    }
}
