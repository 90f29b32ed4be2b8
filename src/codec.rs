#[cfg(feature = "brotli")]
use compression_codecs::brotli::{BrotliEncoder, params::EncoderParams as BrotliParams};
#[cfg(feature = "deflate")]
use compression_codecs::deflate::DeflateEncoder;
#[cfg(feature = "gzip")]
use compression_codecs::gzip::GzipEncoder;
#[cfg(feature = "zstd")]
use compression_codecs::zstd::ZstdEncoder;

use bytes::{Bytes, BytesMut};
use compression_codecs::EncodeV2;
use compression_core::Level;
use compression_core::util::{PartialBuffer, WriteBuffer};
use std::fmt;
use std::io;

const OUTPUT_BUFFER_SIZE: usize = 8 * 1024; // 8KB output buffer

/// Supported compression codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// Gzip compression.
    #[cfg(feature = "gzip")]
    Gzip,
    /// Raw deflate compression.
    #[cfg(feature = "deflate")]
    Deflate,
    /// Brotli compression.
    #[cfg(feature = "brotli")]
    Brotli,
    /// Zstd compression.
    #[cfg(feature = "zstd")]
    Zstd,
}

impl Codec {
    /// Returns the default server preference order for the enabled codecs.
    pub fn default_order() -> Vec<Codec> {
        let mut codecs = Vec::with_capacity(4);
        #[cfg(feature = "gzip")]
        codecs.push(Codec::Gzip);
        #[cfg(feature = "deflate")]
        codecs.push(Codec::Deflate);
        #[cfg(feature = "brotli")]
        codecs.push(Codec::Brotli);
        #[cfg(feature = "zstd")]
        codecs.push(Codec::Zstd);
        codecs
    }

    /// Returns the Content-Encoding header value for this codec.
    pub fn content_encoding(&self) -> &'static str {
        match *self {
            #[cfg(feature = "gzip")]
            Codec::Gzip => "gzip",
            #[cfg(feature = "deflate")]
            Codec::Deflate => "deflate",
            #[cfg(feature = "brotli")]
            Codec::Brotli => "br",
            #[cfg(feature = "zstd")]
            Codec::Zstd => "zstd",
        }
    }

    /// Looks up a codec by its content-coding name, ignoring ASCII case.
    ///
    /// `x-gzip` is accepted as an alias of `gzip` and `brotli` as an alias
    /// of `br`.
    pub fn from_name(name: &str) -> Option<Codec> {
        let name = name.trim();
        Codec::default_order()
            .into_iter()
            .find(|codec| {
                name.eq_ignore_ascii_case(codec.content_encoding()) || codec.has_alias(name)
            })
    }

    fn has_alias(&self, name: &str) -> bool {
        match *self {
            #[cfg(feature = "gzip")]
            Codec::Gzip => name.eq_ignore_ascii_case("x-gzip"),
            #[cfg(feature = "brotli")]
            Codec::Brotli => name.eq_ignore_ascii_case("brotli"),
            #[allow(unreachable_patterns)]
            _ => false,
        }
    }

    /// Creates a fresh stream encoder for this codec.
    pub fn encoder(&self, level: Level) -> Encoder {
        let inner: Box<dyn EncodeV2 + Send> = match *self {
            #[cfg(feature = "gzip")]
            Codec::Gzip => Box::new(GzipEncoder::new(level.into())),
            #[cfg(feature = "deflate")]
            Codec::Deflate => Box::new(DeflateEncoder::new(level.into())),
            #[cfg(feature = "brotli")]
            Codec::Brotli => Box::new(BrotliEncoder::new(BrotliParams::default().quality(level))),
            #[cfg(feature = "zstd")]
            Codec::Zstd => Box::new(ZstdEncoder::new(zstd_level(level))),
        };

        Encoder::with_inner(*self, inner)
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.content_encoding())
    }
}

#[cfg(feature = "zstd")]
fn zstd_level(level: Level) -> i32 {
    match level {
        Level::Fastest => 1,
        Level::Best => 19,
        Level::Precise(n) => n.clamp(1, 22),
        _ => 3,
    }
}

/// A stateful stream compressor for one response body.
///
/// Compressed output accumulates internally until it is taken by
/// [`flush`](Encoder::flush) or [`finish`](Encoder::finish).
pub struct Encoder {
    codec: Codec,
    inner: Box<dyn EncodeV2 + Send>,
    output_buffer: Vec<u8>,
    pending: BytesMut,
}

impl fmt::Debug for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encoder")
            .field("codec", &self.codec)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl Encoder {
    pub(crate) fn with_inner(codec: Codec, inner: Box<dyn EncodeV2 + Send>) -> Self {
        Self {
            codec,
            inner,
            output_buffer: vec![0u8; OUTPUT_BUFFER_SIZE],
            pending: BytesMut::new(),
        }
    }

    /// Returns the codec this encoder produces.
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Feeds a chunk of input into the encoder.
    ///
    /// An empty chunk is a no-op.
    pub fn compress(&mut self, input: &[u8]) -> io::Result<()> {
        // Deflate streams reject an encode call that has nothing to consume
        if input.is_empty() {
            return Ok(());
        }

        let mut input_buf = PartialBuffer::new(input);

        // Keep encoding until all input is consumed
        loop {
            let mut output = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());
            self.inner.encode(&mut input_buf, &mut output)?;

            let written = output.written_len();
            if written > 0 {
                self.pending.extend_from_slice(&self.output_buffer[..written]);
            }

            if input_buf.written_len() >= input.len() {
                return Ok(());
            }

            // Safety check to prevent infinite loop
            if written == 0 && input_buf.written_len() == 0 {
                return Err(io::Error::other("encoder made no progress"));
            }
        }
    }

    /// Flushes the encoder and returns every byte produced so far.
    ///
    /// The stream stays open; the returned bytes are decodable up to the
    /// last input fed to [`compress`](Encoder::compress).
    pub fn flush(&mut self) -> io::Result<Bytes> {
        loop {
            let mut output = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());
            let done = self.inner.flush(&mut output)?;

            let written = output.written_len();
            if written > 0 {
                self.pending.extend_from_slice(&self.output_buffer[..written]);
            }
            if done {
                break;
            }
        }

        Ok(self.pending.split().freeze())
    }

    /// Terminates the stream and returns the remaining compressed bytes.
    pub fn finish(mut self) -> io::Result<Bytes> {
        loop {
            let mut output = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());
            let done = self.inner.finish(&mut output)?;

            let written = output.written_len();
            if written > 0 {
                self.pending.extend_from_slice(&self.output_buffer[..written]);
            }
            if done {
                break;
            }
        }

        Ok(self.pending.split().freeze())
    }
}


#[cfg(test)]
mod tests {
    use super::test_util::decode;
    use super::*;

    #[test]
    fn test_content_encoding() {
        #[cfg(feature = "zstd")]
        assert_eq!(Codec::Zstd.content_encoding(), "zstd");
        #[cfg(feature = "brotli")]
        assert_eq!(Codec::Brotli.content_encoding(), "br");
        #[cfg(feature = "gzip")]
        assert_eq!(Codec::Gzip.content_encoding(), "gzip");
        #[cfg(feature = "deflate")]
        assert_eq!(Codec::Deflate.content_encoding(), "deflate");
    }

    #[test]
    #[cfg(all(feature = "gzip", feature = "deflate", feature = "brotli", feature = "zstd"))]
    fn test_default_order() {
        assert_eq!(
            Codec::default_order(),
            vec![Codec::Gzip, Codec::Deflate, Codec::Brotli, Codec::Zstd]
        );
    }

    #[test]
    #[cfg(feature = "gzip")]
    fn test_from_name() {
        assert_eq!(Codec::from_name("gzip"), Some(Codec::Gzip));
        assert_eq!(Codec::from_name("GZIP"), Some(Codec::Gzip));
        assert_eq!(Codec::from_name("x-gzip"), Some(Codec::Gzip));
        #[cfg(feature = "brotli")]
        assert_eq!(Codec::from_name("Brotli"), Some(Codec::Brotli));
        assert_eq!(Codec::from_name("identity"), None);
        assert_eq!(Codec::from_name("*"), None);
    }

    #[test]
    fn test_one_shot_round_trip() {
        let input = "hello compression ".repeat(200);
        for codec in Codec::default_order() {
            let mut encoder = codec.encoder(Level::Default);
            encoder.compress(input.as_bytes()).unwrap();
            let compressed = encoder.finish().unwrap();

            assert!(compressed.len() < input.len(), "{codec} did not shrink input");
            assert_eq!(decode(codec, &compressed), input.as_bytes(), "{codec}");
        }
    }

    #[test]
    fn test_flushed_chunks_round_trip() {
        let chunks = ["first chunk ", "second chunk ", "", "third chunk"];
        for codec in Codec::default_order() {
            let mut encoder = codec.encoder(Level::Fastest);
            let mut compressed = Vec::new();
            for chunk in chunks {
                encoder.compress(chunk.as_bytes()).unwrap();
                compressed.extend_from_slice(&encoder.flush().unwrap());
            }
            compressed.extend_from_slice(&encoder.finish().unwrap());

            assert_eq!(decode(codec, &compressed), chunks.concat().as_bytes(), "{codec}");
        }
    }

    #[test]
    fn test_empty_chunks_after_flush() {
        for codec in Codec::default_order() {
            let mut encoder = codec.encoder(Level::Default);
            encoder.compress(b"hello").unwrap();
            let mut compressed = encoder.flush().unwrap().to_vec();

            encoder.compress(b"").unwrap();
            compressed.extend_from_slice(&encoder.finish().unwrap());

            assert_eq!(decode(codec, &compressed), b"hello", "{codec}");
        }
    }

    #[test]
    fn test_empty_first_chunk() {
        for codec in Codec::default_order() {
            let mut encoder = codec.encoder(Level::Default);
            encoder.compress(b"").unwrap();
            let mut compressed = encoder.flush().unwrap().to_vec();

            encoder.compress(b"later").unwrap();
            compressed.extend_from_slice(&encoder.finish().unwrap());

            assert_eq!(decode(codec, &compressed), b"later", "{codec}");
        }
    }

    #[test]
    #[cfg(feature = "brotli")]
    fn test_brotli_honours_level() {
        let input: String = (0..2000).map(|i| format!("row {} {}\n", i, i * 7 % 13)).collect();
        let compress = |level| {
            let mut encoder = Codec::Brotli.encoder(level);
            encoder.compress(input.as_bytes()).unwrap();
            encoder.finish().unwrap()
        };

        let fastest = compress(Level::Fastest);
        let best = compress(Level::Best);
        assert_ne!(fastest, best);
        assert_eq!(decode(Codec::Brotli, &fastest), input.as_bytes());
        assert_eq!(decode(Codec::Brotli, &best), input.as_bytes());
    }

    #[test]
    #[cfg(feature = "gzip")]
    fn test_flush_emits_bytes() {
        let mut encoder = Codec::Gzip.encoder(Level::Default);
        encoder.compress(b"streamed data").unwrap();
        let flushed = encoder.flush().unwrap();

        // gzip header starts with 0x1f 0x8b
        assert_eq!(&flushed[..2], &[0x1f, 0x8b]);
    }

    #[test]
    #[cfg(feature = "zstd")]
    fn test_zstd_level_mapping() {
        assert_eq!(zstd_level(Level::Fastest), 1);
        assert_eq!(zstd_level(Level::Default), 3);
        assert_eq!(zstd_level(Level::Precise(40)), 22);
    }
}
