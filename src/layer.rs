use crate::codec::Codec;
use crate::config::CompressionConfig;
use crate::error::ConfigError;
use crate::service::CompressionService;
use compression_core::Level;
use std::sync::Arc;
use tower::Layer;

/// A Tower layer that compresses HTTP response bodies.
///
/// This layer wraps services and compresses response bodies with the codec
/// negotiated from the client's `Accept-Encoding` header.
#[derive(Debug, Clone, Default)]
pub struct CompressionLayer {
    config: CompressionConfig,
}

impl CompressionLayer {
    /// Creates a new compression layer with default settings.
    ///
    /// The default minimum size for compression is 500 bytes.
    pub fn new() -> Self {
        Self::from_config(CompressionConfig::new())
    }

    /// Creates a layer from a prepared configuration.
    pub fn from_config(config: CompressionConfig) -> Self {
        Self { config }
    }

    /// Sets the minimum body size required for compression.
    ///
    /// A complete response body smaller than this value is not compressed.
    pub fn min_size(mut self, size: usize) -> Self {
        self.config = self.config.min_size(size);
        self
    }

    /// Sets the codecs offered to clients, most preferred first.
    pub fn codecs<I>(mut self, codecs: I) -> Self
    where
        I: IntoIterator<Item = Codec>,
    {
        self.config = self.config.codecs(codecs);
        self
    }

    /// Sets request path patterns that are never compressed.
    pub fn exclude_paths<I, P>(mut self, patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        self.config = self.config.exclude_paths(patterns)?;
        Ok(self)
    }

    /// Sets response media types that are never compressed.
    pub fn exclude_media_types<I, M>(mut self, media_types: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        self.config = self.config.exclude_media_types(media_types);
        self
    }

    /// Sets the compression level.
    pub fn level(mut self, level: Level) -> Self {
        self.config = self.config.level(level);
        self
    }

    /// Returns the configuration services built by this layer will use.
    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }
}

impl<S> Layer<S> for CompressionLayer {
    type Service = CompressionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CompressionService::new(inner, Arc::new(self.config.clone()))
    }
}
