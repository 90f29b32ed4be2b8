use crate::codec::Codec;
use crate::error::ConfigError;
use compression_core::Level;
use regex::RegexSet;
use std::collections::HashSet;

/// Default minimum body size for compression.
pub const DEFAULT_MIN_SIZE: usize = 500;

/// Immutable settings shared by every request a layer handles.
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    min_size: usize,
    codecs: Vec<Codec>,
    exclude_paths: Option<RegexSet>,
    exclude_media_types: HashSet<String>,
    level: Level,
}

impl CompressionConfig {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self {
            min_size: DEFAULT_MIN_SIZE,
            codecs: Codec::default_order(),
            exclude_paths: None,
            exclude_media_types: HashSet::new(),
            level: Level::Default,
        }
    }

    /// Sets the minimum body size required for compression.
    ///
    /// A complete body smaller than this is sent as is. Streaming bodies are
    /// always compressed.
    pub fn min_size(mut self, size: usize) -> Self {
        self.min_size = size;
        self
    }

    /// Sets the codecs the server offers, most preferred first.
    ///
    /// An empty list restores the default order.
    pub fn codecs<I>(mut self, codecs: I) -> Self
    where
        I: IntoIterator<Item = Codec>,
    {
        let mut ordered = Vec::new();
        for codec in codecs {
            if !ordered.contains(&codec) {
                ordered.push(codec);
            }
        }
        self.codecs = if ordered.is_empty() {
            Codec::default_order()
        } else {
            ordered
        };
        self
    }

    /// Sets request path patterns that are never compressed.
    ///
    /// Each pattern is a regular expression anchored at the start of the path.
    pub fn exclude_paths<I, P>(mut self, patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let anchored: Vec<String> = patterns
            .into_iter()
            .map(|p| format!("^(?:{})", p.as_ref()))
            .collect();
        self.exclude_paths = if anchored.is_empty() {
            None
        } else {
            Some(RegexSet::new(anchored)?)
        };
        Ok(self)
    }

    /// Sets response media types that are never compressed.
    ///
    /// Entries are matched case-insensitively against the `Content-Type`
    /// without parameters; `image/*` excludes every image type.
    pub fn exclude_media_types<I, M>(mut self, media_types: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        self.exclude_media_types = media_types
            .into_iter()
            .map(|m| m.into().trim().to_ascii_lowercase())
            .collect();
        self
    }

    /// Sets the compression level used for new encoders.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Returns the minimum size of a complete body that gets compressed.
    pub fn minimum_size(&self) -> usize {
        self.min_size
    }

    /// Returns the server codec preference list.
    pub fn supported_codecs(&self) -> &[Codec] {
        &self.codecs
    }

    /// Returns the compression level.
    pub fn compression_level(&self) -> Level {
        self.level
    }

    pub(crate) fn is_excluded_path(&self, path: &str) -> bool {
        self.exclude_paths
            .as_ref()
            .is_some_and(|set| set.is_match(path))
    }

    pub(crate) fn is_excluded_media_type(&self, media_type: &str) -> bool {
        if self.exclude_media_types.contains(media_type) {
            return true;
        }
        media_type
            .split_once('/')
            .is_some_and(|(top, _)| self.exclude_media_types.contains(&format!("{top}/*")))
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self::new()
    }
}
