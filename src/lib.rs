//! HTTP response compression middleware for Tower.
//!
//! This crate provides a Tower layer that negotiates a codec (gzip, deflate,
//! brotli or zstd) from the client's `Accept-Encoding` header and compresses
//! the response body as it streams past.
//!
//! # Example
//!
//! ```ignore
//! use negotiated_compression::CompressionLayer;
//! use tower::ServiceBuilder;
//!
//! let service = ServiceBuilder::new()
//!     .layer(
//!         CompressionLayer::new()
//!             .min_size(1024)
//!             .exclude_media_types(["image/png"])
//!             .exclude_paths(["/metrics"])?,
//!     )
//!     .service(my_service);
//! ```
//!
//! # Negotiation
//!
//! The client's highest quality wins; among codecs of equal quality the
//! server's configured order decides. `q=0` and unparsable qualities reject a
//! codec. A `*` entry falls back to the first configured codec.
//!
//! # Compression Rules
//!
//! The middleware will **not** compress responses when:
//! - The request path matches an excluded path pattern
//! - No supported `Accept-Encoding` is present in the request
//! - `Content-Encoding` header is already set
//! - `Content-Range` header is present (range responses)
//! - `Content-Type` is an excluded media type
//! - The whole body arrives in one chunk smaller than the minimum size
//!   (default: 500 bytes)
//!
//! # Response Modifications
//!
//! The response head is held back until the first body chunk has been seen.
//! When compression is applied:
//! - `Content-Encoding` header is set to the codec used
//! - `Content-Length` is set to the compressed size when the whole body was
//!   available at once, and removed for streaming bodies
//! - `Accept-Ranges` header is removed
//! - `Vary` header includes `Accept-Encoding`

#![deny(missing_docs)]

mod body;
mod codec;
mod config;
mod error;
mod future;
mod header;
mod layer;
mod negotiate;
mod responder;
mod service;

pub use body::CompressionBody;
pub use codec::{Codec, Encoder};
pub use compression_core::Level;
pub use config::{CompressionConfig, DEFAULT_MIN_SIZE};
pub use error::{BoxError, ConfigError, Error};
pub use future::ResponseFuture;
pub use layer::CompressionLayer;
pub use negotiate::resolve_codec;
pub use responder::{Message, Phase, Responder};
pub use service::CompressionService;
