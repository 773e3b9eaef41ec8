//! Value codecs: the byte transform applied to every value before it
//! reaches the engine and after it is read back.
//!
//! # Supported Algorithms
//!
//! | Algorithm | Speed | Ratio | Use Case |
//! |-----------|-------|-------|----------|
//! | ZSTD | ★★★★ | ★★★★★ | Default, compact values on disk |
//! | None | ★★★★★ | ★ | No compression, debugging/diagnostics |
//!
//! Every codec must satisfy `decode(encode(v)) == v` for all inputs,
//! including the empty slice.
//!
//! # Example
//!
//! ```rust
//! use kvx_core::codec::{CompressionConfig, ValueCodec};
//!
//! # fn main() -> kvx_core::KvxResult<()> {
//! let codec = CompressionConfig::zstd_level(3).codec();
//! let encoded = codec.encode(b"hello hello hello")?;
//! assert_eq!(codec.decode(&encoded)?, b"hello hello hello");
//! # Ok(())
//! # }
//! ```

use crate::error::{KvxError, KvxResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Stateless, invertible byte transform for stored values.
///
/// `decode` must reject payloads `encode` could not have produced with
/// [`KvxError::Corruption`].
pub trait ValueCodec: Send + Sync {
    /// Short name for diagnostics.
    fn name(&self) -> &'static str;

    /// Transform a caller value into its stored form.
    fn encode(&self, value: &[u8]) -> KvxResult<Vec<u8>>;

    /// Recover the caller value from its stored form.
    fn decode(&self, stored: &[u8]) -> KvxResult<Vec<u8>>;
}

/// Compression algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// Values are stored verbatim.
    None,
    /// Zstandard with configurable level (1-22).
    Zstd,
}

impl std::fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Zstd => write!(f, "ZSTD"),
        }
    }
}

/// Compression configuration for stored values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionConfig {
    algorithm: CompressionAlgorithm,
    /// Compression level (only used by ZSTD, clamped to 1-22).
    #[serde(default)]
    level: Option<u32>,
}

impl Default for CompressionConfig {
    /// Default compression: ZSTD at the library's default level.
    fn default() -> Self {
        Self {
            algorithm: CompressionAlgorithm::Zstd,
            level: None,
        }
    }
}

impl CompressionConfig {
    /// Create a new compression config with the specified algorithm.
    pub fn new(algorithm: CompressionAlgorithm) -> Self {
        Self {
            algorithm,
            level: None,
        }
    }

    /// Set the compression level (ZSTD only).
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Some(level);
        self
    }

    pub fn algorithm(&self) -> CompressionAlgorithm {
        self.algorithm
    }

    pub fn level(&self) -> Option<u32> {
        self.level
    }

    /// Preset: no compression.
    pub fn none() -> Self {
        Self::new(CompressionAlgorithm::None)
    }

    /// Preset: ZSTD with default level.
    pub fn zstd() -> Self {
        Self::new(CompressionAlgorithm::Zstd)
    }

    /// Preset: ZSTD with specified compression level (1-22).
    pub fn zstd_level(level: u32) -> Self {
        Self::new(CompressionAlgorithm::Zstd).with_level(level)
    }

    /// Build the codec described by this config.
    pub fn codec(&self) -> Arc<dyn ValueCodec> {
        match self.algorithm {
            CompressionAlgorithm::None => Arc::new(IdentityCodec),
            CompressionAlgorithm::Zstd => {
                let level = self
                    .level
                    .map(|l| l.clamp(1, 22) as i32)
                    .unwrap_or(zstd::DEFAULT_COMPRESSION_LEVEL);
                Arc::new(ZstdCodec::new(level))
            }
        }
    }
}

/// Passes values through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCodec;

impl ValueCodec for IdentityCodec {
    fn name(&self) -> &'static str {
        "none"
    }

    fn encode(&self, value: &[u8]) -> KvxResult<Vec<u8>> {
        Ok(value.to_vec())
    }

    fn decode(&self, stored: &[u8]) -> KvxResult<Vec<u8>> {
        Ok(stored.to_vec())
    }
}

/// Zstandard frame per value.
#[derive(Debug, Clone, Copy)]
pub struct ZstdCodec {
    level: i32,
}

impl ZstdCodec {
    pub fn new(level: i32) -> Self {
        Self { level }
    }

    pub fn level(&self) -> i32 {
        self.level
    }
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self::new(zstd::DEFAULT_COMPRESSION_LEVEL)
    }
}

impl ValueCodec for ZstdCodec {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn encode(&self, value: &[u8]) -> KvxResult<Vec<u8>> {
        zstd::encode_all(value, self.level)
            .map_err(|e| KvxError::Storage(format!("compression failed: {}", e)))
    }

    fn decode(&self, stored: &[u8]) -> KvxResult<Vec<u8>> {
        zstd::decode_all(stored)
            .map_err(|e| KvxError::Corruption(format!("decompression failed: {}", e)))
    }
}
