//! Domain primitives with validated constructors.

use corpus_sync_shared::{ErrorCode, ErrorEnvelope};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Validation failures for domain primitives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimitiveError {
    /// `SourceTag` is empty after trimming.
    EmptySourceTag {
        /// Length of the raw input before trimming.
        input_length: usize,
    },
    /// `SourceTag` violates the allowed pattern.
    InvalidSourceTag {
        /// Trimmed tag that failed validation.
        input: String,
    },
    /// `DocumentPath` is empty after normalization.
    EmptyDocumentPath {
        /// Length of the raw input before normalization.
        input_length: usize,
    },
    /// `DocumentPath` escapes its source root.
    UnsafeDocumentPath {
        /// Normalized path that failed validation.
        input: String,
    },
    /// `ContentHash` is not a 64-character lowercase hex digest.
    InvalidContentHash {
        /// Length of the rejected input.
        input_length: usize,
    },
    /// `SegmentKey` is empty after trimming.
    EmptySegmentKey {
        /// Length of the raw input before trimming.
        input_length: usize,
    },
}

impl PrimitiveError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::EmptySourceTag { .. } | Self::InvalidSourceTag { .. } => {
                ErrorCode::new("domain", "invalid_source_tag")
            },
            Self::EmptyDocumentPath { .. } | Self::UnsafeDocumentPath { .. } => {
                ErrorCode::new("domain", "invalid_document_path")
            },
            Self::InvalidContentHash { .. } => ErrorCode::new("domain", "invalid_content_hash"),
            Self::EmptySegmentKey { .. } => ErrorCode::new("domain", "invalid_segment_key"),
        }
    }
}

impl fmt::Display for PrimitiveError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySourceTag { .. } => formatter.write_str("SourceTag must be non-empty"),
            Self::InvalidSourceTag { .. } => {
                formatter.write_str("SourceTag must match /^[a-z][a-z0-9_-]*$/")
            },
            Self::EmptyDocumentPath { .. } => {
                formatter.write_str("DocumentPath must be non-empty")
            },
            Self::UnsafeDocumentPath { .. } => {
                formatter.write_str("DocumentPath must stay inside its source root")
            },
            Self::InvalidContentHash { .. } => {
                formatter.write_str("ContentHash must be a 64-character lowercase hex digest")
            },
            Self::EmptySegmentKey { .. } => formatter.write_str("SegmentKey must be non-empty"),
        }
    }
}

impl std::error::Error for PrimitiveError {}

impl From<PrimitiveError> for ErrorEnvelope {
    fn from(error: PrimitiveError) -> Self {
        let envelope = Self::expected(error.error_code(), error.to_string());
        match error {
            PrimitiveError::EmptySourceTag { input_length }
            | PrimitiveError::EmptyDocumentPath { input_length }
            | PrimitiveError::InvalidContentHash { input_length }
            | PrimitiveError::EmptySegmentKey { input_length } => {
                envelope.with_metadata("input_length", input_length.to_string())
            },
            PrimitiveError::InvalidSourceTag { input }
            | PrimitiveError::UnsafeDocumentPath { input } => {
                envelope.with_metadata("input", input)
            },
        }
    }
}

/// Identifier for a configured data source (e.g. one dump corpus).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceTag(Box<str>);

impl SourceTag {
    /// Parse a `SourceTag` from user input.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let raw = input.as_ref();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PrimitiveError::EmptySourceTag {
                input_length: raw.len(),
            });
        }

        let mut chars = trimmed.chars();
        let leading_ok = chars.next().is_some_and(|ch| ch.is_ascii_lowercase());
        let rest_ok = chars
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-');
        if !leading_ok || !rest_ok {
            return Err(PrimitiveError::InvalidSourceTag {
                input: trimmed.to_owned(),
            });
        }

        Ok(Self(trimmed.to_owned().into_boxed_str()))
    }

    /// Access the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Relative, slash-normalized path of a document within its source root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentPath(Box<str>);

impl DocumentPath {
    /// Parse and normalize a `DocumentPath` from user input.
    ///
    /// Backslashes are normalized to forward slashes; leading `./` and `/`
    /// are stripped; `..` segments are rejected.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let raw = input.as_ref();
        let normalized = raw.replace('\\', "/");
        let normalized = normalized.trim();
        let normalized = normalized.trim_start_matches("./");
        let normalized = normalized.trim_start_matches('/');
        if normalized.is_empty() {
            return Err(PrimitiveError::EmptyDocumentPath {
                input_length: raw.len(),
            });
        }
        if normalized.split('/').any(|segment| segment == "..") {
            return Err(PrimitiveError::UnsafeDocumentPath {
                input: normalized.to_owned(),
            });
        }

        Ok(Self(normalized.to_owned().into_boxed_str()))
    }

    /// Access the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// SHA-256 digest of a document's raw bytes, lowercase hex.
///
/// The hash is the authoritative change signal; modification times are only
/// a pre-filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(Box<str>);

impl ContentHash {
    /// Compute the hash of raw document bytes.
    ///
    /// Deterministic: identical bytes always yield the identical digest.
    #[must_use]
    pub fn compute(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(format!("{:x}", hasher.finalize()).into_boxed_str())
    }

    /// Parse a stored hex digest.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let raw = input.as_ref().trim();
        let valid = raw.len() == 64
            && raw
                .chars()
                .all(|ch| ch.is_ascii_digit() || ('a'..='f').contains(&ch));
        if !valid {
            return Err(PrimitiveError::InvalidContentHash {
                input_length: raw.len(),
            });
        }
        Ok(Self(raw.to_owned().into_boxed_str()))
    }

    /// Access the underlying hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Vector-store key for one embedded chunk.
///
/// Keys are derived deterministically from `(source_tag, path, chunk_index)`
/// so reprocessing the same document overwrites its vectors instead of
/// duplicating them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentKey(Box<str>);

impl SegmentKey {
    /// Derive the key for a chunk of a document.
    #[must_use]
    pub fn derive(source_tag: &SourceTag, path: &DocumentPath, chunk_index: u32) -> Self {
        let prefix = document_key_prefix(source_tag, path);
        Self(format!("{prefix}_{chunk_index}").into_boxed_str())
    }

    /// Parse a stored segment key.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let raw = input.as_ref();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PrimitiveError::EmptySegmentKey {
                input_length: raw.len(),
            });
        }
        Ok(Self(trimmed.to_owned().into_boxed_str()))
    }

    /// Access the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Stable 12-character prefix shared by all of a document's segment keys.
fn document_key_prefix(source_tag: &SourceTag, path: &DocumentPath) -> String {
    let digest = md5::compute(format!("{}:{}", source_tag.as_str(), path.as_str()).as_bytes());
    let hex = format!("{digest:x}");
    hex.chars().take(12).collect()
}

/// Composite identity of a document: `(source_tag, path)`.
///
/// At most one active [`crate::DocumentRecord`] exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentKey {
    /// Data source the document belongs to.
    pub source_tag: SourceTag,
    /// Relative path within the source root.
    pub path: DocumentPath,
}

impl DocumentKey {
    /// Build a key from its parts.
    #[must_use]
    pub const fn new(source_tag: SourceTag, path: DocumentPath) -> Self {
        Self { source_tag, path }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.source_tag, self.path)
    }
}
