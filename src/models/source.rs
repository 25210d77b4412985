//! Injectable artifact retrieval

use crate::error::ArtifactLoadError;
use std::path::{Path, PathBuf};

/// Where a bundle manifest comes from.
///
/// Implementations own the retrieval mechanism (local disk, object store,
/// HTTP). The bundle loader only needs the manifest bytes, a stable identity
/// for caching, and a way to resolve files the manifest references.
pub trait ArtifactSource: Send + Sync {
    /// Stable identity used as the cache key
    fn identity(&self) -> String;

    /// Fetch the raw manifest bytes
    fn fetch(&self) -> Result<Vec<u8>, ArtifactLoadError>;

    /// Resolve a path referenced by the manifest (e.g. an ONNX model file)
    fn resolve(&self, relative: &Path) -> Option<PathBuf>;
}

/// Manifest stored on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ArtifactSource for FileSource {
    fn identity(&self) -> String {
        // canonical form so "./m.json" and "m.json" share a cache entry
        let path = self.path.canonicalize().unwrap_or_else(|_| self.path.clone());
        format!("file://{}", path.display())
    }

    fn fetch(&self) -> Result<Vec<u8>, ArtifactLoadError> {
        std::fs::read(&self.path).map_err(|e| ArtifactLoadError::Unreachable {
            source_id: self.identity(),
            reason: e.to_string(),
        })
    }

    fn resolve(&self, relative: &Path) -> Option<PathBuf> {
        if relative.is_absolute() {
            return Some(relative.to_path_buf());
        }
        let base = self.path.parent().unwrap_or_else(|| Path::new("."));
        Some(base.join(relative))
    }
}

/// Manifest already held in memory, e.g. fetched by the caller or built in tests.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    identity: String,
    bytes: Vec<u8>,
    base_dir: Option<PathBuf>,
}

impl InMemorySource {
    pub fn new(identity: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            identity: identity.into(),
            bytes: bytes.into(),
            base_dir: None,
        }
    }

    /// Serialize a JSON manifest value
    pub fn from_json(identity: impl Into<String>, manifest: &serde_json::Value) -> Self {
        Self::new(identity, manifest.to_string())
    }

    /// Directory against which referenced files are resolved
    pub fn with_base_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.base_dir = Some(dir.as_ref().to_path_buf());
        self
    }
}

impl ArtifactSource for InMemorySource {
    fn identity(&self) -> String {
        self.identity.clone()
    }

    fn fetch(&self) -> Result<Vec<u8>, ArtifactLoadError> {
        Ok(self.bytes.clone())
    }

    fn resolve(&self, relative: &Path) -> Option<PathBuf> {
        if relative.is_absolute() {
            return Some(relative.to_path_buf());
        }
        self.base_dir.as_ref().map(|dir| dir.join(relative))
    }
}
