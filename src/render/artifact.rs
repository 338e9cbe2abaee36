//! Binary artifacts and the store handing out ephemeral local references to them.
//!
//! A reference is a file in the store directory. Revoking it deletes the
//! file. References created for export actions carry an expiry and are
//! swept on every store access.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64_ENGINE;
use base64::Engine as _;
use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{PipelineError, PipelineResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryArtifact {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

impl BinaryArtifact {
    pub fn decode(media_type: &str, data: &str) -> PipelineResult<Self> {
        // tolerate line-wrapped payloads
        let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let bytes = BASE64_ENGINE
            .decode(compact.as_bytes())
            .map_err(|e| PipelineError::Render(format!("invalid base64 image payload: {}", e)))?;
        Ok(Self { bytes, media_type: media_type.to_string() })
    }

    pub fn extension(&self) -> &'static str {
        extension_for(&self.media_type)
    }
}

pub fn extension_for(media_type: &str) -> &'static str {
    match media_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        "image/webp" => "webp",
        _ => "bin",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactRef {
    id: String,
    path: PathBuf,
}

impl ArtifactRef {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// URL for the reference, relative to `page_dir` when it lives below it.
    pub fn url(&self, page_dir: Option<&Path>) -> String {
        if let Some(rel) = page_dir.and_then(|d| self.path.strip_prefix(d).ok()) {
            return rel.to_string_lossy().replace('\\', "/");
        }
        format!("file://{}", self.path.to_string_lossy().replace('\\', "/"))
    }
}

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url(None))
    }
}

struct Entry {
    path: PathBuf,
    expires: Option<Instant>,
}

pub struct ArtifactStore {
    dir: PathBuf,
    live: HashMap<String, Entry>,
    _temp: Option<TempDir>,
}

impl ArtifactStore {
    /// Store in a private temporary directory removed on drop.
    pub fn temporary() -> io::Result<Self> {
        let temp = tempfile::Builder::new().prefix("codecanvas-").tempdir()?;
        Ok(Self { dir: temp.path().to_path_buf(), live: HashMap::new(), _temp: Some(temp) })
    }

    /// Store in a caller-chosen directory. Files still live on drop stay on disk.
    pub fn in_dir(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, live: HashMap::new(), _temp: None })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn register(&mut self, artifact: &BinaryArtifact, ttl: Option<Duration>) -> io::Result<ArtifactRef> {
        self.sweep();
        let id = Uuid::new_v4().to_string();
        let path = self.dir.join(format!("{}.{}", id, artifact.extension()));
        fs::write(&path, &artifact.bytes)?;
        let expires = ttl.map(|t| Instant::now() + t);
        self.live.insert(id.clone(), Entry { path: path.clone(), expires });
        debug!(path = %path.display(), bytes = artifact.bytes.len(), "artifact registered");
        Ok(ArtifactRef { id, path })
    }

    /// Release a reference. Returns false when it was already gone.
    pub fn revoke(&mut self, r: &ArtifactRef) -> bool {
        match self.live.remove(&r.id) {
            Some(entry) => {
                remove_file(&entry.path);
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn is_live(&self, r: &ArtifactRef) -> bool {
        self.live.contains_key(&r.id)
    }

    #[cfg(test)]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Latest expiry among pending export references.
    pub fn last_expiry(&self) -> Option<Instant> {
        self.live.values().filter_map(|e| e.expires).max()
    }

    /// Revoke every reference whose grace period is over.
    pub fn sweep(&mut self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .live
            .iter()
            .filter(|(_, e)| e.expires.is_some_and(|t| t <= now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            if let Some(entry) = self.live.remove(&id) {
                remove_file(&entry.path);
            }
        }
    }
}

fn remove_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to release artifact");
        }
    }
}
