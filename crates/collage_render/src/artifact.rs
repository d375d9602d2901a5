use anyhow::Context as _;
use collage_core::config::ExportSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// The finished output of one export run.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub file_name: String,
    pub mime_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifact")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl Artifact {
    /// Name the encoded bytes after the export settings and the current time.
    pub fn new(settings: &ExportSettings, bytes: Vec<u8>) -> Self {
        let stamp = chrono::Utc::now().timestamp_millis();
        Self {
            file_name: artifact_file_name(&settings.file_prefix, &settings.container, stamp),
            mime_type: settings.mime_type(),
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// `<prefix>-<millis>.<container>`, e.g. `video-collage-1700000000000.webm`.
pub fn artifact_file_name(prefix: &str, container: &str, timestamp_ms: i64) -> String {
    format!("{prefix}-{timestamp_ms}.{container}")
}

/// Where finished artifacts are handed off (a download prompt, a folder, ...).
pub trait ArtifactSink {
    fn deliver(&self, artifact: &Artifact) -> Result<()>;
}

/// Writes artifacts into a directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, artifact: &Artifact) -> PathBuf {
        self.dir.join(&artifact.file_name)
    }
}

impl ArtifactSink for DirectorySink {
    fn deliver(&self, artifact: &Artifact) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create output directory '{}'", self.dir.display()))?;
        let path = self.path_for(artifact);
        std::fs::write(&path, &artifact.bytes)
            .with_context(|| format!("failed to write '{}'", path.display()))?;
        tracing::info!(path = %path.display(), bytes = artifact.len(), "artifact delivered");
        Ok(())
    }
}
