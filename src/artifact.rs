//! On-disk layout of a recorded session.
//!
//! Every page a session touches is preserved as a numbered artifact: the raw
//! body at `<prefix><name>/<N>.html` plus a JSON sidecar `<N>.html.meta`
//! carrying the final URL and content type. Replay mode reads the same
//! layout back in counter order. The counter itself lives in the session;
//! the store only maps numbers to paths.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const METADATA_EXTENSION: &str = ".meta";

/// Sidecar metadata persisted next to each saved page body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub url: String,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Browser-backend response metadata, written as `<N>.html.response.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub url: String,
    pub status: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// The session directory is the raw string concatenation of prefix and
    /// name, so a prefix of `tmp/` and a name of `login` lands in
    /// `tmp/login/`.
    pub fn new(file_prefix: &str, name: &str) -> Self {
        Self {
            dir: PathBuf::from(format!("{file_prefix}{name}")),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    pub fn html_path(&self, n: u64) -> PathBuf {
        self.dir.join(format!("{n}.html"))
    }

    pub fn meta_path(&self, n: u64) -> PathBuf {
        self.dir.join(format!("{n}.html{METADATA_EXTENSION}"))
    }

    pub fn response_meta_path(&self, n: u64) -> PathBuf {
        self.dir.join(format!("{n}.html.response.json"))
    }

    /// Artifact slot `n` with a caller-chosen extension, used when a command
    /// preserves a non-HTML file (e.g. a copied download).
    pub fn file_path(&self, n: u64, extension: &str) -> PathBuf {
        self.dir.join(format!("{n}.{extension}"))
    }

    pub fn cookie_path(&self) -> PathBuf {
        self.dir.join("cookie")
    }

    pub fn download_dir(&self) -> PathBuf {
        self.dir.join("chrome")
    }

    /// Timestamped snapshot path that never clobbers an earlier dump, so a
    /// sequence of failures stays inspectable.
    pub fn snapshot_path(&self, now: chrono::DateTime<chrono::Local>) -> PathBuf {
        let stamp = now.format("%Y%m%d-%H%M%S");
        let mut path = self.dir.join(format!("snapshot-{stamp}.html"));
        let mut serial = 1;
        while path.exists() {
            path = self.dir.join(format!("snapshot-{stamp}-{serial}.html"));
            serial += 1;
        }
        path
    }

    pub fn write(&self, n: u64, body: &[u8], meta: &PageMetadata) -> Result<()> {
        let path = self.html_path(n);
        tracing::debug!(file = %path.display(), bytes = body.len(), "saving page");
        fs::write(&path, body)?;
        fs::write(self.meta_path(n), serde_json::to_vec(meta)?)?;
        Ok(())
    }

    pub fn write_response_meta(&self, n: u64, meta: &ResponseMeta) -> Result<()> {
        fs::write(self.response_meta_path(n), serde_json::to_vec(meta)?)?;
        Ok(())
    }

    /// Loads the artifact for slot `n`. A missing body or sidecar means the
    /// recording cannot satisfy this replay step.
    pub fn read(&self, n: u64) -> Result<(Vec<u8>, PageMetadata)> {
        let path = self.html_path(n);
        tracing::debug!(file = %path.display(), "loading page");
        let body = fs::read(&path).map_err(|_| Error::RetryAndRecord {
            filename: path.clone(),
        })?;
        let meta_bytes = fs::read(self.meta_path(n)).map_err(|_| Error::RetryAndRecord {
            filename: self.meta_path(n),
        })?;
        let meta = serde_json::from_slice(&meta_bytes)?;
        Ok((body, meta))
    }
}
