use axum::body::Bytes;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const MAX_EXTENSION_LEN: usize = 8;

/// An uploaded `image` field, held in memory until it is written out
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: Option<String>,
    pub bytes: Bytes,
}

/// Directory holding one short-lived file per in-flight request.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Create the directory if it is missing. Safe to call repeatedly.
    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }

    /// Write the upload under a server-generated name.
    ///
    /// The client filename only contributes a sanitized extension, which the
    /// decoder may use as a format hint.
    pub fn persist(&self, upload: &Upload) -> anyhow::Result<ScratchFile> {
        self.ensure()?;

        let suffix = upload
            .file_name
            .as_deref()
            .and_then(sanitize_extension)
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();

        let mut file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(&suffix)
            .rand_bytes(12)
            .tempfile_in(&self.root)?;

        file.write_all(&upload.bytes)?;
        file.flush()?;

        tracing::debug!(path = %file.path().display(), bytes = upload.bytes.len(), "Upload saved");

        Ok(ScratchFile { file })
    }
}

/// Scratch copy of an upload; removed from disk when dropped
#[derive(Debug)]
pub struct ScratchFile {
    file: NamedTempFile,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

pub fn sanitize_extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;

    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }

    Some(ext.to_ascii_lowercase())
}
