//! Temporary-file byte references for the FFmpeg decoder.
//!
//! FFmpeg opens sources by location, so [`TempFileStore`] writes the caller's
//! bytes to a named temporary file and deletes it again on release. The file
//! keeps the source's extension, which helps FFmpeg's format sniffing for
//! containers with weak magic numbers.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};

use crate::backend::{ByteReference, ByteStore};
use crate::error::CompressError;
use crate::source::SourceMedia;

const FILE_PREFIX: &str = "vidsqueeze-";

/// A source copy on disk. Deleted when released or dropped.
#[derive(Debug)]
pub struct TempFileReference {
    file: NamedTempFile,
}

impl ByteReference for TempFileReference {
    fn location(&self) -> &Path {
        self.file.path()
    }
}

/// Writes sources to temporary files.
#[derive(Debug, Clone, Default)]
pub struct TempFileStore {
    directory: Option<PathBuf>,
}

impl TempFileStore {
    /// Store files in the system temporary directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store files in `directory`.
    pub fn in_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: Some(directory.into()),
        }
    }

    /// The directory files are written to, if not the system default.
    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }
}

impl ByteStore for TempFileStore {
    type Reference = TempFileReference;

    fn create(&mut self, source: &SourceMedia) -> Result<TempFileReference, CompressError> {
        let suffix = source
            .extension()
            .map(|extension| format!(".{extension}"))
            .unwrap_or_default();

        let mut builder = Builder::new();
        builder.prefix(FILE_PREFIX).suffix(&suffix);
        let created = match &self.directory {
            Some(directory) => builder.tempfile_in(directory),
            None => builder.tempfile(),
        };
        let mut file = created.map_err(|error| {
            CompressError::ResourceCreation(format!("cannot create temporary file: {error}"))
        })?;

        file.write_all(source.bytes())
            .and_then(|()| file.flush())
            .map_err(|error| {
                CompressError::ResourceCreation(format!(
                    "cannot write {} bytes to {}: {error}",
                    source.byte_len(),
                    file.path().display()
                ))
            })?;

        log::debug!(
            "Wrote {} bytes of {} ({}) to {}",
            source.byte_len(),
            source.name(),
            source.mime_type(),
            file.path().display()
        );
        Ok(TempFileReference { file })
    }

    fn release(&mut self, reference: TempFileReference) {
        let path = reference.file.path().to_path_buf();
        match reference.file.close() {
            Ok(()) => log::debug!("Removed {}", path.display()),
            Err(error) => log::warn!("Failed to remove {}: {error}", path.display()),
        }
    }
}
