//! The result of a successful compression.

use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::plan::CompressionPlan;
use crate::source::split_extension;

/// MIME type of every compressed output.
pub const OUTPUT_MIME_TYPE: &str = "video/webm";

/// File extension of every compressed output, without the dot.
pub const OUTPUT_EXTENSION: &str = "webm";

/// A finished compression. Ownership of the bytes passes to the caller.
#[derive(Clone)]
#[must_use]
pub struct CompressionResult {
    /// The complete WebM file.
    pub bytes: Vec<u8>,
    /// Original file name with its extension replaced by `.webm`.
    pub file_name: String,
    /// Size of the source in bytes.
    pub original_size: u64,
    /// Size of [`bytes`](CompressionResult::bytes).
    pub compressed_size: u64,
    /// Always [`OUTPUT_MIME_TYPE`].
    pub mime_type: &'static str,
    /// The plan the output was encoded with.
    pub plan: CompressionPlan,
}

impl Debug for CompressionResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("CompressionResult")
            .field("file_name", &self.file_name)
            .field("original_size", &self.original_size)
            .field("compressed_size", &self.compressed_size)
            .field("mime_type", &self.mime_type)
            .field("plan", &self.plan)
            .finish_non_exhaustive()
    }
}

impl CompressionResult {
    pub(crate) fn new(
        bytes: Vec<u8>,
        source_name: &str,
        original_size: u64,
        plan: CompressionPlan,
    ) -> Self {
        let compressed_size = bytes.len() as u64;
        Self {
            bytes,
            file_name: output_file_name(source_name),
            original_size,
            compressed_size,
            mime_type: OUTPUT_MIME_TYPE,
            plan,
        }
    }

    /// How much smaller the output is than the source, in percent.
    ///
    /// Negative when the output grew. Zero for an empty source.
    pub fn reduction_percent(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        let saved = self.original_size as f64 - self.compressed_size as f64;
        saved / self.original_size as f64 * 100.0
    }
}

/// Rewrite `source_name` to carry the output extension.
///
/// # Example
///
/// ```
/// assert_eq!(vidsqueeze::output_file_name("clip.final.mp4"), "clip.final.webm");
/// assert_eq!(vidsqueeze::output_file_name("clip"), "clip.webm");
/// ```
pub fn output_file_name(source_name: &str) -> String {
    let (stem, _) = split_extension(source_name);
    format!("{stem}.{OUTPUT_EXTENSION}")
}
