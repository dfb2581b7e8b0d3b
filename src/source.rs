//! Caller-supplied source media.

use std::fmt::{Debug, Formatter, Result as FmtResult};

/// An immutable handle to the bytes of a video to compress.
///
/// The MIME type is a diagnostic hint only; the decoder sniffs the real
/// container from the bytes.
///
/// # Example
///
/// ```
/// use vidsqueeze::SourceMedia;
///
/// let source = SourceMedia::new(vec![0u8; 16], "holiday.mov", "video/quicktime");
/// assert_eq!(source.byte_len(), 16);
/// assert_eq!(source.extension(), Some("mov"));
/// ```
#[derive(Clone)]
pub struct SourceMedia {
    bytes: Vec<u8>,
    name: String,
    mime_type: String,
}

impl Debug for SourceMedia {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("SourceMedia")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("byte_len", &self.bytes.len())
            .finish()
    }
}

impl SourceMedia {
    /// Wrap caller-supplied bytes together with the original file name and
    /// declared MIME type.
    pub fn new(
        bytes: impl Into<Vec<u8>>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            name: name.into(),
            mime_type: mime_type.into(),
        }
    }

    /// The raw source bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Size of the source in bytes.
    pub fn byte_len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Original file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared MIME type.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Extension of the original file name, without the dot.
    ///
    /// Returns `None` when the name has no extension or the final component
    /// ends with a dot.
    pub fn extension(&self) -> Option<&str> {
        split_extension(&self.name).1
    }
}

/// Split `name` into its stem and extension.
///
/// Only the last path component is considered; a dot inside a directory
/// name is not an extension separator.
pub(crate) fn split_extension(name: &str) -> (&str, Option<&str>) {
    let component_start = name.rfind('/').map_or(0, |index| index + 1);
    match name[component_start..].rfind('.') {
        Some(dot) => {
            let dot = component_start + dot;
            let extension = &name[dot + 1..];
            if extension.is_empty() {
                (name, None)
            } else {
                (&name[..dot], Some(extension))
            }
        }
        None => (name, None),
    }
}
