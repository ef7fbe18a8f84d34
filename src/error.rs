use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Describes what has gone wrong while reading a SlideBook container.
#[derive(Error, Debug)]
pub enum SldyError {
    /// An I/O error occurred while reading a directory or stream.
    #[error("an I/O error occurred: {source}")]
    Io {
        #[from]
        /// The original error that was raised.
        source: io::Error,
    },

    /// A structural violation: missing sentinel, mismatched `ClassName`,
    /// a required field absent, or a malformed NPY header.
    #[error("format error: {message}")]
    Format {
        /// Human readable description of what was structurally wrong.
        message: String,
    },

    /// A compression algorithm tag is recognised but not implemented.
    #[error("unsupported compression algorithm tag {tag}")]
    Unsupported {
        /// The raw tag value that was rejected.
        tag: u8,
    },

    /// An expected document or data file was absent.
    #[error("not found: {path}")]
    NotFound {
        /// Path that was expected to exist.
        path: PathBuf,
    },

    /// The path given to [`crate::container::slide_root`] did not end in
    /// `.sldy` or `.sldyz`.
    #[error("path does not end in .sldy or .sldyz: {path}")]
    PathSyntax {
        /// The offending path.
        path: PathBuf,
    },

    /// Every image group under a slide's root failed to load.
    #[error("slide at {path} contains no valid image groups")]
    EmptyContainer {
        /// Root directory that was scanned.
        path: PathBuf,
    },

    /// A scalar value could not be parsed into its declared type.
    ///
    /// This variant is never returned to a caller from metadata loading
    /// (see §7 propagation policy) — it exists so internal helpers have a
    /// typed value to log before discarding the field.
    #[error("could not coerce field `{field}` from `{raw}`")]
    Coercion {
        /// Declared field name the value was destined for.
        field: String,
        /// The raw scalar text that failed to parse.
        raw: String,
    },
}

impl SldyError {
    pub(crate) fn format(message: impl Into<String>) -> Self {
        SldyError::Format {
            message: message.into(),
        }
    }
}
