//! Error types for HTML-to-PDF rendering.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type for rendering operations.
pub type Result<T> = std::result::Result<T, RenderError>;

/// Errors that can occur while rendering a document.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The renderer setup is unusable. Raised before any process is spawned.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The renderer ran but exited with a code that is not accepted.
    #[error("renderer reported error ({}):\n{output}\ncommand was: {command}", exit_label(.exit_code))]
    Failed {
        /// Exit code, `None` if the process was terminated by a signal.
        exit_code: Option<i32>,
        /// Combined stdout and stderr of the renderer.
        output: String,
        /// The command line, for diagnostics.
        command: String,
    },

    /// The renderer executable could not be started.
    #[error("failed to run renderer `{command}`: {source}")]
    Spawn {
        /// The command line that was attempted.
        command: String,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// The renderer did not finish within the configured timeout and was killed.
    #[error("renderer timed out after {after:?}: {command}")]
    Timeout {
        /// The timeout that expired.
        after: Duration,
        /// The command line, for diagnostics.
        command: String,
    },

    /// The render was cancelled by the caller and the renderer was killed.
    #[error("renderer cancelled: {command}")]
    Cancelled {
        /// The command line, for diagnostics.
        command: String,
    },

    /// A filesystem operation on a required path failed.
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        /// The path the operation was performed on.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// The produced artifact could not be parsed as a PDF.
    #[error("invalid PDF: {0}")]
    InvalidPdf(String),
}

impl RenderError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> RenderError {
        let path = path.into();
        move |source| RenderError::Io { path, source }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}
