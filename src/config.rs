//! Renderer configuration, loaded from TOML and overlaid with the environment.
//!
//! ```toml
//! binary = "/usr/local/bin/wkhtmltopdf"
//! timeout_secs = 60
//!
//! [options]
//! quiet = true
//! margin-top = 10
//! print-media-type = true
//!
//! [source]
//! mode = "callback"
//! domain = "cms.example"
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{RenderError, Result};
use crate::options::RenderOptions;
use crate::source::SourceMode;

/// Overrides [`RendererConfig::binary`].
pub const BIN_ENV: &str = "HTMLPRESS_BIN";
/// Overrides both temp directories.
pub const TMPDIR_ENV: &str = "HTMLPRESS_TMPDIR";

/// Everything a [`crate::Renderer`] needs, passed in explicitly.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererConfig {
    /// Path to the renderer executable.
    pub binary: String,
    /// Flags passed before the source and destination arguments.
    pub options: RenderOptions,
    /// Directory for HTML handed to the renderer.
    pub input_dir: PathBuf,
    /// Directory for generated PDFs and captured renderer output.
    pub output_dir: PathBuf,
    /// How the renderer reads the stored HTML.
    pub source: SourceMode,
    /// Kill the renderer after this many seconds. No limit when unset.
    pub timeout_secs: Option<u64>,
    /// Exit codes that count as success. wkhtmltopdf exits with 2 when the
    /// document was produced with warnings.
    pub accepted_exit_codes: Vec<i32>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        let tmp = default_temp_dir();
        Self {
            binary: "wkhtmltopdf".to_string(),
            options: RenderOptions::new(),
            input_dir: tmp.clone(),
            output_dir: tmp,
            source: SourceMode::File,
            timeout_secs: None,
            accepted_exit_codes: vec![0, 2],
        }
    }
}

impl RendererConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| RenderError::Configuration(e.to_string()))
    }

    /// Load a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(RenderError::io(path))?;
        Self::from_toml_str(&text).map_err(|e| match e {
            RenderError::Configuration(msg) => {
                RenderError::Configuration(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Apply `HTMLPRESS_BIN` and `HTMLPRESS_TMPDIR`, when set.
    pub fn apply_env(mut self) -> Self {
        if let Ok(bin) = env::var(BIN_ENV) {
            self.binary = bin;
        }
        if let Ok(dir) = env::var(TMPDIR_ENV) {
            let dir = PathBuf::from(dir);
            self.input_dir = dir.clone();
            self.output_dir = dir;
        }
        self
    }

    /// [`RendererConfig::timeout_secs`] as a duration.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

fn default_temp_dir() -> PathBuf {
    env::temp_dir().join("htmlpress")
}
