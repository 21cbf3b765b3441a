use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::config::RendererConfig;
use crate::error::{RenderError, Result};
use crate::options::RenderOptions;
use crate::source::{RequestOrigin, SourceMode};
use crate::store::{remove_best_effort, HtmlStore};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A single conversion: the HTML and everything specific to this call.
#[derive(Debug, Clone, Default)]
pub struct RenderRequest {
    html: String,
    options: RenderOptions,
    destination: Option<PathBuf>,
    origin: Option<RequestOrigin>,
}

impl RenderRequest {
    /// A request for `html` with no extra options.
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            ..Default::default()
        }
    }

    /// Extra flags for this call, merged over the renderer's own options.
    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    /// Write the PDF here instead of a generated path.
    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// The request the render is performed for, used for callback URLs.
    pub fn with_origin(mut self, origin: RequestOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    /// The HTML to render.
    pub fn html(&self) -> &str {
        &self.html
    }
}

/// A produced PDF.
#[derive(Debug, Clone)]
pub struct RenderResult {
    /// The PDF document.
    pub artifact: Vec<u8>,
    /// Where the renderer wrote it. The file is left in place.
    pub produced_path: PathBuf,
}

/// Converts HTML to PDF by running an external renderer such as wkhtmltopdf.
///
/// Each call stores the HTML under a fresh id, runs
/// `<binary> <options...> <source> <destination>` and waits for it to exit.
/// Temporary input and captured output are removed on every exit path, so a
/// renderer can be shared between threads.
#[derive(Debug, Clone)]
pub struct Renderer {
    binary: String,
    options: RenderOptions,
    store: HtmlStore,
    output_dir: PathBuf,
    source: SourceMode,
    accepted_exit_codes: Vec<i32>,
    timeout: Option<Duration>,
    cancel: Option<Arc<AtomicBool>>,
}

impl Renderer {
    /// A renderer for `binary` with a fixed set of options and default
    /// directories. The binary is only checked when rendering.
    pub fn configure(binary: impl Into<String>, options: RenderOptions) -> Self {
        Self::from_config(RendererConfig {
            binary: binary.into(),
            options,
            ..Default::default()
        })
    }

    /// A renderer set up entirely from `config`.
    pub fn from_config(config: RendererConfig) -> Self {
        let timeout = config.timeout();
        Self {
            binary: config.binary,
            options: config.options,
            store: HtmlStore::new(config.input_dir),
            output_dir: config.output_dir,
            source: config.source,
            accepted_exit_codes: config.accepted_exit_codes,
            timeout,
            cancel: None,
        }
    }

    /// Use these directories for input HTML and for generated PDFs.
    pub fn with_temp_dirs(mut self, input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        self.store = HtmlStore::new(input_dir);
        self.output_dir = output_dir.into();
        self
    }

    /// Point the renderer at its input through `source`.
    pub fn with_source(mut self, source: SourceMode) -> Self {
        self.source = source;
        self
    }

    /// Kill the renderer if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Kill the renderer as soon as `flag` is set.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// The renderer executable.
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Flags passed on every call.
    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// The store input HTML is written to, for serving callback requests.
    pub fn store(&self) -> &HtmlStore {
        &self.store
    }

    /// Render `html` into `destination`, or into a generated path in the output
    /// directory, and return the path of the PDF.
    pub fn render_to_file(&self, html: &str, destination: Option<&Path>) -> Result<PathBuf> {
        self.convert(html, &self.options, destination, None)
            .map(|(path, _)| path)
    }

    /// Render `html` and return the PDF bytes. Nothing is left on disk.
    pub fn render_to_bytes(&self, html: &str) -> Result<Vec<u8>> {
        let path = self.render_to_file(html, None)?;
        let bytes = read_artifact(&path);
        remove_best_effort(&path);
        bytes
    }

    /// Render a request. The PDF stays at [`RenderResult::produced_path`].
    pub fn render(&self, request: &RenderRequest) -> Result<RenderResult> {
        let options = self.options.merged(&request.options);
        let (produced_path, generated) = self.convert(
            &request.html,
            &options,
            request.destination.as_deref(),
            request.origin.as_ref(),
        )?;
        let artifact = match read_artifact(&produced_path) {
            Ok(artifact) => artifact,
            Err(e) => {
                if generated {
                    remove_best_effort(&produced_path);
                }
                return Err(e);
            }
        };
        Ok(RenderResult {
            artifact,
            produced_path,
        })
    }

    /// The command line for diagnostics, quoted for a POSIX shell.
    pub fn command_line(&self, options: &RenderOptions, source: &str, destination: &Path) -> String {
        let destination = destination.to_string_lossy();
        std::iter::once(self.binary.clone())
            .chain(options.to_args())
            .chain([source.to_string(), destination.into_owned()])
            .map(|token| shell_quote(&token))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run the renderer and return the destination, and whether it was
    /// generated rather than supplied by the caller.
    fn convert(
        &self,
        html: &str,
        options: &RenderOptions,
        destination: Option<&Path>,
        origin: Option<&RequestOrigin>,
    ) -> Result<(PathBuf, bool)> {
        options.validate()?;

        if self.binary.trim().is_empty() {
            return Err(RenderError::Configuration(
                "renderer binary is empty".to_string(),
            ));
        }

        let slot = self.store.reserve();
        let source = self.source.reference(&slot.id, &slot.path, origin)?;
        let requested = destination.filter(|d| !d.as_os_str().is_empty());
        let generated = requested.is_none();
        let destination = match requested {
            Some(destination) => destination.to_path_buf(),
            None => self.output_dir.join(format!("{}.pdf", Uuid::new_v4().simple())),
        };
        if source.is_empty() {
            return Err(RenderError::Configuration(
                "source reference is empty".to_string(),
            ));
        }

        fs::create_dir_all(&self.output_dir).map_err(RenderError::io(&self.output_dir))?;
        self.store.write(&slot, html)?;

        let mut args = options.to_args();
        args.push(source.clone());
        args.push(destination.to_string_lossy().into_owned());
        let command = self.command_line(options, &source, &destination);

        let outcome = self.execute(&args, &command);
        remove_best_effort(&slot.path);

        if outcome.is_err() && generated && destination.exists() {
            remove_best_effort(&destination);
        }
        outcome.map(|_| (destination, generated))
    }

    fn execute(&self, args: &[String], command: &str) -> Result<()> {
        let capture_path = self
            .output_dir
            .join(format!("{}.out", Uuid::new_v4().simple()));
        let stdout = File::create(&capture_path).map_err(RenderError::io(&capture_path))?;
        let stderr = stdout.try_clone().map_err(RenderError::io(&capture_path))?;

        log::debug!("running {}", command);
        let started = Instant::now();
        let status = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|source| RenderError::Spawn {
                command: command.to_string(),
                source,
            })
            .and_then(|child| self.wait(child, command));

        let output = fs::read(&capture_path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .map_err(RenderError::io(&capture_path));
        remove_best_effort(&capture_path);

        let status = status?;
        let output = output?;
        log::debug!("renderer exited with {} after {:?}", status, started.elapsed());

        match status.code() {
            Some(code) if self.accepted_exit_codes.contains(&code) => {
                if !output.trim().is_empty() {
                    log::warn!("{}", output.trim_end());
                }
                Ok(())
            }
            exit_code => {
                log::warn!("renderer failed ({:?}): {}", exit_code, command);
                Err(RenderError::Failed {
                    exit_code,
                    output,
                    command: command.to_string(),
                })
            }
        }
    }

    fn wait(&self, mut child: Child, command: &str) -> Result<ExitStatus> {
        let wait_error = |source: io::Error| RenderError::Spawn {
            command: command.to_string(),
            source,
        };

        if self.timeout.is_none() && self.cancel.is_none() {
            return child.wait().map_err(wait_error);
        }

        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait().map_err(wait_error)? {
                return Ok(status);
            }
            if self
                .cancel
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::Relaxed))
            {
                kill(&mut child);
                return Err(RenderError::Cancelled {
                    command: command.to_string(),
                });
            }
            if let Some(timeout) = self.timeout {
                if started.elapsed() >= timeout {
                    kill(&mut child);
                    return Err(RenderError::Timeout {
                        after: timeout,
                        command: command.to_string(),
                    });
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::debug!("could not kill renderer: {}", e);
    }
    if let Err(e) = child.wait() {
        log::debug!("could not reap renderer: {}", e);
    }
}

fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    let bytes = fs::read(path).map_err(RenderError::io(path))?;
    if bytes.is_empty() {
        return Err(RenderError::Io {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::UnexpectedEof, "renderer produced an empty file"),
        });
    }
    Ok(bytes)
}

/// Quote `token` for a POSIX shell, leaving plain words alone.
pub fn shell_quote(token: &str) -> String {
    let plain = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=@%+,".contains(c));
    if plain {
        token.to_string()
    } else {
        format!("'{}'", token.replace('\'', r"'\''"))
    }
}
