/*!
# Motivation
The purpose of this crate is to turn HTML into PDF by driving an external renderer, usually
[wkhtmltopdf](https://wkhtmltopdf.org). Rendering HTML well is a job for a browser engine, and
there is no point in reimplementing one. What is left is the plumbing around it: putting the HTML
somewhere the renderer can read it, building the command line, interpreting the exit code and
making sure no temporary files are left behind, whatever happens.

# Usage
```no_run
use htmlpress::{RenderOptions, Renderer};

let options = RenderOptions::new().flag("quiet").with("margin-top", "10");
let renderer = Renderer::configure("/usr/local/bin/wkhtmltopdf", options);
let pdf = renderer.render_to_bytes("<html><body>Hello</body></html>").unwrap();
```

A [`Renderer`] can also be built from a [`RendererConfig`], which is usually loaded from a TOML
file. The `HTMLPRESS_BIN` and `HTMLPRESS_TMPDIR` environment variables override the binary and
the temporary directories.

# Sources
By default the renderer is handed the path of the stored HTML file. In deployments where the
HTML references assets relative to a web application, use [`SourceMode::Callback`] instead: the
renderer is then handed a URL on the host application, and the application serves the stored
document back with [`HtmlStore::fetch`]. The host in that URL is the configured hostname, the
configured domain or the host of the [`RequestOrigin`], in that order.

# Exit codes
wkhtmltopdf exits with 0 on success and with 2 when the document was produced but some
resources failed to load. Both are treated as success; anything else is a
[`RenderError::Failed`] carrying the exit code, the renderer's output and the command line.

# Concurrency
Every call uses its own input file, output file and capture file, so a single [`Renderer`] can
be shared between threads. Nothing limits how many renderers run at once though, and each one is
a separate process with its own file descriptors. Bound the parallelism on the caller side.
*/

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
pub mod inspect;
mod options;
mod renderer;
mod source;
mod store;

pub use config::*;
pub use error::*;
pub use options::*;
pub use renderer::*;
pub use source::*;
pub use store::*;
