use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use htmlpress::{inspect, RenderOptions, Renderer, RendererConfig};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "htmlpress")]
#[command(version, about = "Render HTML to PDF with an external renderer", long_about = None)]
struct Cli {
    /// TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Renderer executable, overrides the config and HTMLPRESS_BIN
    #[arg(long, global = true)]
    bin: Option<String>,

    /// Renderer flag as `name` or `name=value`, repeatable
    #[arg(short = 'O', long = "option", global = true)]
    options: Vec<String>,

    /// Kill the renderer after this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a single HTML file
    Convert {
        input: PathBuf,

        /// Output file, defaults to the input with a .pdf extension
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Check that the result parses as a PDF
        #[arg(long)]
        verify: bool,
    },
    /// Render every .html/.htm file below a directory
    Batch {
        dir: PathBuf,

        /// Output directory, defaults to next to each input
        #[arg(long)]
        out: Option<PathBuf>,

        /// Number of renderers to run at once
        #[arg(short, long, default_value_t = 4)]
        jobs: usize,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let renderer = build_renderer(&cli)?;

    match &cli.command {
        Commands::Convert {
            input,
            output,
            verify,
        } => {
            let output = output.clone().unwrap_or_else(|| input.with_extension("pdf"));
            convert(&renderer, input, &output)?;
            if *verify {
                let bytes = std::fs::read(&output)
                    .with_context(|| format!("reading {}", output.display()))?;
                let pages = inspect::page_count(&bytes)?;
                log::info!("{}: {} page(s)", output.display(), pages);
            }
        }
        Commands::Batch { dir, out, jobs } => batch(&renderer, dir, out.as_deref(), *jobs)?,
    }

    Ok(())
}

fn build_renderer(cli: &Cli) -> anyhow::Result<Renderer> {
    let mut config = match &cli.config {
        Some(path) => RendererConfig::from_file(path)?,
        None => RendererConfig::default(),
    }
    .apply_env();

    if let Some(bin) = &cli.bin {
        config.binary = bin.clone();
    }
    if !cli.options.is_empty() {
        let extra: RenderOptions = cli
            .options
            .iter()
            .map(|pair| RenderOptions::parse_pair(pair))
            .collect();
        config.options = config.options.merged(&extra);
    }
    if let Some(secs) = cli.timeout {
        config.timeout_secs = Some(secs);
    }

    Ok(Renderer::from_config(config))
}

fn convert(renderer: &Renderer, input: &Path, output: &Path) -> anyhow::Result<()> {
    let html = std::fs::read_to_string(input)
        .with_context(|| format!("reading {}", input.display()))?;
    renderer
        .render_to_file(&html, Some(output))
        .with_context(|| format!("rendering {}", input.display()))?;
    log::info!("rendered {} to {}", input.display(), output.display());
    Ok(())
}

fn batch(renderer: &Renderer, dir: &Path, out: Option<&Path>, jobs: usize) -> anyhow::Result<()> {
    let files: Vec<_> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_html(e.path()))
        .map(|e| e.into_path())
        .collect();

    let planned = plan_outputs(dir, out, &files)?;

    if let Some(out) = out {
        std::fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .context("building thread pool")?;

    let failures: Vec<(PathBuf, anyhow::Error)> = pool.install(|| {
        planned
            .par_iter()
            .filter_map(|(input, output)| {
                convert(renderer, input, output)
                    .err()
                    .map(|e| (input.clone(), e))
            })
            .collect()
    });

    for (input, error) in &failures {
        log::error!("{}: {:#}", input.display(), error);
    }
    log::info!(
        "rendered {} of {} file(s)",
        files.len() - failures.len(),
        files.len()
    );

    if !failures.is_empty() {
        bail!("{} file(s) failed to render", failures.len());
    }
    Ok(())
}

/// Pair every input with its output file. Two inputs that would write the same
/// PDF, such as `a.html` and `a.htm`, are an error.
fn plan_outputs(
    dir: &Path,
    out: Option<&Path>,
    files: &[PathBuf],
) -> anyhow::Result<Vec<(PathBuf, PathBuf)>> {
    let mut claimed: HashMap<PathBuf, &Path> = HashMap::new();
    let mut planned = Vec::with_capacity(files.len());
    for input in files {
        let output = match out {
            Some(out) => out.join(output_name(dir, input)),
            None => input.with_extension("pdf"),
        };
        if let Some(previous) = claimed.insert(output.clone(), input) {
            bail!(
                "{} and {} would both render to {}",
                previous.display(),
                input.display(),
                output.display()
            );
        }
        planned.push((input.clone(), output));
    }
    Ok(planned)
}

fn is_html(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"))
}

/// Flatten the path below `root` into a single file name, so that files with
/// the same name in different directories do not overwrite each other.
fn output_name(root: &Path, input: &Path) -> PathBuf {
    let relative = input.strip_prefix(root).unwrap_or(input).with_extension("pdf");
    let name = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("-");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outputs_flatten_subdirectories() {
        let files = vec![
            PathBuf::from("/docs/index.html"),
            PathBuf::from("/docs/guide/index.html"),
        ];
        let planned = plan_outputs(Path::new("/docs"), Some(Path::new("/pdf")), &files).unwrap();

        assert_eq!(planned[0].1, PathBuf::from("/pdf/index.pdf"));
        assert_eq!(planned[1].1, PathBuf::from("/pdf/guide-index.pdf"));
    }

    #[test]
    fn html_and_htm_with_the_same_stem_collide() {
        let files = vec![PathBuf::from("/docs/a.html"), PathBuf::from("/docs/a.htm")];

        let err = plan_outputs(Path::new("/docs"), None, &files).unwrap_err();
        assert!(err.to_string().contains("a.pdf"), "{err}");

        let err = plan_outputs(Path::new("/docs"), Some(Path::new("/pdf")), &files).unwrap_err();
        assert!(err.to_string().contains("/pdf/a.pdf"), "{err}");
    }

    #[test]
    fn recognises_html_extensions() {
        assert!(is_html(Path::new("a.HTML")));
        assert!(is_html(Path::new("a.htm")));
        assert!(!is_html(Path::new("a.pdf")));
        assert!(!is_html(Path::new("html")));
    }
}
