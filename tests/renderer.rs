#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use htmlpress::{RenderError, RenderOptions, RenderRequest, Renderer, RequestOrigin, SourceMode};
use tempdir::TempDir;

/// Writes its arguments to `args.log`, copies the source to the destination
/// when it is a readable file, prints `message` and exits with `exit_code`.
fn fake_renderer(dir: &Path, exit_code: i32, message: &str) -> PathBuf {
    let script_path = dir.join("fakepdf");
    let script = format!(
        r#"#!/bin/sh
printf '%s\n' "$@" > "{args}"
src=""
dst=""
for arg; do src="$dst"; dst="$arg"; done
if [ -f "$src" ]; then
  cat "$src" > "$dst"
else
  printf '%%PDF-1.4 fake' > "$dst"
fi
echo "{message}"
exit {exit_code}
"#,
        args = dir.join("args.log").display(),
    );
    write_script(&script_path, &script);
    script_path
}

fn write_script(path: &Path, script: &str) {
    fs::write(path, script).expect("write script");
    let mut perms = fs::metadata(path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("set perms");
}

fn renderer(dir: &TempDir, binary: &Path, options: RenderOptions) -> Renderer {
    Renderer::configure(binary.to_string_lossy(), options)
        .with_temp_dirs(dir.path().join("in"), dir.path().join("out"))
}

fn recorded_args(dir: &TempDir) -> Vec<String> {
    fs::read_to_string(dir.path().join("args.log"))
        .expect("read args")
        .lines()
        .map(str::to_string)
        .collect()
}

fn entries(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(read) => read.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => vec![],
    }
}

#[test]
fn passes_options_in_order_then_source_and_destination() {
    let dir = TempDir::new("htmlpress").unwrap();
    let script = fake_renderer(dir.path(), 0, "");
    let options = RenderOptions::new().flag("quiet").with("margin-top", "10");
    let renderer = renderer(&dir, &script, options);

    let pdf = renderer.render_to_file("<html>hi</html>", None).unwrap();

    let args = recorded_args(&dir);
    assert_eq!(args.len(), 5);
    assert_eq!(&args[..3], ["--quiet", "--margin-top", "10"]);
    assert!(args[3].starts_with(&dir.path().join("in").to_string_lossy().into_owned()));
    assert!(args[3].ends_with(".htm"));
    assert_eq!(PathBuf::from(&args[4]), pdf);
    assert_eq!(pdf.extension().unwrap(), "pdf");
    assert!(pdf.starts_with(dir.path().join("out")));

    // The renderer saw the HTML, and the input file is gone afterwards.
    assert_eq!(fs::read_to_string(&pdf).unwrap(), "<html>hi</html>");
    assert!(!Path::new(&args[3]).exists());
}

#[test]
fn exit_code_two_is_success() {
    let dir = TempDir::new("htmlpress").unwrap();
    let script = fake_renderer(dir.path(), 2, "warning: font missing");
    let renderer = renderer(&dir, &script, RenderOptions::new());

    let pdf = renderer.render_to_file("<html>hi</html>", None).unwrap();
    assert!(pdf.exists());

    // The warning output is dropped along with its capture file.
    assert_eq!(entries(&dir.path().join("out")), vec![pdf]);
    assert!(entries(&dir.path().join("in")).is_empty());
}

#[test]
fn other_exit_codes_fail_with_diagnostics() {
    let dir = TempDir::new("htmlpress").unwrap();
    let script = fake_renderer(dir.path(), 1, "Error: Failed loading page");
    let renderer = renderer(&dir, &script, RenderOptions::new().flag("quiet"));

    let err = renderer
        .render_to_file("<html>hi</html>", None)
        .expect_err("expected renderer failure");

    let message = err.to_string();
    match err {
        RenderError::Failed {
            exit_code,
            output,
            command,
        } => {
            assert_eq!(exit_code, Some(1));
            assert!(output.contains("Failed loading page"), "output: {output}");
            assert!(command.starts_with(&script.to_string_lossy().into_owned()));
            assert!(command.contains("--quiet"), "command: {command}");
        }
        other => panic!("unexpected error variant: {other:?}"),
    }
    assert!(message.contains("(1)"), "message: {message}");
    assert!(message.contains("Failed loading page"), "message: {message}");
}

#[test]
fn render_to_bytes_leaves_nothing_behind() {
    let dir = TempDir::new("htmlpress").unwrap();
    let script = fake_renderer(dir.path(), 0, "done");
    let renderer = renderer(&dir, &script, RenderOptions::new());

    let bytes = renderer.render_to_bytes("<p>report</p>").unwrap();
    assert_eq!(bytes, b"<p>report</p>");

    assert!(entries(&dir.path().join("in")).is_empty());
    assert!(entries(&dir.path().join("out")).is_empty());
}

#[test]
fn failed_render_leaves_nothing_behind() {
    let dir = TempDir::new("htmlpress").unwrap();
    let script = fake_renderer(dir.path(), 3, "boom");
    let renderer = renderer(&dir, &script, RenderOptions::new());

    assert!(renderer.render_to_bytes("<p>report</p>").is_err());

    assert!(entries(&dir.path().join("in")).is_empty());
    assert!(entries(&dir.path().join("out")).is_empty());
}

#[test]
fn empty_output_is_an_io_error() {
    let dir = TempDir::new("htmlpress").unwrap();
    let script = dir.path().join("silent");
    write_script(&script, "#!/bin/sh\nexit 0\n");
    let renderer = renderer(&dir, &script, RenderOptions::new());

    let err = renderer.render_to_bytes("<p>x</p>").unwrap_err();
    assert!(matches!(err, RenderError::Io { .. }), "got {err:?}");
}

#[test]
fn empty_artifact_from_render_is_removed() {
    let dir = TempDir::new("htmlpress").unwrap();
    let script = dir.path().join("truncating");
    write_script(
        &script,
        "#!/bin/sh\nfor arg; do dst=\"$arg\"; done\n: > \"$dst\"\nexit 0\n",
    );
    let renderer = renderer(&dir, &script, RenderOptions::new());

    let err = renderer.render(&RenderRequest::new("<p>x</p>")).unwrap_err();
    assert!(matches!(err, RenderError::Io { .. }), "got {err:?}");
    assert!(entries(&dir.path().join("out")).is_empty());
    assert!(entries(&dir.path().join("in")).is_empty());

    // A destination chosen by the caller is theirs to clean up.
    let destination = dir.path().join("report.pdf");
    let request = RenderRequest::new("<p>x</p>").with_destination(&destination);
    assert!(renderer.render(&request).is_err());
    assert!(destination.exists());
}

#[test]
fn empty_binary_fails_before_touching_disk() {
    let dir = TempDir::new("htmlpress").unwrap();
    let renderer = renderer(&dir, Path::new(""), RenderOptions::new());

    let err = renderer.render_to_file("<p>x</p>", None).unwrap_err();
    assert!(matches!(err, RenderError::Configuration(_)), "got {err:?}");
    assert!(!dir.path().join("in").exists());
    assert!(!dir.path().join("out").exists());
}

#[test]
fn missing_binary_is_a_spawn_error() {
    let dir = TempDir::new("htmlpress").unwrap();
    let renderer = renderer(&dir, &dir.path().join("no-such-renderer"), RenderOptions::new());

    let err = renderer.render_to_file("<p>x</p>", None).unwrap_err();
    assert!(matches!(err, RenderError::Spawn { .. }), "got {err:?}");
    assert!(entries(&dir.path().join("in")).is_empty());
    assert!(entries(&dir.path().join("out")).is_empty());
}

#[test]
fn concurrent_renders_get_distinct_destinations() {
    let dir = TempDir::new("htmlpress").unwrap();
    let script = dir.path().join("fakepdf");
    write_script(
        &script,
        "#!/bin/sh\nfor arg; do src=\"$dst\"; dst=\"$arg\"; done\ncat \"$src\" > \"$dst\"\necho \"$src\"\n",
    );
    let renderer = Arc::new(renderer(&dir, &script, RenderOptions::new()));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let renderer = Arc::clone(&renderer);
            thread::spawn(move || {
                let html = format!("<p>{i}</p>");
                let path = renderer.render_to_file(&html, None).unwrap();
                (html, path)
            })
        })
        .collect();

    let mut paths = Vec::new();
    for handle in handles {
        let (html, path) = handle.join().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), html);
        paths.push(path);
    }
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 8);
}

#[test]
fn request_options_and_destination() {
    let dir = TempDir::new("htmlpress").unwrap();
    let script = fake_renderer(dir.path(), 0, "");
    let renderer = renderer(&dir, &script, RenderOptions::new().with("dpi", "96").flag("quiet"));
    let destination = dir.path().join("report.pdf");

    let request = RenderRequest::new("<h1>Report</h1>")
        .with_options(RenderOptions::new().with("dpi", "300").with("title", "Q3 Report"))
        .with_destination(&destination);
    let result = renderer.render(&request).unwrap();

    assert_eq!(result.produced_path, destination);
    assert_eq!(result.artifact, b"<h1>Report</h1>");
    assert!(destination.exists());
    assert_eq!(
        &recorded_args(&dir)[..5],
        ["--dpi", "300", "--quiet", "--title", "Q3 Report"]
    );
}

#[test]
fn callback_source_points_at_the_host() {
    let dir = TempDir::new("htmlpress").unwrap();
    let script = fake_renderer(dir.path(), 0, "");
    let renderer = renderer(&dir, &script, RenderOptions::new())
        .with_source(SourceMode::callback(None, Some("cms.example".to_string())));

    let request = RenderRequest::new("<p>x</p>").with_origin(RequestOrigin::new("ignored.example", true));
    renderer.render(&request).unwrap();

    let args = recorded_args(&dir);
    let prefix = "https://cms.example/plugin/Web2Print/temp-file/get?id=";
    assert!(args[0].starts_with(prefix), "source: {}", args[0]);
    assert_eq!(args[0][prefix.len()..].len(), 32);
}

#[test]
fn callback_without_host_is_a_configuration_error() {
    let dir = TempDir::new("htmlpress").unwrap();
    let script = fake_renderer(dir.path(), 0, "");
    let renderer =
        renderer(&dir, &script, RenderOptions::new()).with_source(SourceMode::callback(None, None));

    let err = renderer.render_to_file("<p>x</p>", None).unwrap_err();
    assert!(matches!(err, RenderError::Configuration(_)), "got {err:?}");
    assert!(!dir.path().join("args.log").exists());
}

#[test]
fn slow_renderer_times_out() {
    let dir = TempDir::new("htmlpress").unwrap();
    let script = dir.path().join("slow");
    write_script(&script, "#!/bin/sh\nexec sleep 5\n");
    let renderer =
        renderer(&dir, &script, RenderOptions::new()).with_timeout(Duration::from_millis(200));

    let err = renderer.render_to_bytes("<p>x</p>").unwrap_err();
    assert!(matches!(err, RenderError::Timeout { .. }), "got {err:?}");
    assert!(entries(&dir.path().join("in")).is_empty());
    assert!(entries(&dir.path().join("out")).is_empty());
}

#[test]
fn cancelled_renderer_is_killed() {
    let dir = TempDir::new("htmlpress").unwrap();
    let script = dir.path().join("slow");
    write_script(&script, "#!/bin/sh\nexec sleep 5\n");
    let flag = Arc::new(AtomicBool::new(true));
    let renderer = renderer(&dir, &script, RenderOptions::new()).with_cancel(flag);

    let err = renderer.render_to_file("<p>x</p>", None).unwrap_err();
    assert!(matches!(err, RenderError::Cancelled { .. }), "got {err:?}");
}

#[test]
fn invalid_option_is_rejected_before_running() {
    let dir = TempDir::new("htmlpress").unwrap();
    let script = fake_renderer(dir.path(), 0, "");
    let renderer = renderer(&dir, &script, RenderOptions::new().flag("no such flag"));

    let err = renderer.render_to_file("<p>x</p>", None).unwrap_err();
    assert!(matches!(err, RenderError::Configuration(_)), "got {err:?}");
    assert!(!dir.path().join("args.log").exists());
}
