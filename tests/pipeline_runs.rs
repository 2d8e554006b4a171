//! Pipeline runs with in-memory capture and backend doubles

use clue::backend::BackendClient;
use clue::capture::{CaptureArtifact, CaptureService};
use clue::display::{TerminalSurface, UiCommand};
use clue::error::{AnalysisError, CaptureError};
use clue::pipeline::Pipeline;
use clue::state::State;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

struct DirCapture {
    dir: tempfile::TempDir,
    fail: bool,
    discards: AtomicUsize,
}

impl DirCapture {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            dir: tempfile::tempdir().unwrap(),
            fail,
            discards: AtomicUsize::new(0),
        })
    }

    fn leftover_files(&self) -> usize {
        std::fs::read_dir(self.dir.path()).unwrap().count()
    }
}

impl CaptureService for DirCapture {
    fn capture(&self) -> Result<CaptureArtifact, CaptureError> {
        if self.fail {
            return Err(CaptureError::Failed("grim: compositor doesn't support wlr-screencopy".into()));
        }
        let path = self.dir.path().join("shot.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\n").unwrap();
        CaptureArtifact::from_png(path)
    }

    fn discard(&self, artifact: CaptureArtifact) {
        self.discards.fetch_add(1, Ordering::SeqCst);
        let _ = std::fs::remove_file(artifact.path());
    }

    fn name(&self) -> &'static str {
        "dir"
    }
}

struct CountingBackend {
    reply: Result<&'static str, &'static str>,
    calls: AtomicUsize,
}

impl BackendClient for CountingBackend {
    fn analyze(&self, _image: &[u8], _prompt: &str) -> Result<String, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply
            .map(str::to_string)
            .map_err(|e| AnalysisError::Auth(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "counting"
    }

    fn model(&self) -> &str {
        "test"
    }
}

fn backend(reply: Result<&'static str, &'static str>) -> Arc<CountingBackend> {
    Arc::new(CountingBackend {
        reply,
        calls: AtomicUsize::new(0),
    })
}

/// Run once on a blocking thread and replay the commands onto a surface
async fn run_and_display(
    capture: Arc<DirCapture>,
    backend: Arc<CountingBackend>,
) -> (State, String) {
    let pipeline = Pipeline::new(capture, backend, "Explain");
    let (tx, mut rx) = mpsc::unbounded_channel();

    tokio::task::spawn_blocking(move || pipeline.run(&tx))
        .await
        .unwrap();

    let mut state = State::Idle;
    let mut surface = TerminalSurface::new(Vec::new(), false, false);
    while let Some(command) = rx.recv().await {
        let done = matches!(command, UiCommand::Finished { .. });
        clue::daemon::handle_ui_command(&mut state, &mut surface, command);
        if done {
            break;
        }
    }

    (state, String::from_utf8(surface.into_inner()).unwrap())
}

#[tokio::test]
async fn successful_run_shows_rendered_answer() {
    let capture = DirCapture::new(false);
    let backend = backend(Ok("# Stack trace\n- check **line 3**"));

    let (state, output) = run_and_display(capture.clone(), backend.clone()).await;

    assert!(state.is_idle());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    assert_eq!(capture.discards.load(Ordering::SeqCst), 1);
    assert_eq!(capture.leftover_files(), 0);
    assert!(output.contains("Analyzing..."));
    assert!(output.contains("Clue\n\nStack trace\n  • check line 3\n"));
}

#[tokio::test]
async fn capture_failure_never_reaches_backend() {
    let capture = DirCapture::new(true);
    let backend = backend(Ok("unused"));

    let (state, output) = run_and_display(capture.clone(), backend.clone()).await;

    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    assert_eq!(capture.discards.load(Ordering::SeqCst), 0);
    assert_eq!(state.name(), "error");
    assert!(output.contains("Clue - Error"));
    assert!(output.contains(
        "Error: Screenshot failed: grim: compositor doesn't support wlr-screencopy"
    ));
}

#[tokio::test]
async fn auth_failure_discards_capture_once() {
    let capture = DirCapture::new(false);
    let backend = backend(Err("Token refresh failed: Server returned 400: invalid_grant"));

    let (state, output) = run_and_display(capture.clone(), backend.clone()).await;

    assert_eq!(capture.discards.load(Ordering::SeqCst), 1);
    assert_eq!(capture.leftover_files(), 0);
    assert_eq!(
        state,
        State::Error {
            message: "Error: Authentication error: Token refresh failed: Server returned 400: invalid_grant"
                .into()
        }
    );
    assert!(output.contains("invalid_grant"));
}
