//! One capture → analyze → render run
//!
//! A run executes on a background unit and reports to the UI context only
//! through [`UiCommand`]s. Every failure is caught here, formatted as
//! `Error: {message}` and shown in place of a response, so a run always ends
//! with something on screen and a [`UiCommand::Finished`].

use crate::backend::BackendClient;
use crate::capture::{CaptureArtifact, CaptureService};
use crate::display::{UiCommand, UiSender, ANALYZING, ERROR_TITLE, TITLE};
use crate::error::{AnalysisError, ClueError};
use crate::render::{render_lines, Line};
use crate::state::Phase;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Capture service, backend and prompt shared by every run
#[derive(Clone)]
pub struct Pipeline {
    capture: Arc<dyn CaptureService>,
    backend: Arc<dyn BackendClient>,
    prompt: String,
}

impl Pipeline {
    pub fn new(
        capture: Arc<dyn CaptureService>,
        backend: Arc<dyn BackendClient>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            capture,
            backend,
            prompt: prompt.into(),
        }
    }

    /// Execute one run, blocking until it completes
    ///
    /// Returns the error message shown to the user, if the run failed.
    pub fn run(&self, ui: &UiSender) -> Option<String> {
        let error = match self.execute(ui) {
            Ok(()) => None,
            Err(e) => {
                let message = format!("Error: {}", user_message(&e));
                tracing::error!("Run failed: {}", e);
                show_error(ui, &message);
                Some(message)
            }
        };

        post(
            ui,
            UiCommand::Finished {
                error: error.clone(),
            },
        );
        error
    }

    fn execute(&self, ui: &UiSender) -> Result<(), ClueError> {
        post(ui, UiCommand::Phase(Phase::Capturing));
        let artifact = self.capture.capture()?;
        tracing::debug!(
            "Captured {} ({} bytes) via {}",
            artifact.format(),
            artifact.byte_size(),
            self.capture.name()
        );

        // The artifact goes away even if the backend or renderer panics
        let result =
            panic::catch_unwind(AssertUnwindSafe(|| self.analyze_artifact(&artifact, ui)));
        self.capture.discard(artifact);
        result.unwrap_or_else(|payload| panic::resume_unwind(payload))
    }

    fn analyze_artifact(&self, artifact: &CaptureArtifact, ui: &UiSender) -> Result<(), ClueError> {
        post(ui, UiCommand::Phase(Phase::Notifying));
        post(
            ui,
            UiCommand::ShowNotification {
                text: ANALYZING.to_string(),
                thumbnail: Some(artifact.path().to_path_buf()),
            },
        );

        let image = artifact.read()?;

        post(ui, UiCommand::Phase(Phase::Analyzing));
        let lines = analyze_and_render(self.backend.as_ref(), &image, &self.prompt)?;

        post(ui, UiCommand::Phase(Phase::Rendering));
        post(ui, UiCommand::Hide);
        post(
            ui,
            UiCommand::ShowResponse {
                title: TITLE.to_string(),
                lines,
            },
        );
        Ok(())
    }
}

/// Analyze an image and render the answer
pub fn analyze_and_render(
    backend: &dyn BackendClient,
    image: &[u8],
    prompt: &str,
) -> Result<Vec<Line>, AnalysisError> {
    tracing::info!("Analyzing with {} ({})", backend.name(), backend.model());

    let start = Instant::now();
    let text = backend.analyze(image, prompt)?;
    tracing::info!(
        "Analysis completed in {:.2}s ({} chars)",
        start.elapsed().as_secs_f32(),
        text.len()
    );

    Ok(render_lines(&text))
}

/// Message for the user, without the top-level category prefix
fn user_message(error: &ClueError) -> String {
    match error {
        ClueError::Capture(e) => e.to_string(),
        ClueError::Analysis(e) => e.to_string(),
        other => other.to_string(),
    }
}

/// Replace whatever is on screen with an error response
pub(crate) fn show_error(ui: &UiSender, message: &str) {
    post(ui, UiCommand::Hide);
    post(
        ui,
        UiCommand::ShowResponse {
            title: ERROR_TITLE.to_string(),
            lines: render_lines(message),
        },
    );
}

pub(crate) fn post(ui: &UiSender, command: UiCommand) {
    if ui.send(command).is_err() {
        tracing::debug!("UI context gone, dropping display update");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptureError;
    use crate::render::Style;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Writes a fixed PNG into a temp dir, or fails
    struct FakeCapture {
        dir: tempfile::TempDir,
        fail: bool,
        captures: AtomicUsize,
        discarded: Mutex<Vec<PathBuf>>,
    }

    impl FakeCapture {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                dir: tempfile::tempdir().unwrap(),
                fail,
                captures: AtomicUsize::new(0),
                discarded: Mutex::new(Vec::new()),
            })
        }
    }

    impl CaptureService for FakeCapture {
        fn capture(&self) -> Result<CaptureArtifact, CaptureError> {
            if self.fail {
                return Err(CaptureError::Failed("could not connect to display".into()));
            }
            let n = self.captures.fetch_add(1, Ordering::SeqCst);
            let path = self.dir.path().join(format!("shot-{}.png", n));
            std::fs::write(&path, b"\x89PNG fake").unwrap();
            CaptureArtifact::from_png(path)
        }

        fn discard(&self, artifact: CaptureArtifact) {
            std::fs::remove_file(artifact.path()).unwrap();
            self.discarded
                .lock()
                .unwrap()
                .push(artifact.path().to_path_buf());
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    struct FakeBackend {
        answer: Result<String, String>,
        calls: AtomicUsize,
    }

    impl FakeBackend {
        fn answering(text: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: Err(message.to_string()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl BackendClient for FakeBackend {
        fn analyze(&self, image: &[u8], prompt: &str) -> Result<String, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(image, b"\x89PNG fake");
            assert_eq!(prompt, "What is this?");
            self.answer.clone().map_err(AnalysisError::Provider)
        }

        fn name(&self) -> &'static str {
            "fake"
        }

        fn model(&self) -> &str {
            "fake-model"
        }
    }

    fn run(capture: &Arc<FakeCapture>, backend: &Arc<FakeBackend>) -> Vec<UiCommand> {
        let pipeline = Pipeline::new(capture.clone(), backend.clone(), "What is this?");
        let (tx, mut rx) = mpsc::unbounded_channel();
        pipeline.run(&tx);
        drop(tx);

        let mut commands = Vec::new();
        while let Ok(command) = rx.try_recv() {
            commands.push(command);
        }
        commands
    }

    #[test]
    fn test_successful_run() {
        let capture = FakeCapture::new(false);
        let backend = FakeBackend::answering("# Terminal\nRun `ls`");
        let commands = run(&capture, &backend);

        let shot = capture.dir.path().join("shot-0.png");
        assert_eq!(
            commands,
            vec![
                UiCommand::Phase(Phase::Capturing),
                UiCommand::Phase(Phase::Notifying),
                UiCommand::ShowNotification {
                    text: "Analyzing...".into(),
                    thumbnail: Some(shot.clone()),
                },
                UiCommand::Phase(Phase::Analyzing),
                UiCommand::Phase(Phase::Rendering),
                UiCommand::Hide,
                UiCommand::ShowResponse {
                    title: "Clue".into(),
                    lines: render_lines("# Terminal\nRun `ls`"),
                },
                UiCommand::Finished { error: None },
            ]
        );
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*capture.discarded.lock().unwrap(), vec![shot.clone()]);
        assert!(!shot.exists());
    }

    #[test]
    fn test_capture_failure_skips_backend_and_discard() {
        let capture = FakeCapture::new(true);
        let backend = FakeBackend::answering("unused");
        let commands = run(&capture, &backend);

        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(capture.discarded.lock().unwrap().is_empty());

        let message = "Error: Screenshot failed: could not connect to display";
        assert!(commands.contains(&UiCommand::ShowResponse {
            title: "Clue - Error".into(),
            lines: vec![vec![crate::render::StyledSegment::plain(message)]],
        }));
        assert_eq!(
            commands.last(),
            Some(&UiCommand::Finished {
                error: Some(message.into())
            })
        );
        assert!(!commands.contains(&UiCommand::Phase(Phase::Analyzing)));
    }

    #[test]
    fn test_analyze_failure_discards_exactly_once() {
        let capture = FakeCapture::new(false);
        let backend = FakeBackend::failing("Server returned 500: overloaded");
        let commands = run(&capture, &backend);

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(capture.discarded.lock().unwrap().len(), 1);

        match commands.last() {
            Some(UiCommand::Finished { error: Some(message) }) => assert_eq!(
                message,
                "Error: Provider error: Server returned 500: overloaded"
            ),
            other => panic!("unexpected last command: {:?}", other),
        }
        assert!(!commands.contains(&UiCommand::Phase(Phase::Rendering)));
    }

    #[test]
    fn test_runs_after_closed_ui_do_not_panic() {
        let capture = FakeCapture::new(false);
        let backend = FakeBackend::answering("ok");
        let pipeline = Pipeline::new(capture.clone(), backend, "What is this?");

        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        assert_eq!(pipeline.run(&tx), None);
        assert_eq!(capture.discarded.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_analyze_and_render_styles_answer() {
        let backend = FakeBackend::answering("**Yes**");
        let lines = analyze_and_render(backend.as_ref(), b"\x89PNG fake", "What is this?").unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0][1].style, Style::Bold);
        assert_eq!(lines[0][1].text, "Yes");
    }

    struct CrashingBackend;

    impl BackendClient for CrashingBackend {
        fn analyze(&self, _: &[u8], _: &str) -> Result<String, AnalysisError> {
            panic!("renderer bug");
        }

        fn name(&self) -> &'static str {
            "crashing"
        }

        fn model(&self) -> &str {
            "none"
        }
    }

    #[test]
    fn test_backend_panic_still_discards() {
        let capture = FakeCapture::new(false);
        let pipeline =
            Pipeline::new(capture.clone(), Arc::new(CrashingBackend), "What is this?");
        let (tx, _rx) = mpsc::unbounded_channel();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| pipeline.run(&tx)));
        assert!(outcome.is_err());
        assert_eq!(capture.discarded.lock().unwrap().len(), 1);
        assert_eq!(std::fs::read_dir(capture.dir.path()).unwrap().count(), 0);
    }
}
