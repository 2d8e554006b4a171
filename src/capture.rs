//! Screen capture
//!
//! Shells out to whichever screenshot tool is installed. When targeting the
//! focused window, window tools come first:
//! - screencapture -l - macOS, window id from CoreGraphics via osascript
//! - grim -g - Hyprland or Sway, geometry from hyprctl / swaymsg
//! - import -window - X11, window id from xdotool
//!
//! A window tool fails when no focused window can be found, and the chain
//! moves on to the full-screen tools:
//! 1. screencapture - macOS built-in
//! 2. grim - Wayland (wlroots compositors)
//! 3. gnome-screenshot - GNOME on X11 or Wayland
//! 4. scrot - X11
//! 5. import - ImageMagick, X11
//!
//! Every capture writes a fresh PNG into the temp directory. The caller owns
//! the resulting [`CaptureArtifact`] and hands it back to
//! [`CaptureService::discard`] when done.

use crate::config::CaptureTarget;
use crate::error::CaptureError;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// A captured screenshot on disk
#[derive(Debug, PartialEq, Eq)]
pub struct CaptureArtifact {
    path: PathBuf,
    byte_size: u64,
    format: &'static str,
}

impl CaptureArtifact {
    /// Describe an existing PNG file; fails if it is missing or empty
    pub fn from_png(path: impl Into<PathBuf>) -> Result<Self, CaptureError> {
        let path = path.into();
        let byte_size = std::fs::metadata(&path)?.len();
        if byte_size == 0 {
            return Err(CaptureError::Failed(format!(
                "{} is empty",
                path.display()
            )));
        }
        Ok(Self {
            path,
            byte_size,
            format: "png",
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    pub fn format(&self) -> &'static str {
        self.format
    }

    /// Read the image into memory
    pub fn read(&self) -> Result<Vec<u8>, CaptureError> {
        Ok(std::fs::read(&self.path)?)
    }
}

/// Trait for screen capture implementations
///
/// Both methods block; they run on the pipeline's background unit.
pub trait CaptureService: Send + Sync {
    /// Capture the full screen into a new artifact
    fn capture(&self) -> Result<CaptureArtifact, CaptureError>;

    /// Delete the artifact from storage
    ///
    /// Takes ownership so an artifact cannot be discarded twice. Failures are
    /// logged, not returned.
    fn discard(&self, artifact: CaptureArtifact);

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Placeholder in tool arguments replaced by the located window
pub const WINDOW_PLACEHOLDER: &str = "{window}";

/// Finds the focused window for a window tool
///
/// Runs `program args...` and hands its stdout to `parse`, which extracts
/// the window id or geometry substituted for [`WINDOW_PLACEHOLDER`].
#[derive(Debug, Clone)]
pub struct WindowLocator {
    pub program: String,
    pub args: Vec<String>,
    pub parse: fn(&str) -> Option<String>,
}

impl WindowLocator {
    pub fn new(program: &str, args: &[&str], parse: fn(&str) -> Option<String>) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            parse,
        }
    }

    fn locate(&self) -> Result<String, CaptureError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| CaptureError::Failed(format!("{}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(CaptureError::Failed(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }

        (self.parse)(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            CaptureError::Failed(format!("{} found no focused window", self.program))
        })
    }
}

/// One external screenshot program, invoked as `program args... <path>`
#[derive(Debug, Clone)]
pub struct ScreenshotTool {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    /// Set for window tools; fills in [`WINDOW_PLACEHOLDER`] before each run
    pub locator: Option<WindowLocator>,
}

impl ScreenshotTool {
    pub fn new(name: &str, program: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            locator: None,
        }
    }

    /// Capture the window found by `locator` instead of a fixed target
    pub fn with_locator(mut self, locator: WindowLocator) -> Self {
        self.locator = Some(locator);
        self
    }

    /// Check if the program (and its locator) is on PATH
    pub fn is_available(&self) -> bool {
        which::which(&self.program).is_ok()
            && self
                .locator
                .as_ref()
                .map_or(true, |l| which::which(&l.program).is_ok())
    }

    /// Arguments for this run, with the focused window filled in
    fn resolve_args(&self) -> Result<Vec<String>, CaptureError> {
        let Some(locator) = &self.locator else {
            return Ok(self.args.clone());
        };
        let window = locator.locate()?;
        tracing::debug!("{}: focused window {}", self.name, window);
        Ok(self
            .args
            .iter()
            .map(|arg| arg.replace(WINDOW_PLACEHOLDER, &window))
            .collect())
    }

    /// Run the tool, writing the screenshot to `path`
    fn run(&self, path: &Path) -> Result<(), CaptureError> {
        let args = self.resolve_args()?;
        let output = Command::new(&self.program)
            .args(&args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| CaptureError::Failed(format!("{}: {}", self.name, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            return Err(CaptureError::Failed(if detail.is_empty() {
                format!("{} exited with {}", self.name, output.status)
            } else {
                format!("{}: {}", self.name, detail)
            }));
        }

        Ok(())
    }
}

/// Frontmost normal window that is not ours, skipping the Window Server
const MACOS_FRONT_WINDOW: &str = r#"function run(argv) {
  ObjC.import('CoreGraphics');
  var own = parseInt(argv[0], 10);
  var windows = ObjC.deepUnwrap(ObjC.castRefToObject($.CGWindowListCopyWindowInfo(
    $.kCGWindowListOptionOnScreenOnly | $.kCGWindowListExcludeDesktopElements,
    $.kCGNullWindowID)));
  for (var i = 0; i < windows.length; i++) {
    var w = windows[i];
    if (w.kCGWindowLayer !== 0) continue;
    if (w.kCGWindowOwnerName === 'Window Server') continue;
    if (w.kCGWindowOwnerPID === own) continue;
    return String(w.kCGWindowNumber);
  }
  return '';
}"#;

/// Numeric window id, as printed by xdotool or the macOS script
pub fn parse_window_id(stdout: &str) -> Option<String> {
    let id = stdout.trim();
    (!id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())).then(|| id.to_string())
}

/// grim geometry from `hyprctl -j activewindow`
pub fn parse_hyprland_geometry(stdout: &str) -> Option<String> {
    let window: Value = serde_json::from_str(stdout).ok()?;
    let at = window.get("at")?.as_array()?;
    let size = window.get("size")?.as_array()?;
    geometry(
        at.first()?.as_i64()?,
        at.get(1)?.as_i64()?,
        size.first()?.as_i64()?,
        size.get(1)?.as_i64()?,
    )
}

/// grim geometry of the focused container in `swaymsg -t get_tree`
pub fn parse_sway_geometry(stdout: &str) -> Option<String> {
    let tree: Value = serde_json::from_str(stdout).ok()?;
    let node = find_focused(&tree)?;

    // An empty workspace can hold focus; that is not a window
    if !matches!(
        node.get("type").and_then(Value::as_str),
        Some("con") | Some("floating_con")
    ) {
        return None;
    }

    let rect = node.get("rect")?;
    geometry(
        rect.get("x")?.as_i64()?,
        rect.get("y")?.as_i64()?,
        rect.get("width")?.as_i64()?,
        rect.get("height")?.as_i64()?,
    )
}

fn find_focused(node: &Value) -> Option<&Value> {
    if node.get("focused").and_then(Value::as_bool) == Some(true) {
        return Some(node);
    }
    ["nodes", "floating_nodes"]
        .iter()
        .filter_map(|key| node.get(*key).and_then(Value::as_array))
        .flatten()
        .find_map(find_focused)
}

fn geometry(x: i64, y: i64, width: i64, height: i64) -> Option<String> {
    (width > 0 && height > 0).then(|| format!("{},{} {}x{}", x, y, width, height))
}

/// Tools that capture only the focused window, for this session
fn window_tools() -> Vec<ScreenshotTool> {
    let mut tools = Vec::new();

    if cfg!(target_os = "macos") {
        let own_pid = std::process::id().to_string();
        let locator = WindowLocator::new(
            "osascript",
            &["-l", "JavaScript", "-e", MACOS_FRONT_WINDOW, own_pid.as_str()],
            parse_window_id,
        );
        tools.push(
            ScreenshotTool::new(
                "screencapture-window",
                "screencapture",
                &["-x", "-o", "-l", WINDOW_PLACEHOLDER],
            )
            .with_locator(locator),
        );
    }

    if std::env::var_os("WAYLAND_DISPLAY").is_some() {
        if std::env::var_os("HYPRLAND_INSTANCE_SIGNATURE").is_some() {
            let locator =
                WindowLocator::new("hyprctl", &["-j", "activewindow"], parse_hyprland_geometry);
            tools.push(
                ScreenshotTool::new("grim-hyprland", "grim", &["-g", WINDOW_PLACEHOLDER])
                    .with_locator(locator),
            );
        }
        if std::env::var_os("SWAYSOCK").is_some() {
            let locator = WindowLocator::new("swaymsg", &["-t", "get_tree"], parse_sway_geometry);
            tools.push(
                ScreenshotTool::new("grim-sway", "grim", &["-g", WINDOW_PLACEHOLDER])
                    .with_locator(locator),
            );
        }
    } else if std::env::var_os("DISPLAY").is_some() {
        let locator = WindowLocator::new("xdotool", &["getactivewindow"], parse_window_id);
        tools.push(
            ScreenshotTool::new("import-window", "import", &["-window", WINDOW_PLACEHOLDER])
                .with_locator(locator),
        );
    }

    tools
}

/// Known screenshot tools in preference order for `target`
///
/// Window tools, when wanted, are followed by the full-screen chain.
pub fn default_tools(target: CaptureTarget) -> Vec<ScreenshotTool> {
    let mut tools = match target {
        CaptureTarget::Window => window_tools(),
        CaptureTarget::Screen => Vec::new(),
    };

    if cfg!(target_os = "macos") {
        // -x: no sound, -o: no window shadow
        tools.push(ScreenshotTool::new("screencapture", "screencapture", &["-x", "-o"]));
    }

    if std::env::var_os("WAYLAND_DISPLAY").is_some() {
        tools.push(ScreenshotTool::new("grim", "grim", &[]));
    }

    tools.push(ScreenshotTool::new("gnome-screenshot", "gnome-screenshot", &["-f"]));
    tools.push(ScreenshotTool::new("scrot", "scrot", &["-o"]));
    tools.push(ScreenshotTool::new("import", "import", &["-window", "root"]));

    tools
}

/// Capture via the first working tool in a chain
#[derive(Debug)]
pub struct ScreenshotCapture {
    tools: Vec<ScreenshotTool>,
    dir: PathBuf,
}

impl ScreenshotCapture {
    /// Use `tools` in order, writing screenshots into `dir`
    pub fn new(tools: Vec<ScreenshotTool>, dir: impl Into<PathBuf>) -> Self {
        Self {
            tools,
            dir: dir.into(),
        }
    }

    pub fn tools(&self) -> &[ScreenshotTool] {
        &self.tools
    }
}

impl CaptureService for ScreenshotCapture {
    fn capture(&self) -> Result<CaptureArtifact, CaptureError> {
        let mut last_error = CaptureError::NoTool;

        for tool in &self.tools {
            // Deleted on drop unless the capture succeeds
            let temp = tempfile::Builder::new()
                .prefix("clue-")
                .suffix(".png")
                .tempfile_in(&self.dir)?
                .into_temp_path();

            match tool.run(&temp).and_then(|()| CaptureArtifact::from_png(temp.to_path_buf())) {
                Ok(artifact) => {
                    temp.keep().map_err(|e| CaptureError::Io(e.error))?;
                    tracing::debug!(
                        "Captured {} bytes via {} to {:?}",
                        artifact.byte_size,
                        tool.name,
                        artifact.path
                    );
                    return Ok(artifact);
                }
                Err(e) => {
                    tracing::warn!("{} failed: {}, trying next", tool.name, e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    fn discard(&self, artifact: CaptureArtifact) {
        match std::fs::remove_file(&artifact.path) {
            Ok(()) => tracing::debug!("Removed screenshot {:?}", artifact.path),
            Err(e) => tracing::warn!("Failed to remove screenshot {:?}: {}", artifact.path, e),
        }
    }

    fn name(&self) -> &'static str {
        "screenshot"
    }
}

/// Factory function building the capture chain from installed tools
pub fn create_capture_service(target: CaptureTarget) -> Result<ScreenshotCapture, CaptureError> {
    let tools: Vec<ScreenshotTool> = default_tools(target)
        .into_iter()
        .filter(|tool| {
            let available = tool.is_available();
            if !available {
                tracing::debug!("{} not available", tool.name);
            }
            available
        })
        .collect();

    if tools.is_empty() {
        return Err(CaptureError::NoTool);
    }

    tracing::info!(
        "Screenshot tools: {}",
        tools
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(ScreenshotCapture::new(tools, std::env::temp_dir()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(name: &str, script: &str) -> ScreenshotTool {
        // `sh -c script path` exposes the path as $0
        ScreenshotTool::new(name, "sh", &["-c", script])
    }

    fn files_in(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_empty_chain_is_no_tool() {
        let dir = tempfile::tempdir().unwrap();
        let capture = ScreenshotCapture::new(vec![], dir.path());
        assert!(matches!(capture.capture(), Err(CaptureError::NoTool)));
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_and_discard() {
        let dir = tempfile::tempdir().unwrap();
        let capture = ScreenshotCapture::new(
            vec![sh("fake", r#"printf '\211PNG' > "$0""#)],
            dir.path(),
        );

        let artifact = capture.capture().unwrap();
        assert_eq!(artifact.format(), "png");
        assert_eq!(artifact.byte_size(), 4);
        assert!(artifact.path().starts_with(dir.path()));
        assert_eq!(artifact.read().unwrap(), b"\x89PNG");

        let path = artifact.path().to_path_buf();
        capture.discard(artifact);
        assert!(!path.exists());
        assert_eq!(files_in(dir.path()), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_carries_stderr_and_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let capture = ScreenshotCapture::new(
            vec![sh("fake", "echo 'cannot open display' >&2; exit 1")],
            dir.path(),
        );

        let err = capture.capture().unwrap_err();
        assert!(err.to_string().contains("cannot open display"));
        assert_eq!(files_in(dir.path()), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_falls_back_to_next_tool() {
        let dir = tempfile::tempdir().unwrap();
        let capture = ScreenshotCapture::new(
            vec![
                sh("broken", "exit 2"),
                sh("empty", "true"),
                sh("working", r#"printf 'png!' > "$0""#),
            ],
            dir.path(),
        );

        let artifact = capture.capture().unwrap();
        assert_eq!(artifact.byte_size(), 4);
        assert_eq!(files_in(dir.path()), 1);
        capture.discard(artifact);
    }

    #[test]
    fn test_missing_program_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ScreenshotTool::new("ghost", "clue-no-such-screenshot-tool", &[]);
        assert!(!tool.is_available());

        let capture = ScreenshotCapture::new(vec![tool], dir.path());
        assert!(matches!(capture.capture(), Err(CaptureError::Failed(_))));
    }

    #[test]
    fn test_default_tools_order() {
        let names: Vec<String> = default_tools(CaptureTarget::Screen)
            .into_iter()
            .map(|t| t.name)
            .collect();
        let gnome = names.iter().position(|n| n == "gnome-screenshot").unwrap();
        let import = names.iter().position(|n| n == "import").unwrap();
        assert!(gnome < import);
        if cfg!(target_os = "macos") {
            assert_eq!(names[0], "screencapture");
        }
    }

    #[test]
    fn test_window_tools_precede_screen_chain() {
        let screen = default_tools(CaptureTarget::Screen);
        let window = default_tools(CaptureTarget::Window);
        assert!(screen.iter().all(|t| t.locator.is_none()));

        let split = window.len() - screen.len();
        assert!(window[..split].iter().all(|t| t.locator.is_some()));
        let tail: Vec<&str> = window[split..].iter().map(|t| t.name.as_str()).collect();
        let expected: Vec<&str> = screen.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(tail, expected);
    }

    fn window_sh(name: &str, locate: &str, parse: fn(&str) -> Option<String>) -> ScreenshotTool {
        // `sh -c script window path`: window is $0, path is $1
        ScreenshotTool::new(
            name,
            "sh",
            &["-c", r#"printf '%s' "$0" > "$1""#, WINDOW_PLACEHOLDER],
        )
        .with_locator(WindowLocator::new("sh", &["-c", locate], parse))
    }

    #[cfg(unix)]
    #[test]
    fn test_located_window_is_passed_to_tool() {
        let dir = tempfile::tempdir().unwrap();
        let capture = ScreenshotCapture::new(
            vec![window_sh("window", "echo 4242", parse_window_id)],
            dir.path(),
        );

        let artifact = capture.capture().unwrap();
        assert_eq!(artifact.read().unwrap(), b"4242");
        capture.discard(artifact);
    }

    #[cfg(unix)]
    #[test]
    fn test_no_focused_window_falls_back_to_screen() {
        let dir = tempfile::tempdir().unwrap();
        let capture = ScreenshotCapture::new(
            vec![
                window_sh("locator-fails", "exit 1", parse_window_id),
                window_sh("no-window", "echo '{}'", parse_hyprland_geometry),
                sh("screen", r#"printf 'full' > "$0""#),
            ],
            dir.path(),
        );

        let artifact = capture.capture().unwrap();
        assert_eq!(artifact.read().unwrap(), b"full");
        assert_eq!(files_in(dir.path()), 1);
        capture.discard(artifact);
        assert_eq!(files_in(dir.path()), 0);
    }

    #[test]
    fn test_missing_locator_makes_tool_unavailable() {
        let tool = ScreenshotTool::new("window", "sh", &[]).with_locator(WindowLocator::new(
            "clue-no-such-locator",
            &[],
            parse_window_id,
        ));
        assert!(!tool.is_available());
    }

    #[test]
    fn test_parse_window_id() {
        assert_eq!(parse_window_id("73400323\n"), Some("73400323".to_string()));
        assert_eq!(parse_window_id(""), None);
        assert_eq!(parse_window_id("\n"), None);
        assert_eq!(parse_window_id("Error: no window"), None);
    }

    #[test]
    fn test_parse_hyprland_geometry() {
        let active = r#"{"address":"0x5a","at":[12,40],"size":[1280,720],"class":"kitty"}"#;
        assert_eq!(parse_hyprland_geometry(active), Some("12,40 1280x720".to_string()));
        assert_eq!(parse_hyprland_geometry("{}"), None);
        assert_eq!(parse_hyprland_geometry("Invalid"), None);
        assert_eq!(
            parse_hyprland_geometry(r#"{"at":[0,0],"size":[0,0]}"#),
            None
        );
    }

    #[test]
    fn test_parse_sway_geometry() {
        let tree = r#"{
            "type": "root", "focused": false,
            "nodes": [{
                "type": "output", "focused": false,
                "nodes": [{
                    "type": "workspace", "focused": false,
                    "nodes": [
                        {"type": "con", "focused": false, "nodes": [],
                         "rect": {"x": 0, "y": 0, "width": 960, "height": 1080}}
                    ],
                    "floating_nodes": [
                        {"type": "floating_con", "focused": true, "nodes": [],
                         "rect": {"x": 100, "y": 50, "width": 640, "height": 480}}
                    ]
                }]
            }]
        }"#;
        assert_eq!(parse_sway_geometry(tree), Some("100,50 640x480".to_string()));

        let empty_workspace = r#"{
            "type": "root", "focused": false,
            "nodes": [{"type": "workspace", "focused": true, "nodes": [],
                       "rect": {"x": 0, "y": 0, "width": 1920, "height": 1080}}]
        }"#;
        assert_eq!(parse_sway_geometry(empty_workspace), None);
    }
}
