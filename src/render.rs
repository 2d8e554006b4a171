//! Markdown-subset rendering
//!
//! Converts a model response into styled segments for the display surface.
//! Supported syntax is deliberately small:
//! - `#`, `##`, `###` headers (whole remainder styled, no inline parsing)
//! - `- ` / `* ` bullets (rewritten with a bullet glyph)
//! - `1. ` ordered items (prefix kept)
//! - `**bold**`, `*italic*` and `` `code` `` inline spans
//! - fenced code blocks
//!
//! Rendering is line oriented. The only state carried between lines is
//! whether we are inside a fenced code block.

/// Style tag attached to a run of text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Style {
    Plain,
    H1,
    H2,
    H3,
    Bold,
    Italic,
    InlineCode,
    CodeBlock,
}

impl Style {
    /// Short lowercase tag, as used in logs and tests
    pub fn tag(&self) -> &'static str {
        match self {
            Style::Plain => "plain",
            Style::H1 => "h1",
            Style::H2 => "h2",
            Style::H3 => "h3",
            Style::Bold => "bold",
            Style::Italic => "italic",
            Style::InlineCode => "inline_code",
            Style::CodeBlock => "code_block",
        }
    }
}

/// One styled run of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledSegment {
    pub text: String,
    pub style: Style,
}

impl StyledSegment {
    pub fn new(style: Style, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(Style::Plain, text)
    }
}

/// Segments belonging to one displayed line
pub type Line = Vec<StyledSegment>;

const FENCE: &str = "```";
const BULLET: &str = "  • ";

/// Render text into a flat, ordered sequence of segments
pub fn render(text: &str) -> Vec<StyledSegment> {
    render_lines(text).into_iter().flatten().collect()
}

/// Render text keeping line boundaries, for surfaces that lay out lines
///
/// A fenced code block occupies a single line entry holding one
/// [`Style::CodeBlock`] segment with the fence lines stripped.
pub fn render_lines(text: &str) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut code_buffer: Option<Vec<&str>> = None;

    for line in text.split('\n') {
        if line.starts_with(FENCE) {
            match code_buffer.take() {
                Some(buffer) => lines.push(vec![StyledSegment::new(
                    Style::CodeBlock,
                    buffer.join("\n"),
                )]),
                None => code_buffer = Some(Vec::new()),
            }
            continue;
        }

        if let Some(buffer) = code_buffer.as_mut() {
            buffer.push(line);
            continue;
        }

        lines.push(render_line(line));
    }

    // Unterminated fence: flush what we have
    if let Some(buffer) = code_buffer {
        lines.push(vec![StyledSegment::new(Style::CodeBlock, buffer.join("\n"))]);
    }

    lines
}

/// Classify a single line outside of a code block
fn render_line(line: &str) -> Line {
    if let Some(rest) = line.strip_prefix("### ") {
        vec![StyledSegment::new(Style::H3, rest)]
    } else if let Some(rest) = line.strip_prefix("## ") {
        vec![StyledSegment::new(Style::H2, rest)]
    } else if let Some(rest) = line.strip_prefix("# ") {
        vec![StyledSegment::new(Style::H1, rest)]
    } else if let Some(rest) = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
    {
        render_inline(&format!("{}{}", BULLET, rest))
    } else if is_ordered_item(line) {
        render_inline(&format!("  {}", line))
    } else {
        render_inline(line)
    }
}

/// `<digits>. ` at the start of the line
fn is_ordered_item(line: &str) -> bool {
    let digits = line.bytes().take_while(|b| b.is_ascii_digit()).count();
    digits > 0 && line[digits..].starts_with(". ")
}

/// Split text into alternating plain and styled segments
///
/// Scans left to right; at each position the first matching span kind wins,
/// in the order bold, italic, code. Spans are non-greedy and never nest.
/// Every span is preceded by a plain segment and the text always ends with
/// one, so empty plain segments appear at the edges and between adjacent
/// spans.
pub fn render_inline(text: &str) -> Vec<StyledSegment> {
    let mut segments = Vec::new();
    let mut plain_start = 0;
    let mut pos = 0;

    while pos < text.len() {
        match match_span(text, pos) {
            Some((style, inner, end)) => {
                segments.push(StyledSegment::plain(&text[plain_start..pos]));
                segments.push(StyledSegment::new(style, inner));
                pos = end;
                plain_start = end;
            }
            None => pos += 1,
        }
    }

    segments.push(StyledSegment::plain(&text[plain_start..]));
    segments
}

/// Try to match a span starting at byte offset `pos`
///
/// Returns the style, the inner text and the byte offset just past the span.
/// Delimiters are ASCII, so every offset returned is a char boundary.
fn match_span(text: &str, pos: usize) -> Option<(Style, &str, usize)> {
    if !matches!(text.as_bytes()[pos], b'*' | b'`') {
        return None;
    }
    let rest = &text[pos..];

    if rest.starts_with("**") {
        if let Some(close) = rest[2..].find("**") {
            let inner = &rest[2..2 + close];
            return Some((Style::Bold, inner, pos + 2 + close + 2));
        }
    }

    if rest.starts_with('*') {
        if let Some(close) = rest[1..].find('*') {
            // A bare `**` with no closing pair still pairs up as an empty run
            let style = if close == 0 { Style::Bold } else { Style::Italic };
            let inner = &rest[1..1 + close];
            return Some((style, inner, pos + 1 + close + 1));
        }
        return None;
    }

    if rest.starts_with('`') {
        if let Some(close) = rest[1..].find('`') {
            if close > 0 {
                let inner = &rest[1..1 + close];
                return Some((Style::InlineCode, inner, pos + 1 + close + 1));
            }
        }
    }

    None
}
