//! Console line model.
//!
//! A [`Line`] is one rendered row of the console pane. The [`LineKind`] only
//! selects how the row is styled; it carries no other meaning.

use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Time format used in rendered lines.
pub const TIMESTAMP_FORMAT: &str = "%H:%M:%S";

/// Classification of a console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineKind {
    /// A command typed locally (local echo).
    Command,
    /// A status message produced by the console itself.
    System,
    /// A transport error.
    Error,
    /// A frame received from the remote process.
    ServerOutput,
}

impl LineKind {
    /// Prefix placed between the timestamp and the text.
    pub fn prefix(&self) -> &'static str {
        match self {
            LineKind::Command => "$ ",
            LineKind::System => "[SYSTEM] ",
            LineKind::Error => "[ERROR] ",
            LineKind::ServerOutput => "",
        }
    }
}

impl fmt::Display for LineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LineKind::Command => "command",
            LineKind::System => "system",
            LineKind::Error => "error",
            LineKind::ServerOutput => "server-output",
        };
        f.write_str(name)
    }
}

/// A timestamped console line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    /// Position in the session's output; assigned by the buffer, strictly
    /// increasing, never reused.
    pub seq: u64,
    /// Capture time.
    pub timestamp: DateTime<Local>,
    /// Rendering style.
    pub kind: LineKind,
    /// Raw text, exactly as sent or received.
    pub text: String,
}

impl Line {
    /// Creates a line captured now. The sequence number is assigned when the
    /// line is appended to a buffer.
    pub fn new(kind: LineKind, text: impl Into<String>) -> Self {
        Self {
            seq: 0,
            timestamp: Local::now(),
            kind,
            text: text.into(),
        }
    }

    pub fn command(text: impl Into<String>) -> Self {
        Self::new(LineKind::Command, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(LineKind::System, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(LineKind::Error, text)
    }

    pub fn server_output(text: impl Into<String>) -> Self {
        Self::new(LineKind::ServerOutput, text)
    }

    /// Renders the line as `[HH:MM:SS] {prefix}{text}`.
    ///
    /// A trailing line terminator in `text` is not rendered; the row itself
    /// is the line break.
    pub fn render(&self) -> String {
        format!(
            "[{}] {}{}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.kind.prefix(),
            self.text.trim_end_matches(['\r', '\n'])
        )
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_noon(kind: LineKind, text: &str) -> Line {
        Line {
            seq: 1,
            timestamp: Local.with_ymd_and_hms(2024, 5, 1, 12, 3, 4).unwrap(),
            kind,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_render_per_kind() {
        assert_eq!(
            at_noon(LineKind::Command, "say hello").render(),
            "[12:03:04] $ say hello"
        );
        assert_eq!(
            at_noon(LineKind::System, "Connected to server console").render(),
            "[12:03:04] [SYSTEM] Connected to server console"
        );
        assert_eq!(
            at_noon(LineKind::Error, "boom").render(),
            "[12:03:04] [ERROR] boom"
        );
        assert_eq!(
            at_noon(LineKind::ServerOutput, "Server started").render(),
            "[12:03:04] Server started"
        );
    }

    #[test]
    fn test_render_drops_trailing_newline_only() {
        let line = at_noon(LineKind::ServerOutput, "Done (3.2s)!\r\n");
        assert_eq!(line.render(), "[12:03:04] Done (3.2s)!");
        assert_eq!(line.text, "Done (3.2s)!\r\n");
    }

    #[test]
    fn test_text_is_kept_verbatim() {
        let line = Line::server_output("  <b>raw</b>\t");
        assert_eq!(line.text, "  <b>raw</b>\t");
        assert_eq!(line.kind, LineKind::ServerOutput);
    }

    #[test]
    fn test_kind_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&LineKind::ServerOutput).unwrap(),
            "\"server-output\""
        );
        assert_eq!(LineKind::ServerOutput.to_string(), "server-output");
    }
}
