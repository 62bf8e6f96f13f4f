//! Terminal rendering of console lines.

use std::io::{self, Write};

use crossterm::style::{Color, Stylize};
use protocol::{Line, LineKind};

/// Colour used for each line kind.
pub fn color_for(kind: LineKind) -> Color {
    match kind {
        LineKind::Command => Color::Blue,
        LineKind::System => Color::Yellow,
        LineKind::Error => Color::Red,
        LineKind::ServerOutput => Color::Green,
    }
}

/// Writes rendered lines, optionally coloured.
#[derive(Debug, Clone, Copy)]
pub struct LineRenderer {
    color: bool,
}

impl LineRenderer {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    pub fn plain() -> Self {
        Self::new(false)
    }

    pub fn is_colored(&self) -> bool {
        self.color
    }

    /// The line as it should appear on the terminal.
    pub fn format(&self, line: &Line) -> String {
        let text = line.render();
        if self.color {
            text.with(color_for(line.kind)).to_string()
        } else {
            text
        }
    }

    pub fn write_line<W: Write>(&self, out: &mut W, line: &Line) -> io::Result<()> {
        writeln!(out, "{}", self.format(line))?;
        out.flush()
    }
}
