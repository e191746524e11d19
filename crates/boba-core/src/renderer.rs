use crossterm::{
    cursor::{MoveToColumn, MoveUp},
    queue,
    terminal::{Clear, ClearType},
};
use std::io::{self, Write};

/// Paints view text to the terminal, erasing the previous paint first.
///
/// The only state is how many lines the last paint wrote. Every repaint is a
/// full rewrite of the view; nothing is diffed.
#[derive(Debug, Default)]
pub struct Renderer {
    lines_rendered: usize,
}

impl Renderer {
    /// Create a renderer that has not painted anything yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lines written by the most recent [`render`](Renderer::render).
    pub fn lines_rendered(&self) -> usize {
        self.lines_rendered
    }

    /// Clear the previous paint and write `view`.
    pub fn render(&mut self, out: &mut impl Write, view: &str) -> io::Result<()> {
        // Raw mode does not translate \n, so move the cursor back to column 0
        // explicitly.
        let view = view.replace('\n', "\r\n");

        if self.lines_rendered > 0 {
            clear_lines(out, self.lines_rendered)?;
        }
        out.write_all(view.as_bytes())?;
        out.flush()?;

        self.lines_rendered = view.matches("\r\n").count();
        tracing::trace!(lines = self.lines_rendered, "repainted view");
        Ok(())
    }
}

/// Erase the current line and the `n` lines above it, leaving the cursor at
/// the start of the topmost one.
fn clear_lines(out: &mut impl Write, n: usize) -> io::Result<()> {
    queue!(out, Clear(ClearType::CurrentLine))?;
    for _ in 0..n {
        queue!(out, MoveUp(1), Clear(ClearType::CurrentLine))?;
    }
    queue!(out, MoveToColumn(0))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const UP: &str = "\x1b[1A";

    #[test]
    fn first_paint_clears_nothing() {
        let mut renderer = Renderer::new();
        let mut out = Vec::new();
        renderer.render(&mut out, "hello\n").unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "hello\r\n");
        assert_eq!(renderer.lines_rendered(), 1);
    }

    #[test]
    fn newlines_become_crlf() {
        let mut renderer = Renderer::new();
        let mut out = Vec::new();
        renderer.render(&mut out, "a\nb\nc").unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a\r\nb\r\nc");
        assert_eq!(renderer.lines_rendered(), 2);
    }

    #[test]
    fn repaint_clears_previous_line_count() {
        let mut renderer = Renderer::new();
        let mut out = Vec::new();
        renderer.render(&mut out, "one\ntwo\nthree\n").unwrap();
        assert_eq!(renderer.lines_rendered(), 3);

        let mut out = Vec::new();
        renderer.render(&mut out, "only\n").unwrap();
        let written = String::from_utf8(out).unwrap();
        assert_eq!(written.matches(UP).count(), 3);
        assert!(written.ends_with("only\r\n"));
        assert_eq!(renderer.lines_rendered(), 1);
    }

    #[test]
    fn clear_sequence_precedes_view() {
        let mut renderer = Renderer::new();
        renderer.render(&mut Vec::new(), "x\n").unwrap();
        let mut out = Vec::new();
        renderer.render(&mut out, "y\n").unwrap();
        let written = String::from_utf8(out).unwrap();
        assert_eq!(written, "\x1b[2K\x1b[1A\x1b[2K\x1b[1Gy\r\n");
    }
}
