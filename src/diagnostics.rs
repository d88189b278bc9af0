//! Diagnostic reporting.
//!
//! An append-only sink of `[start, end)` byte-range reports, rendered as
//! `path:line,col: error: message` followed by the offending source line
//! and a caret/tilde underline, in the style of the original Millie
//! implementation's `Errors`/`ErrorReport` list.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub start: usize,
    pub end: usize,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    reports: Vec<Report>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn report(&mut self, start: usize, end: usize, message: String) {
        self.reports.push(Report { start, end, message });
    }

    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    pub fn has_errors(&self) -> bool {
        !self.reports.is_empty()
    }
}

/// Renders reports against `path`/`source` in the caret-underline format.
pub struct Renderer<'a> {
    pub path: &'a str,
    pub source: &'a str,
}

impl<'a> Renderer<'a> {
    fn line_col(&self, byte_offset: usize) -> (usize, usize, usize, usize) {
        let mut line = 1;
        let mut line_start = 0;
        for (i, c) in self.source.char_indices() {
            if i >= byte_offset {
                break;
            }
            if c == '\n' {
                line += 1;
                line_start = i + 1;
            }
        }
        let col = byte_offset - line_start + 1;
        let line_end = self.source[line_start..]
            .find('\n')
            .map(|i| line_start + i)
            .unwrap_or(self.source.len());
        (line, col, line_start, line_end)
    }

    pub fn render(&self, report: &Report) -> String {
        let (line, col, line_start, line_end) = self.line_col(report.start);
        let source_line = &self.source[line_start..line_end];

        let underline_len = if report.end > report.start {
            (report.end - report.start).min(line_end - report.start).max(1)
        } else {
            1
        };
        let mut underline = String::new();
        for _ in 0..(col - 1) {
            underline.push(' ');
        }
        underline.push('^');
        for _ in 1..underline_len {
            underline.push('~');
        }

        format!(
            "{path}:{line},{col}: error: {message}\n{source_line}\n{underline}",
            path = self.path,
            line = line,
            col = col,
            message = report.message,
            source_line = source_line,
            underline = underline,
        )
    }

    pub fn render_all(&self, diagnostics: &Diagnostics) -> String {
        diagnostics
            .reports()
            .iter()
            .map(|r| self.render(r))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}): {}", self.start, self.end, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_caret_under_reported_range() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.report(8, 9, "Unbound identifier".to_owned());

        let renderer = Renderer {
            path: "test.millie",
            source: "let x = y",
        };
        let rendered = renderer.render_all(&diagnostics);
        assert!(rendered.contains("test.millie:1,9: error: Unbound identifier"));
        assert!(rendered.contains("let x = y"));
        assert!(rendered.ends_with('^'));
    }
}
