use serde::Serialize;

/// Pipeline stage a diagnostic or failure was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Generate,
    Parse,
    Validate,
    Compile,
    Run,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// 1-based line/column into the generated translation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub line: u32,
    pub col: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn point(line: u32, col: u32) -> Self {
        let p = Position { line, col };
        Span { start: p, end: p }
    }

    /// Smallest span covering both inputs.
    pub fn merge(self, other: Span) -> Span {
        let start = if (self.start.line, self.start.col) <= (other.start.line, other.start.col) {
            self.start
        } else {
            other.start
        };
        let end = if (self.end.line, self.end.col) >= (other.end.line, other.end.col) {
            self.end
        } else {
            other.end
        };
        Span { start, end }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: String,
    pub severity: Severity,
    pub stage: Stage,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn error(code: &str, stage: Stage, message: String, span: Option<Span>) -> Self {
        Self {
            code: code.to_string(),
            severity: Severity::Error,
            stage,
            message,
            span,
            notes: Vec::new(),
        }
    }

    /// One-line rendering used in outcome messages.
    pub fn render(&self) -> String {
        match self.span {
            Some(span) => format!(
                "{} (line {}, col {}): {}",
                self.code, span.start.line, span.start.col, self.message
            ),
            None => format!("{}: {}", self.code, self.message),
        }
    }
}

/// Sorts diagnostics into a stable order: by position, then code, then message.
pub fn sort_diagnostics(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by(|a, b| {
        let ap = a.span.map(|s| (s.start.line, s.start.col)).unwrap_or((0, 0));
        let bp = b.span.map(|s| (s.start.line, s.start.col)).unwrap_or((0, 0));
        ap.cmp(&bp)
            .then_with(|| a.code.cmp(&b.code))
            .then_with(|| a.message.cmp(&b.message))
    });
}
