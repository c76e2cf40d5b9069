use std::io::Write;
use std::path::Path;

use crate::preview::PreviewDocument;
use crate::proposal::Outcome;

/// Where operator-facing text goes.
///
/// Stages receive a presenter explicitly instead of printing, so the same
/// pipeline drives a styled terminal, a pipe, or an in-memory buffer.
pub trait Presenter {
    fn show_preview(&mut self, path: &Path, preview: &PreviewDocument);
    fn show_answer(&mut self, answer: &str);
    fn show_outcome(&mut self, outcome: &Outcome);
    fn show_status(&mut self, message: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorResponse {
    Line(String),
    Interrupted,
    Closed,
}

pub trait OperatorInput {
    /// Blocks for one response to `prompt`.
    fn read_response(&mut self, prompt: &str) -> OperatorResponse;
}

/// Unstyled presenter for pipes, `NO_COLOR`, and tests.
#[derive(Debug)]
pub struct PlainPresenter<W: Write> {
    out: W,
    show_diff: bool,
}

impl<W: Write> PlainPresenter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            show_diff: true,
        }
    }

    pub fn with_diff(mut self, show_diff: bool) -> Self {
        self.show_diff = show_diff;
        self
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: std::fmt::Arguments<'_>) {
        // Presentation is best-effort; a closed pipe must not abort the run.
        if let Err(err) = self.out.write_fmt(text) {
            tracing::warn!(error = %err, "presenter write failed");
        }
    }

    fn flush(&mut self) {
        if let Err(err) = self.out.flush() {
            tracing::warn!(error = %err, "presenter flush failed");
        }
    }
}

impl<W: Write> Presenter for PlainPresenter<W> {
    fn show_preview(&mut self, path: &Path, preview: &PreviewDocument) {
        self.emit(format_args!("Proposed edit to {}\n", path.display()));
        for section in preview.sections() {
            self.emit(format_args!("\n--- {} ---\n", section.label));
            self.emit(format_args!("{}", section.body));
            if !section.body.ends_with('\n') {
                self.emit(format_args!("\n"));
            }
        }
        if self.show_diff && !preview.hunks.is_empty() {
            self.emit(format_args!(
                "\n--- Diff (+{} -{}) ---\n",
                preview.stats.added, preview.stats.removed
            ));
            for hunk in &preview.hunks {
                self.emit(format_args!("{}\n", hunk.header));
                for line in &hunk.lines {
                    self.emit(format_args!("{}{}\n", line.kind.marker(), line.text));
                }
            }
        }
        if preview.is_unchanged() {
            self.emit(format_args!("\n(no changes)\n"));
        }
        self.flush();
    }

    fn show_answer(&mut self, answer: &str) {
        self.emit(format_args!("{answer}\n"));
        self.flush();
    }

    fn show_outcome(&mut self, outcome: &Outcome) {
        match outcome {
            // The answer itself already went through show_answer.
            Outcome::Displayed(_) => {}
            Outcome::Discarded => self.emit(format_args!("Edit discarded; file left untouched.\n")),
            Outcome::Applied(path) => self.emit(format_args!("Applied edit to {}\n", path.display())),
            Outcome::Failed(reason) => self.emit(format_args!("Edit failed: {reason}\n")),
        }
        self.flush();
    }

    fn show_status(&mut self, message: &str) {
        self.emit(format_args!("{message}\n"));
        self.flush();
    }
}

/// Replays canned responses; anything past the script reads as closed input.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    responses: std::collections::VecDeque<OperatorResponse>,
    prompts: Vec<String>,
}

impl ScriptedInput {
    pub fn new(responses: impl IntoIterator<Item = OperatorResponse>) -> Self {
        Self {
            responses: responses.into_iter().collect(),
            prompts: Vec::new(),
        }
    }

    pub fn lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(lines.into_iter().map(|line| OperatorResponse::Line(line.to_string())))
    }

    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }
}

impl OperatorInput for ScriptedInput {
    fn read_response(&mut self, prompt: &str) -> OperatorResponse {
        self.prompts.push(prompt.to_string());
        self.responses.pop_front().unwrap_or(OperatorResponse::Closed)
    }
}
