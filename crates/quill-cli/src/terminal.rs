use std::io;
use std::io::BufRead;
use std::io::IsTerminal;
use std::io::Write;
use std::path::Path;
use std::sync::OnceLock;

use crossterm::event::Event;
use crossterm::event::KeyCode;
use crossterm::event::KeyEvent;
use crossterm::event::KeyEventKind;
use crossterm::event::KeyModifiers;
use crossterm::queue;
use crossterm::style::Attribute;
use crossterm::style::Color;
use crossterm::style::Print;
use crossterm::style::ResetColor;
use crossterm::style::SetAttribute;
use crossterm::style::SetForegroundColor;
use crossterm::terminal::disable_raw_mode;
use crossterm::terminal::enable_raw_mode;
use quill_core::DiffLineKind;
use quill_core::OperatorInput;
use quill_core::OperatorResponse;
use quill_core::Outcome;
use quill_core::Presenter;
use quill_core::PreviewConfig;
use quill_core::PreviewDocument;
use syntect::easy::HighlightLines;
use syntect::highlighting::Theme;
use syntect::highlighting::ThemeSet;
use syntect::parsing::SyntaxReference;
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

const FALLBACK_THEME: &str = "base16-ocean.dark";

static SYNTAX_SET: OnceLock<SyntaxSet> = OnceLock::new();
static THEME_SET: OnceLock<ThemeSet> = OnceLock::new();

fn get_syntax_set() -> &'static SyntaxSet {
    SYNTAX_SET.get_or_init(SyntaxSet::load_defaults_newlines)
}

fn get_theme_set() -> &'static ThemeSet {
    THEME_SET.get_or_init(ThemeSet::load_defaults)
}

fn syntax_for<'a>(set: &'a SyntaxSet, path: &Path, content: &str) -> &'a SyntaxReference {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| set.find_syntax_by_extension(ext))
        .or_else(|| set.find_syntax_by_first_line(content))
        .unwrap_or_else(|| set.find_syntax_plain_text())
}

fn theme_named(name: &str) -> Option<&'static Theme> {
    let themes = &get_theme_set().themes;
    themes.get(name).or_else(|| {
        tracing::warn!(theme = name, "unknown syntax theme; using {FALLBACK_THEME}");
        themes.get(FALLBACK_THEME)
    })
}

/// Splits `body` into coloured runs, one inner vec per line.
fn highlight(body: &str, path: &Path, theme: &Theme) -> Vec<Vec<(Color, String)>> {
    let set = get_syntax_set();
    let mut h = HighlightLines::new(syntax_for(set, path, body), theme);
    LinesWithEndings::from(body)
        .map(|line| match h.highlight_line(line, set) {
            Ok(ranges) => ranges
                .into_iter()
                .map(|(style, text)| {
                    let fg = Color::Rgb {
                        r: style.foreground.r,
                        g: style.foreground.g,
                        b: style.foreground.b,
                    };
                    (fg, text.to_string())
                })
                .collect(),
            Err(_) => vec![(Color::Reset, line.to_string())],
        })
        .collect()
}

/// Styled presenter for an interactive terminal.
pub struct TerminalPresenter<W: Write> {
    out: W,
    show_diff: bool,
    theme: Option<&'static Theme>,
}

impl<W: Write> TerminalPresenter<W> {
    pub fn new(out: W, preview: &PreviewConfig) -> Self {
        Self {
            out,
            show_diff: preview.show_diff,
            theme: theme_named(&preview.theme),
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }

    fn heading(&mut self, label: &str) -> io::Result<()> {
        queue!(
            self.out,
            Print("\n"),
            SetAttribute(Attribute::Bold),
            SetForegroundColor(Color::Cyan),
            Print(format!("─── {label} ───\n")),
            SetAttribute(Attribute::Reset),
            ResetColor
        )
    }

    fn body(&mut self, path: &Path, body: &str) -> io::Result<()> {
        match self.theme {
            Some(theme) => {
                for line in highlight(body, path, theme) {
                    for (color, text) in line {
                        queue!(self.out, SetForegroundColor(color), Print(text))?;
                    }
                }
                queue!(self.out, ResetColor)?;
            }
            None => queue!(self.out, Print(body))?,
        }
        if !body.ends_with('\n') {
            queue!(self.out, Print("\n"))?;
        }
        Ok(())
    }

    fn write_preview(&mut self, path: &Path, preview: &PreviewDocument) -> io::Result<()> {
        queue!(
            self.out,
            SetAttribute(Attribute::Bold),
            Print(format!("Proposed edit to {}\n", path.display())),
            SetAttribute(Attribute::Reset)
        )?;

        self.heading(preview.explanation.label)?;
        queue!(self.out, Print(&preview.explanation.body), Print("\n"))?;
        self.heading(preview.before.label)?;
        self.body(path, &preview.before.body)?;
        self.heading(preview.after.label)?;
        self.body(path, &preview.after.body)?;

        if self.show_diff && !preview.hunks.is_empty() {
            self.heading(&format!(
                "Diff (+{} -{})",
                preview.stats.added, preview.stats.removed
            ))?;
            for hunk in &preview.hunks {
                queue!(
                    self.out,
                    SetForegroundColor(Color::Magenta),
                    Print(&hunk.header),
                    Print("\n")
                )?;
                for line in &hunk.lines {
                    let color = match line.kind {
                        DiffLineKind::Add => Color::Green,
                        DiffLineKind::Remove => Color::Red,
                        DiffLineKind::Context => Color::DarkGrey,
                    };
                    queue!(
                        self.out,
                        SetForegroundColor(color),
                        Print(line.kind.marker()),
                        Print(&line.text),
                        Print("\n")
                    )?;
                }
            }
            queue!(self.out, ResetColor)?;
        }
        if preview.is_unchanged() {
            queue!(
                self.out,
                SetForegroundColor(Color::Yellow),
                Print("\n(no changes)\n"),
                ResetColor
            )?;
        }
        self.out.flush()
    }

    fn finish(&mut self, result: io::Result<()>) {
        if let Err(err) = result.and_then(|()| self.out.flush()) {
            tracing::warn!(error = %err, "terminal write failed");
        }
    }
}

impl<W: Write> Presenter for TerminalPresenter<W> {
    fn show_preview(&mut self, path: &Path, preview: &PreviewDocument) {
        let result = self.write_preview(path, preview);
        self.finish(result);
    }

    fn show_answer(&mut self, answer: &str) {
        let result = queue!(self.out, Print(answer), Print("\n"));
        self.finish(result);
    }

    fn show_outcome(&mut self, outcome: &Outcome) {
        let (color, text) = match outcome {
            Outcome::Displayed(_) => return,
            Outcome::Discarded => (Color::Yellow, "Edit discarded; file left untouched.".to_string()),
            Outcome::Applied(path) => (Color::Green, format!("Applied edit to {}", path.display())),
            Outcome::Failed(reason) => (Color::Red, format!("Edit failed: {reason}")),
        };
        let result = queue!(
            self.out,
            SetForegroundColor(color),
            Print(text),
            ResetColor,
            Print("\n")
        );
        self.finish(result);
    }

    fn show_status(&mut self, message: &str) {
        let result = queue!(
            self.out,
            SetForegroundColor(Color::DarkGrey),
            Print(message),
            ResetColor,
            Print("\n")
        );
        self.finish(result);
    }
}

struct RawModeGuard;

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Reads the operator's answer from stdin.
pub struct TerminalInput {
    interactive: bool,
}

impl TerminalInput {
    pub fn detect() -> Self {
        Self {
            interactive: io::stdin().is_terminal(),
        }
    }

    fn read_raw_line(&self, out: &mut impl Write) -> io::Result<OperatorResponse> {
        enable_raw_mode()?;
        let _guard = RawModeGuard; // restores cooked mode on every return
        let mut line = String::new();
        loop {
            let Event::Key(key) = crossterm::event::read()? else {
                continue;
            };
            if key.kind == KeyEventKind::Release {
                continue;
            }
            match key_effect(&key, line.is_empty()) {
                KeyEffect::Submit => {
                    queue!(out, Print("\r\n"))?;
                    out.flush()?;
                    return Ok(OperatorResponse::Line(line));
                }
                KeyEffect::Interrupt => {
                    queue!(out, Print("^C\r\n"))?;
                    out.flush()?;
                    return Ok(OperatorResponse::Interrupted);
                }
                KeyEffect::Erase => {
                    if line.pop().is_some() {
                        queue!(out, Print("\u{8} \u{8}"))?;
                    }
                }
                KeyEffect::Insert(c) => {
                    line.push(c);
                    queue!(out, Print(c))?;
                }
                KeyEffect::Ignore => {}
            }
            out.flush()?;
        }
    }

    fn read_cooked_line(&self) -> OperatorResponse {
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) => OperatorResponse::Closed,
            Ok(_) => OperatorResponse::Line(line),
            Err(err) => {
                tracing::warn!(error = %err, "cannot read operator response");
                OperatorResponse::Closed
            }
        }
    }
}

impl OperatorInput for TerminalInput {
    fn read_response(&mut self, prompt: &str) -> OperatorResponse {
        let mut out = io::stdout();
        if let Err(err) = queue!(out, SetAttribute(Attribute::Bold), Print(prompt), SetAttribute(Attribute::Reset))
            .and_then(|()| out.flush())
        {
            tracing::warn!(error = %err, "cannot show prompt");
        }
        if !self.interactive {
            return self.read_cooked_line();
        }
        match self.read_raw_line(&mut out) {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, "cannot read operator response");
                OperatorResponse::Closed
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyEffect {
    Submit,
    Interrupt,
    Erase,
    Insert(char),
    Ignore,
}

fn key_effect(key: &KeyEvent, line_empty: bool) -> KeyEffect {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Enter => KeyEffect::Submit,
        KeyCode::Esc => KeyEffect::Interrupt,
        KeyCode::Char('c') if ctrl => KeyEffect::Interrupt,
        KeyCode::Char('d') if ctrl && line_empty => KeyEffect::Interrupt,
        KeyCode::Backspace => KeyEffect::Erase,
        KeyCode::Char(c) if !ctrl => KeyEffect::Insert(c),
        _ => KeyEffect::Ignore,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;
    use quill_core::render;

    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn interrupt_keys_map_to_interrupt() {
        assert_eq!(key_effect(&key(KeyCode::Esc, KeyModifiers::NONE), false), KeyEffect::Interrupt);
        assert_eq!(
            key_effect(&key(KeyCode::Char('c'), KeyModifiers::CONTROL), false),
            KeyEffect::Interrupt
        );
        assert_eq!(
            key_effect(&key(KeyCode::Char('d'), KeyModifiers::CONTROL), true),
            KeyEffect::Interrupt
        );
        assert_eq!(
            key_effect(&key(KeyCode::Char('d'), KeyModifiers::CONTROL), false),
            KeyEffect::Ignore
        );
    }

    #[test]
    fn typing_and_enter() {
        assert_eq!(
            key_effect(&key(KeyCode::Char('y'), KeyModifiers::NONE), true),
            KeyEffect::Insert('y')
        );
        assert_eq!(
            key_effect(&key(KeyCode::Char('Y'), KeyModifiers::SHIFT), true),
            KeyEffect::Insert('Y')
        );
        assert_eq!(key_effect(&key(KeyCode::Enter, KeyModifiers::NONE), true), KeyEffect::Submit);
        assert_eq!(key_effect(&key(KeyCode::Backspace, KeyModifiers::NONE), false), KeyEffect::Erase);
    }

    #[test]
    fn syntax_follows_extension() {
        let set = get_syntax_set();
        assert_eq!(syntax_for(set, Path::new("src/lib.rs"), "").name, "Rust");
        assert_eq!(syntax_for(set, Path::new("app.py"), "").name, "Python");
        assert_eq!(syntax_for(set, Path::new("NOTES"), "").name, "Plain Text");
    }

    #[test]
    fn highlighting_preserves_text() {
        let theme = theme_named(FALLBACK_THEME).expect("bundled theme");
        let body = "fn main() {\n    println!(\"hi\");\n}\n";
        let joined: String = highlight(body, Path::new("main.rs"), theme)
            .into_iter()
            .flatten()
            .map(|(_, text)| text)
            .collect();
        assert_eq!(joined, body);
    }

    #[test]
    fn unknown_theme_falls_back() {
        assert!(theme_named("no-such-theme").is_some());
    }

    #[test]
    fn preview_contains_every_section() {
        let mut presenter = TerminalPresenter::new(Vec::new(), &PreviewConfig::default());
        presenter.show_preview(Path::new("a.txt"), &render("old\n", "new\n", "rename it"));
        presenter.show_outcome(&Outcome::Applied(PathBuf::from("a.txt")));
        let out = String::from_utf8(presenter.into_inner()).expect("utf8");
        for needle in ["Explanation", "rename it", "Before", "old", "After", "new", "Applied edit to a.txt"] {
            assert!(out.contains(needle), "missing {needle:?}");
        }
    }
}
