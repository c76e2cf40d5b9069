use similar::ChangeTag;
use similar::TextDiff;

pub const DEFAULT_CONTEXT_LINES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewSection {
    pub label: &'static str,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLineKind {
    Context,
    Add,
    Remove,
}

impl DiffLineKind {
    pub fn marker(self) -> char {
        match self {
            Self::Context => ' ',
            Self::Add => '+',
            Self::Remove => '-',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: DiffLineKind,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffHunk {
    pub header: String,
    pub lines: Vec<DiffLine>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub added: usize,
    pub removed: usize,
}

/// Inert before/after presentation of a proposed edit.
///
/// The full bodies are always present; `hunks` is a line-level view layered
/// on top that a presenter may show or skip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewDocument {
    pub explanation: PreviewSection,
    pub before: PreviewSection,
    pub after: PreviewSection,
    pub hunks: Vec<DiffHunk>,
    pub stats: DiffStats,
}

impl PreviewDocument {
    pub fn is_unchanged(&self) -> bool {
        self.before.body == self.after.body
    }

    pub fn sections(&self) -> [&PreviewSection; 3] {
        [&self.explanation, &self.before, &self.after]
    }
}

pub fn render(original: &str, proposed: &str, explanation: &str) -> PreviewDocument {
    render_with_context(original, proposed, explanation, DEFAULT_CONTEXT_LINES)
}

pub fn render_with_context(
    original: &str,
    proposed: &str,
    explanation: &str,
    context_lines: usize,
) -> PreviewDocument {
    let (hunks, stats) = line_diff(original, proposed, context_lines);
    PreviewDocument {
        explanation: PreviewSection {
            label: "Explanation",
            body: explanation.to_string(),
        },
        before: PreviewSection {
            label: "Before",
            body: original.to_string(),
        },
        after: PreviewSection {
            label: "After",
            body: proposed.to_string(),
        },
        hunks,
        stats,
    }
}

fn line_diff(original: &str, proposed: &str, context_lines: usize) -> (Vec<DiffHunk>, DiffStats) {
    let diff = TextDiff::from_lines(original, proposed);
    let mut stats = DiffStats::default();
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => stats.added += 1,
            ChangeTag::Delete => stats.removed += 1,
            ChangeTag::Equal => {}
        }
    }

    let mut hunks = Vec::new();
    for group in diff.grouped_ops(context_lines) {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let old_start = first.old_range().start;
        let old_len = last.old_range().end - old_start;
        let new_start = first.new_range().start;
        let new_len = last.new_range().end - new_start;

        let mut lines = Vec::new();
        for op in &group {
            for change in diff.iter_changes(op) {
                let kind = match change.tag() {
                    ChangeTag::Equal => DiffLineKind::Context,
                    ChangeTag::Insert => DiffLineKind::Add,
                    ChangeTag::Delete => DiffLineKind::Remove,
                };
                lines.push(DiffLine {
                    kind,
                    text: change
                        .value()
                        .trim_end_matches(|c: char| c == '\n' || c == '\r')
                        .to_string(),
                });
            }
        }
        hunks.push(DiffHunk {
            header: format!(
                "@@ -{},{} +{},{} @@",
                old_start + 1,
                old_len,
                new_start + 1,
                new_len
            ),
            lines,
        });
    }
    (hunks, stats)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn sections_are_labeled_and_carry_full_bodies() {
        let doc = render("a\nb\n", "a\nc\n", "swap b for c");
        let labels: Vec<&str> = doc.sections().iter().map(|s| s.label).collect();
        assert_eq!(labels, vec!["Explanation", "Before", "After"]);
        assert_eq!(doc.before.body, "a\nb\n");
        assert_eq!(doc.after.body, "a\nc\n");
        assert_eq!(doc.explanation.body, "swap b for c");
    }

    #[test]
    fn single_line_change_produces_one_hunk() {
        let original = "fn x() {\n    1\n}\n";
        let proposed = "// returns one\nfn x() {\n    1\n}\n";
        let doc = render(original, proposed, "");
        assert_eq!(doc.stats, DiffStats { added: 1, removed: 0 });
        assert_eq!(doc.hunks.len(), 1);
        assert_eq!(doc.hunks[0].header, "@@ -1,3 +1,4 @@");
        assert_eq!(
            doc.hunks[0].lines[0],
            DiffLine {
                kind: DiffLineKind::Add,
                text: "// returns one".to_string()
            }
        );
    }

    #[test]
    fn distant_changes_split_into_hunks() {
        let original: String = (0..30).map(|i| format!("line {i}\n")).collect();
        let proposed = original
            .replace("line 2\n", "line two\n")
            .replace("line 27\n", "line twenty-seven\n");
        let doc = render_with_context(&original, &proposed, "", 2);
        assert_eq!(doc.hunks.len(), 2);
        assert_eq!(doc.stats, DiffStats { added: 2, removed: 2 });
    }

    #[test]
    fn identical_bodies_have_no_hunks() {
        let doc = render("same\n", "same\n", "nothing to do");
        assert!(doc.is_unchanged());
        assert!(doc.hunks.is_empty());
        assert_eq!(doc.stats, DiffStats::default());
    }

    #[test]
    fn render_is_pure() {
        assert_eq!(render("a", "b", "c"), render("a", "b", "c"));
    }
}
