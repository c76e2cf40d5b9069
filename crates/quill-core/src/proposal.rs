use std::path::Path;
use std::path::PathBuf;

use crate::action::Action;
use crate::snapshot::FileSnapshot;

/// An action bound to the exact file content it was computed against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub source_snapshot: FileSnapshot,
    pub action: Action,
}

impl Proposal {
    pub fn new(source_snapshot: FileSnapshot, action: Action) -> Self {
        Self {
            source_snapshot,
            action,
        }
    }

    pub fn requires_confirmation(&self) -> bool {
        self.action.is_mutating()
    }

    /// Path declared by the action, if it names one.
    pub fn target_path(&self) -> Option<&Path> {
        match &self.action {
            Action::EditFile { path, .. } => Some(Path::new(path.as_str())),
            Action::AnswerQuestion { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn label(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Displayed(String),
    Discarded,
    Applied(PathBuf),
    Failed(String),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Displayed(_) => "displayed",
            Self::Discarded => "discarded",
            Self::Applied(_) => "applied",
            Self::Failed(_) => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}
