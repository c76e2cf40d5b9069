use std::path::Path;

use crate::present::OperatorInput;
use crate::present::OperatorResponse;
use crate::present::Presenter;
use crate::preview::PreviewDocument;
use crate::proposal::Decision;

pub const APPROVAL_PROMPT: &str = "Apply this edit? [y/N] ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    AwaitingInput,
    Approved,
    Rejected,
}

impl GateState {
    pub fn label(self) -> &'static str {
        match self {
            Self::AwaitingInput => "awaiting_input",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::AwaitingInput)
    }

    pub fn decision(self) -> Option<Decision> {
        match self {
            Self::AwaitingInput => None,
            Self::Approved => Some(Decision::Approved),
            Self::Rejected => Some(Decision::Rejected),
        }
    }
}

/// Human approval step in front of every file mutation.
///
/// Fails closed: only an exact accept token approves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationGate {
    accept_tokens: Vec<String>,
}

impl Default for ConfirmationGate {
    fn default() -> Self {
        Self::new(["y"])
    }
}

impl ConfirmationGate {
    pub fn new<I, S>(accept_tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let accept_tokens = accept_tokens
            .into_iter()
            .map(|token| token.as_ref().trim().to_lowercase())
            .filter(|token| !token.is_empty())
            .collect();
        Self { accept_tokens }
    }

    pub fn accept_tokens(&self) -> &[String] {
        &self.accept_tokens
    }

    pub fn decide(&self, response: &OperatorResponse) -> Decision {
        match response {
            OperatorResponse::Line(line) => {
                let answer = line.trim().to_lowercase();
                if self.accept_tokens.iter().any(|token| *token == answer) {
                    Decision::Approved
                } else {
                    Decision::Rejected
                }
            }
            OperatorResponse::Interrupted | OperatorResponse::Closed => Decision::Rejected,
        }
    }

    /// Advances `state` by one response. Terminal states are absorbing.
    pub fn step(&self, state: GateState, response: &OperatorResponse) -> GateState {
        if state.is_terminal() {
            return state;
        }
        match self.decide(response) {
            Decision::Approved => GateState::Approved,
            Decision::Rejected => GateState::Rejected,
        }
    }

    pub fn confirm(
        &self,
        path: &Path,
        preview: &PreviewDocument,
        presenter: &mut dyn Presenter,
        input: &mut dyn OperatorInput,
    ) -> Decision {
        presenter.show_preview(path, preview);
        let response = input.read_response(APPROVAL_PROMPT);
        let state = self.step(GateState::AwaitingInput, &response);
        let decision = state.decision().unwrap_or(Decision::Rejected);
        tracing::info!(
            path = %path.display(),
            decision = decision.label(),
            interrupted = matches!(response, OperatorResponse::Interrupted),
            "operator decision"
        );
        decision
    }
}
