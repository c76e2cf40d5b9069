use std::path::Path;

use quill_core::parse;
use quill_core::preview::render_with_context;
use quill_core::Action;
use quill_core::Config;
use quill_core::ConfirmationGate;
use quill_core::Decision;
use quill_core::FileSnapshot;
use quill_core::JournalEvent;
use quill_core::OperatorInput;
use quill_core::Outcome;
use quill_core::PipelineError;
use quill_core::Presenter;
use quill_core::Proposal;
use quill_core::RunJournal;
use quill_core::DEFAULT_CONTEXT_LINES;
use quill_core::DEFAULT_MAX_INPUT_BYTES;

use crate::executor::ActionExecutor;
use crate::oracle::Oracle;
use crate::oracle::OracleRequest;

/// Exit code for a run whose edit was approved but could not be applied.
pub const FAILED_OUTCOME_EXIT_CODE: i32 = 74;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: Outcome,
    pub decision: Option<Decision>,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        if self.outcome.is_failure() {
            FAILED_OUTCOME_EXIT_CODE
        } else {
            0
        }
    }
}

/// One instruction against one file: snapshot, ask, parse, confirm, execute.
pub struct Pipeline {
    oracle: Box<dyn Oracle>,
    gate: ConfirmationGate,
    executor: ActionExecutor,
    context_lines: usize,
    max_input_bytes: u64,
    journal: Option<RunJournal>,
}

impl Pipeline {
    pub fn new(oracle: Box<dyn Oracle>) -> Self {
        Self {
            oracle,
            gate: ConfirmationGate::default(),
            executor: ActionExecutor::default(),
            context_lines: DEFAULT_CONTEXT_LINES,
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            journal: None,
        }
    }

    pub fn from_config(config: &Config, oracle: Box<dyn Oracle>) -> Self {
        let journal = config
            .journal
            .resolved_path()
            .and_then(|path| match RunJournal::open(&path) {
                Ok(journal) => Some(journal),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "journal disabled");
                    None
                }
            });
        Self {
            oracle,
            gate: config.gate.gate(),
            executor: ActionExecutor::new(config.executor.guard_stale)
                .with_backup(config.executor.backup),
            context_lines: config.preview.context_lines,
            max_input_bytes: config.input.max_bytes,
            journal,
        }
    }

    pub fn with_gate(mut self, gate: ConfirmationGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_executor(mut self, executor: ActionExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_max_input_bytes(mut self, max_bytes: u64) -> Self {
        self.max_input_bytes = max_bytes;
        self
    }

    pub fn with_journal(mut self, journal: RunJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn run(
        &mut self,
        instruction: &str,
        file: &Path,
        presenter: &mut dyn Presenter,
        input: &mut dyn OperatorInput,
    ) -> Result<RunReport, PipelineError> {
        let snapshot = FileSnapshot::capture_with_limit(file, self.max_input_bytes)?;
        self.record(JournalEvent::RunStarted {
            path: snapshot.display_name(),
            instruction: instruction.to_string(),
            oracle: self.oracle.name().to_string(),
        });

        presenter.show_status(&format!(
            "Asking {} about {}...",
            self.oracle.name(),
            snapshot.display_name()
        ));
        let request = OracleRequest::from_snapshot(instruction, &snapshot);
        let raw = self.oracle.propose(&request)?;
        tracing::debug!(bytes = raw.len(), "oracle replied");

        let action = match parse(&raw) {
            Ok(action) => action,
            Err(err) => {
                tracing::debug!(raw = %raw, "unparseable oracle reply");
                self.record(JournalEvent::ParseFailed {
                    error: err.to_string(),
                });
                return Err(err.into());
            }
        };
        let proposal = Proposal::new(snapshot, action);
        self.record(JournalEvent::ProposalParsed {
            action: proposal.action.kind().tag().to_string(),
            target: proposal
                .target_path()
                .map(|path| path.to_string_lossy().into_owned()),
        });

        let decision = match &proposal.action {
            Action::AnswerQuestion { answer } => {
                presenter.show_answer(answer);
                None
            }
            Action::EditFile {
                path,
                explanation,
                new_content,
            } => {
                let preview = render_with_context(
                    proposal.source_snapshot.content(),
                    new_content,
                    explanation,
                    self.context_lines,
                );
                let decision = self.gate.confirm(Path::new(path), &preview, presenter, input);
                self.record(JournalEvent::DecisionRecorded {
                    path: path.clone(),
                    decision: decision.label().to_string(),
                });
                Some(decision)
            }
        };

        let outcome = self.executor.execute_and_report(&proposal, decision, presenter)?;
        self.record(JournalEvent::OutcomeRecorded {
            outcome: outcome.label().to_string(),
            detail: match &outcome {
                Outcome::Applied(path) => Some(path.to_string_lossy().into_owned()),
                Outcome::Failed(reason) => Some(reason.clone()),
                Outcome::Displayed(_) | Outcome::Discarded => None,
            },
        });
        Ok(RunReport { outcome, decision })
    }

    fn record(&mut self, event: JournalEvent) {
        if let Some(journal) = self.journal.as_mut() {
            journal.record(event);
        }
    }
}

#[cfg(test)]
mod tests;
