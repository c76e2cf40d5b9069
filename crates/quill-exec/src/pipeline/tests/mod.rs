use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use quill_core::OracleError;
use quill_core::OperatorResponse;
use quill_core::PlainPresenter;
use quill_core::ScriptedInput;
use serde_json::json;
use tempfile::tempdir;
use tempfile::TempDir;

pub(super) use super::Pipeline;
pub(super) use super::RunReport;
pub(super) use crate::executor::ActionExecutor;
pub(super) use crate::oracle::Oracle;
pub(super) use crate::oracle::OracleRequest;
pub(super) use quill_core::Decision;
pub(super) use quill_core::Outcome;
pub(super) use quill_core::ParseError;
pub(super) use quill_core::PipelineError;


/// Replays a canned reply and remembers what it was asked.
struct FakeOracle {
    reply: Result<String, String>,
    seen: Rc<RefCell<Vec<OracleRequest>>>,
}

impl FakeOracle {
    fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Ok(reply.into()),
            seen: Rc::default(),
        }
    }

    fn failing(reason: &str) -> Self {
        Self {
            reply: Err(reason.to_string()),
            seen: Rc::default(),
        }
    }

    fn requests(&self) -> Rc<RefCell<Vec<OracleRequest>>> {
        Rc::clone(&self.seen)
    }
}

impl Oracle for FakeOracle {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn propose(&self, request: &OracleRequest) -> Result<String, OracleError> {
        self.seen.borrow_mut().push(request.clone());
        self.reply.clone().map_err(OracleError::Transport)
    }
}

struct Workspace {
    _dir: TempDir,
    file: PathBuf,
}

impl Workspace {
    fn with_file(name: &str, content: &str) -> Self {
        let dir = tempdir().expect("tmpdir");
        let file = dir.path().join(name);
        fs::write(&file, content).expect("write fixture");
        Self { _dir: dir, file }
    }

    fn path_str(&self) -> String {
        self.file.to_string_lossy().into_owned()
    }

    fn content(&self) -> String {
        fs::read_to_string(&self.file).expect("read fixture")
    }
}

fn edit_reply(path: &str, new_content: &str) -> String {
    json!({
        "action": "EDIT_FILE",
        "path": path,
        "explanation": "adds a doc comment",
        "new_content": new_content,
    })
    .to_string()
}

struct Run {
    result: Result<RunReport, PipelineError>,
    shown: String,
    prompts: Vec<String>,
}

fn run_with(pipeline: &mut Pipeline, workspace: &Workspace, responses: Vec<OperatorResponse>) -> Run {
    let mut presenter = PlainPresenter::new(Vec::new());
    let mut input = ScriptedInput::new(responses);
    let result = pipeline.run("add docs", &workspace.file, &mut presenter, &mut input);
    Run {
        result,
        shown: String::from_utf8(presenter.into_inner()).expect("utf8"),
        prompts: input.prompts().to_vec(),
    }
}

fn run_once(reply: String, workspace: &Workspace, responses: Vec<OperatorResponse>) -> Run {
    let mut pipeline = Pipeline::new(Box::new(FakeOracle::replying(reply)));
    run_with(&mut pipeline, workspace, responses)
}

fn line(text: &str) -> OperatorResponse {
    OperatorResponse::Line(text.to_string())
}

#[test]
fn oracle_sees_snapshot_content_and_name() {
    let workspace = Workspace::with_file("calc.py", "def add(a, b):\n    return a + b\n");
    let oracle = FakeOracle::replying(r#"{"action":"ANSWER_QUESTION","answer":"adds"}"#);
    let requests = oracle.requests();
    let mut presenter = PlainPresenter::new(Vec::new());
    let mut input = ScriptedInput::default();

    let result = Pipeline::new(Box::new(oracle)).run(
        "what does it do?",
        &workspace.file,
        &mut presenter,
        &mut input,
    );

    assert!(result.is_ok());
    let seen = requests.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].filename, workspace.path_str());
    assert_eq!(seen[0].file_content, "def add(a, b):\n    return a + b\n");
    assert_eq!(seen[0].instruction, "what does it do?");
}
