use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalEvent {
    RunStarted {
        path: String,
        instruction: String,
        oracle: String,
    },
    ProposalParsed {
        action: String,
        target: Option<String>,
    },
    ParseFailed {
        error: String,
    },
    DecisionRecorded {
        path: String,
        decision: String,
    },
    OutcomeRecorded {
        outcome: String,
        detail: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub run_id: String,
    pub seq: u64,
    pub ts_ms: i64,
    #[serde(flatten)]
    pub event: JournalEvent,
}

/// Append-only JSONL audit trail of runs.
///
/// Write-only: opening never reads existing lines. Each handle tags its
/// records with its own `run_id` and numbers them from 1.
#[derive(Debug)]
pub struct RunJournal {
    path: PathBuf,
    run_id: String,
    next_seq: u64,
}

impl RunJournal {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let run_id = format!(
            "{}-{}",
            chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ"),
            std::process::id()
        );
        Self::open_with_run_id(path, run_id)
    }

    pub fn open_with_run_id(
        path: impl AsRef<Path>,
        run_id: impl Into<String>,
    ) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            run_id: run_id.into(),
            next_seq: 1,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn append(&mut self, event: JournalEvent) -> std::io::Result<u64> {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        let record = JournalRecord {
            run_id: self.run_id.clone(),
            seq,
            ts_ms: chrono::Utc::now().timestamp_millis(),
            event,
        };
        let line = serde_json::to_string(&record)
            .map_err(|err| std::io::Error::other(format!("serialize: {err}")))?;
        append_line(self.path.as_path(), line.as_str())?;
        Ok(seq)
    }

    /// Appends and logs failures instead of returning them.
    pub fn record(&mut self, event: JournalEvent) {
        if let Err(err) = self.append(event) {
            tracing::warn!(path = %self.path.display(), error = %err, "journal append failed");
        }
    }

    /// Reads back every well-formed record, skipping lines that do not parse.
    pub fn load(&self) -> std::io::Result<Vec<JournalRecord>> {
        load_records(self.path.as_path())
    }
}

fn load_records(path: &Path) -> std::io::Result<Vec<JournalRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    let mut line = Vec::new();
    while reader.read_until(b'\n', &mut line)? > 0 {
        let text = String::from_utf8_lossy(&line);
        if let Ok(record) = serde_json::from_str::<JournalRecord>(text.trim()) {
            records.push(record);
        }
        line.clear();
    }
    Ok(records)
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut opts = OpenOptions::new();
    opts.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut file = opts.open(path)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.flush()?;
    Ok(())
}
