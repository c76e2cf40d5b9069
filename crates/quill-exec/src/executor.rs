use std::fs::Permissions;
use std::io::Write;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use quill_core::Action;
use quill_core::Decision;
use quill_core::ExecutionError;
use quill_core::Outcome;
use quill_core::Presenter;
use quill_core::Proposal;
use tempfile::NamedTempFile;

/// Turns an approved proposal into its effect, and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionExecutor {
    pub guard_stale: bool,
    /// Copy the original next to the target before replacing it.
    pub backup: bool,
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self {
            guard_stale: true,
            backup: false,
        }
    }
}

impl ActionExecutor {
    pub fn new(guard_stale: bool) -> Self {
        Self {
            guard_stale,
            ..Self::default()
        }
    }

    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    pub fn execute(
        &self,
        proposal: &Proposal,
        decision: Option<Decision>,
    ) -> Result<Outcome, ExecutionError> {
        let (path, new_content) = match &proposal.action {
            Action::AnswerQuestion { answer } => return Ok(Outcome::Displayed(answer.clone())),
            Action::EditFile {
                path, new_content, ..
            } => (path, new_content),
        };
        if decision != Some(Decision::Approved) {
            tracing::info!(path = %path, "edit discarded");
            return Ok(Outcome::Discarded);
        }

        let snapshot = &proposal.source_snapshot;
        let action_path = Path::new(path.as_str());
        if normalized(snapshot.path()) != normalized(action_path) {
            return Err(ExecutionError::PathMismatch {
                snapshot: snapshot.path().to_path_buf(),
                action: action_path.to_path_buf(),
            });
        }
        let target = snapshot.path();

        if self.guard_stale {
            match snapshot.matches_disk() {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(path = %target.display(), "target changed since snapshot");
                    return Ok(Outcome::Failed(format!(
                        "{} changed on disk after it was read; edit not applied",
                        target.display()
                    )));
                }
                Err(err) => {
                    return Ok(Outcome::Failed(format!(
                        "cannot re-read {}: {err}",
                        target.display()
                    )));
                }
            }
        }

        let resolved = resolve_target(target);
        if let Err(err) = ensure_writable(&resolved) {
            tracing::warn!(path = %resolved.display(), error = %err, "edit refused");
            return Ok(Outcome::Failed(format!(
                "cannot write {}: {err}",
                target.display()
            )));
        }
        if self.backup {
            match backup_file(&resolved) {
                Ok(copy) => tracing::info!(backup = %copy.display(), "original backed up"),
                Err(err) => {
                    tracing::warn!(path = %resolved.display(), error = %err, "backup failed");
                    return Ok(Outcome::Failed(format!(
                        "cannot back up {}: {err}; edit not applied",
                        target.display()
                    )));
                }
            }
        }

        match replace_file(&resolved, new_content) {
            Ok(()) => {
                tracing::info!(path = %target.display(), bytes = new_content.len(), "edit applied");
                Ok(Outcome::Applied(target.to_path_buf()))
            }
            Err(err) => {
                tracing::warn!(path = %target.display(), error = %err, "edit failed");
                Ok(Outcome::Failed(format!(
                    "cannot write {}: {err}",
                    target.display()
                )))
            }
        }
    }

    pub fn execute_and_report(
        &self,
        proposal: &Proposal,
        decision: Option<Decision>,
        presenter: &mut dyn Presenter,
    ) -> Result<Outcome, ExecutionError> {
        let outcome = self.execute(proposal, decision)?;
        presenter.show_outcome(&outcome);
        Ok(outcome)
    }
}

fn normalized(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

/// Follows symlinks so the rename replaces the file they point at, not the link.
fn resolve_target(target: &Path) -> PathBuf {
    std::fs::canonicalize(target).unwrap_or_else(|_| target.to_path_buf())
}

fn ensure_writable(target: &Path) -> std::io::Result<()> {
    match std::fs::metadata(target) {
        Ok(meta) if meta.is_file() && meta.permissions().readonly() => Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "file is read-only",
        )),
        _ => Ok(()),
    }
}

/// Copies `target` to `<stem>.backup_<unix seconds>[.<ext>]` beside it.
fn backup_file(target: &Path) -> std::io::Result<PathBuf> {
    let stem = target
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name = format!("{stem}.backup_{}", chrono::Utc::now().timestamp());
    if let Some(ext) = target.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    let copy = target.with_file_name(name);
    std::fs::copy(target, &copy)?;
    Ok(copy)
}

/// Replaces `target` whole: write a sibling temp file, fsync, rename over.
///
/// The temp file is deleted on every error path, so the target either keeps
/// its old bytes or holds all of `content`.
fn replace_file(target: &Path, content: &str) -> std::io::Result<()> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let permissions: Option<Permissions> = std::fs::metadata(target)
        .ok()
        .map(|meta| meta.permissions());

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    if let Some(permissions) = permissions {
        tmp.as_file().set_permissions(permissions)?;
    }
    tmp.persist(target).map_err(|err| err.error)?;

    if let Err(err) = sync_dir(dir) {
        tracing::warn!(dir = %dir.display(), error = %err, "directory fsync failed");
    }
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
