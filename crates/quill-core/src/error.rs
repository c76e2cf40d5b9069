use std::path::PathBuf;

use thiserror::Error;

/// Why raw oracle text could not become an [`crate::action::Action`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("oracle reply is not a JSON object: {0}")]
    Malformed(String),
    #[error("oracle reply violates the action schema at field `{0}`")]
    SchemaViolation(String),
    #[error("oracle proposed an unknown action `{0}`")]
    UnknownAction(String),
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} is {size} bytes, over the {limit} byte limit", path.display())]
    TooLarge { path: PathBuf, size: u64, limit: u64 },
    #[error("{} looks like a binary file", path.display())]
    Binary { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Transport(String),
    #[error("oracle returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("oracle returned no text")]
    EmptyResponse,
    #[error("oracle command failed: {0}")]
    Command(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write config {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("no API key for provider `{provider}`; set QUILL_API_KEY or GEMINI_API_KEY, or oracle.api_key in the config file")]
    MissingCredential { provider: String },
    #[error("unknown oracle provider `{0}` (expected `gemini` or `command`)")]
    UnknownProvider(String),
    #[error("oracle.command is empty")]
    EmptyCommand,
    #[error("input.max_bytes must be greater than zero")]
    ZeroInputLimit,
    #[error("config already exists at {}", path.display())]
    AlreadyExists { path: PathBuf },
    #[error("no config directory available on this platform")]
    NoConfigDir,
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The action names a different file than the one the proposal was
    /// computed against.
    #[error("proposal was computed for {} but the action targets {}", snapshot.display(), action.display())]
    PathMismatch { snapshot: PathBuf, action: PathBuf },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl PipelineError {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Input(_) => "input",
            Self::Oracle(_) => "oracle",
            Self::Parse(_) => "parse",
            Self::Execution(_) => "execution",
        }
    }

    /// sysexits-style process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 78,
            Self::Input(_) => 66,
            Self::Oracle(_) => 69,
            Self::Parse(_) => 65,
            Self::Execution(_) => 74,
        }
    }
}
