use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::error::ConfigError;
use crate::gate::ConfirmationGate;

pub const API_KEY_ENV_VARS: [&str; 2] = ["QUILL_API_KEY", "GEMINI_API_KEY"];

pub const SAMPLE_CONFIG: &str = r#"[oracle]
provider = "gemini"            # "gemini" (HTTP) or "command" (local CLI)
model = "gemini-1.5-flash"
endpoint = "https://generativelanguage.googleapis.com/v1beta"
timeout_secs = 120
# api_key = "..."              # QUILL_API_KEY / GEMINI_API_KEY take precedence
command = ["ollama", "run", "llama3"]   # used when provider = "command"

[gate]
accept_tokens = ["y"]

[preview]
show_diff = true
context_lines = 3
theme = "base16-ocean.dark"

[input]
max_bytes = 1048576            # larger files are refused before reading

[executor]
guard_stale = true
backup = false                 # keep <name>.backup_<unix time>.<ext> beside the file

[journal]
enabled = false
# path = "/custom/journal.jsonl"
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleProvider {
    Gemini,
    Command,
}

impl OracleProvider {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "command" => Ok(Self::Command),
            _ => Err(ConfigError::UnknownProvider(name.to_string())),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Command => "command",
        }
    }

    pub fn needs_api_key(self) -> bool {
        matches!(self, Self::Gemini)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub oracle: OracleConfig,
    pub gate: GateConfig,
    pub preview: PreviewConfig,
    pub input: InputConfig,
    pub executor: ExecutorConfig,
    pub journal: JournalConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct OracleConfig {
    pub provider: String,
    pub model: String,
    pub endpoint: String,
    pub timeout_secs: u64,
    pub api_key: Option<String>,
    pub command: Vec<String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-1.5-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 120,
            api_key: None,
            command: vec!["ollama".to_string(), "run".to_string(), "llama3".to_string()],
        }
    }
}

impl OracleConfig {
    pub fn provider(&self) -> Result<OracleProvider, ConfigError> {
        OracleProvider::parse(&self.provider)
    }

    /// Finds the API key for the configured provider.
    ///
    /// Environment variables win over the config file. Providers that need no
    /// key resolve to `Ok(None)`.
    pub fn resolve_api_key<F>(&self, env: F) -> Result<Option<String>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let provider = self.provider()?;
        if !provider.needs_api_key() {
            return Ok(None);
        }
        let from_env = API_KEY_ENV_VARS.iter().find_map(|name| non_blank(env(name)));
        from_env
            .or_else(|| non_blank(self.api_key.clone()))
            .map(Some)
            .ok_or_else(|| ConfigError::MissingCredential {
                provider: provider.label().to_string(),
            })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct GateConfig {
    pub accept_tokens: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            accept_tokens: vec!["y".to_string()],
        }
    }
}

impl GateConfig {
    pub fn gate(&self) -> ConfirmationGate {
        ConfirmationGate::new(&self.accept_tokens)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PreviewConfig {
    pub show_diff: bool,
    pub context_lines: usize,
    pub theme: String,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            show_diff: true,
            context_lines: crate::preview::DEFAULT_CONTEXT_LINES,
            theme: "base16-ocean.dark".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct InputConfig {
    pub max_bytes: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            max_bytes: crate::snapshot::DEFAULT_MAX_INPUT_BYTES,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutorConfig {
    pub guard_stale: bool,
    pub backup: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            guard_stale: true,
            backup: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct JournalConfig {
    pub enabled: bool,
    pub path: Option<PathBuf>,
}

impl JournalConfig {
    /// Journal location when enabled: the configured path or the per-user
    /// data directory.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        if !self.enabled {
            return None;
        }
        self.path
            .clone()
            .or_else(|| dirs::data_local_dir().map(|dir| dir.join("quill").join("journal.jsonl")))
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("quill").join("config.toml"))
    }

    /// Loads the explicit file, or the default location if it exists, or
    /// falls back to built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match explicit {
            Some(path) => Self::load_from(path)?,
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::load_from(&path)?,
                _ => {
                    tracing::debug!("no config file; using defaults");
                    Self::default()
                }
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|err| err.to_string())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let provider = self.oracle.provider()?;
        if provider == OracleProvider::Command && self.oracle.command.is_empty() {
            return Err(ConfigError::EmptyCommand);
        }
        if self.input.max_bytes == 0 {
            return Err(ConfigError::ZeroInputLimit);
        }
        Ok(())
    }

    /// Writes [`SAMPLE_CONFIG`] to `path`, refusing to replace an existing file.
    pub fn init(path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::AlreadyExists {
                    ConfigError::AlreadyExists {
                        path: path.to_path_buf(),
                    }
                } else {
                    write_err(source)
                }
            })?;
        file.write_all(SAMPLE_CONFIG.as_bytes()).map_err(write_err)?;
        Ok(())
    }
}
