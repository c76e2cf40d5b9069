use std::process::Command;
use std::time::Duration;

use quill_core::Config;
use quill_core::ConfigError;
use quill_core::FileSnapshot;
use quill_core::OracleError;
use quill_core::OracleProvider;
use serde::Deserialize;
use serde::Serialize;

const ERROR_BODY_LIMIT: usize = 512;

/// Everything the oracle sees for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleRequest {
    pub instruction: String,
    pub filename: String,
    pub file_content: String,
}

impl OracleRequest {
    pub fn from_snapshot(instruction: impl Into<String>, snapshot: &FileSnapshot) -> Self {
        Self {
            instruction: instruction.into(),
            filename: snapshot.display_name(),
            file_content: snapshot.content().to_string(),
        }
    }
}

/// Source of proposals. Replies are raw text; callers always run them through
/// the action parser.
pub trait Oracle {
    fn name(&self) -> &'static str;
    fn propose(&self, request: &OracleRequest) -> Result<String, OracleError>;
}

pub fn build_prompt(request: &OracleRequest) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "System:\n\
You are a senior programming assistant working on one file from the user's project.\n\
Reply with exactly one JSON object and nothing else. Choose one of two shapes:\n\
1. To change the file: {\"action\": \"EDIT_FILE\", \"path\": \"",
    );
    prompt.push_str(&request.filename);
    prompt.push_str(
        "\", \"explanation\": \"<one sentence>\", \"new_content\": \"<the complete new file>\"}\n\
   new_content replaces the whole file, so include every line you keep.\n\
2. To answer a question without changing anything: {\"action\": \"ANSWER_QUESTION\", \"answer\": \"<your answer>\"}\n\
Do not add other fields. Do not invent other actions.\n\n",
    );

    prompt.push_str("File: ");
    prompt.push_str(&request.filename);
    prompt.push_str("\n--- BEGIN FILE ---\n");
    prompt.push_str(&request.file_content);
    if !request.file_content.ends_with('\n') {
        prompt.push('\n');
    }
    prompt.push_str("--- END FILE ---\n\n");

    prompt.push_str("User Request: ");
    prompt.push_str(&request.instruction);
    prompt
}

/// Removes CSI escape sequences (colours, cursor moves) from command output.
///
/// Every other character, including `\r` and a bare ESC, is kept so that
/// file content carried in the reply comes through byte for byte.
pub fn strip_ansi_sequences(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' && chars.next_if_eq(&'[').is_some() {
            for n in chars.by_ref() {
                if ('@'..='~').contains(&n) {
                    break;
                }
            }
            continue;
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<PartOut<'a>>,
}

#[derive(Debug, Serialize)]
struct PartOut<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<PartIn>,
}

#[derive(Debug, Default, Deserialize)]
struct PartIn {
    #[serde(default)]
    text: Option<String>,
}

/// Joins the text parts of the first candidate that has any.
fn candidate_text(response: GenerateResponse) -> Option<String> {
    response.candidates.into_iter().find_map(|candidate| {
        let text: String = candidate
            .content?
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect();
        (!text.trim().is_empty()).then_some(text)
    })
}

/// Hosted Gemini model over the `generateContent` REST endpoint.
pub struct GeminiOracle {
    endpoint: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl GeminiOracle {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            timeout,
        }
    }

    pub fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

impl Oracle for GeminiOracle {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn propose(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let prompt = build_prompt(request);
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![PartOut { text: &prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|err| OracleError::Transport(err.to_string()))?;
        tracing::debug!(model = %self.model, prompt_bytes = prompt.len(), "calling gemini");
        let response = client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|err| {
                if err.is_timeout() {
                    OracleError::Transport(format!(
                        "timed out after {}s",
                        self.timeout.as_secs()
                    ))
                } else {
                    OracleError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(OracleError::Status {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }
        let decoded: GenerateResponse = response
            .json()
            .map_err(|err| OracleError::Transport(format!("decode response: {err}")))?;
        candidate_text(decoded).ok_or(OracleError::EmptyResponse)
    }
}

/// Local model CLI (e.g. `ollama run llama3`) given the prompt as its last
/// argument.
pub struct CommandOracle {
    program: String,
    args: Vec<String>,
}

impl CommandOracle {
    pub fn new(command: &[String]) -> Result<Self, ConfigError> {
        let (program, args) = command.split_first().ok_or(ConfigError::EmptyCommand)?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl Oracle for CommandOracle {
    fn name(&self) -> &'static str {
        "command"
    }

    fn propose(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let prompt = build_prompt(request);
        tracing::debug!(program = %self.program, "running oracle command");
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&prompt)
            .output()
            .map_err(|err| OracleError::Command(format!("{}: {err}", self.program)))?;
        if !output.status.success() {
            let stderr = strip_ansi_sequences(&String::from_utf8_lossy(&output.stderr));
            return Err(OracleError::Command(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        let text = strip_ansi_sequences(&String::from_utf8_lossy(&output.stdout));
        if text.trim().is_empty() {
            return Err(OracleError::EmptyResponse);
        }
        Ok(text)
    }
}

/// Builds the configured oracle. `api_key` comes from
/// [`quill_core::OracleConfig::resolve_api_key`].
pub fn from_config(config: &Config, api_key: Option<String>) -> Result<Box<dyn Oracle>, ConfigError> {
    let oracle = &config.oracle;
    match oracle.provider()? {
        OracleProvider::Gemini => {
            let api_key = api_key.ok_or_else(|| ConfigError::MissingCredential {
                provider: OracleProvider::Gemini.label().to_string(),
            })?;
            Ok(Box::new(GeminiOracle::new(
                oracle.endpoint.clone(),
                oracle.model.clone(),
                api_key,
                Duration::from_secs(oracle.timeout_secs),
            )))
        }
        OracleProvider::Command => Ok(Box::new(CommandOracle::new(&oracle.command)?)),
    }
}
