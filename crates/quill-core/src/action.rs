use std::sync::OnceLock;

use regex::Regex;
use serde_json::Map;
use serde_json::Value;

use crate::error::ParseError;

pub const ACTION_FIELD: &str = "action";

/// What the oracle asked for, after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    EditFile {
        path: String,
        explanation: String,
        new_content: String,
    },
    AnswerQuestion {
        answer: String,
    },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::EditFile { .. } => ActionKind::EditFile,
            Self::AnswerQuestion { .. } => ActionKind::AnswerQuestion,
        }
    }

    pub fn is_mutating(&self) -> bool {
        matches!(self, Self::EditFile { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    EditFile,
    AnswerQuestion,
}

impl ActionKind {
    pub fn tag(self) -> &'static str {
        match self {
            Self::EditFile => "EDIT_FILE",
            Self::AnswerQuestion => "ANSWER_QUESTION",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "EDIT_FILE" => Some(Self::EditFile),
            "ANSWER_QUESTION" => Some(Self::AnswerQuestion),
            _ => None,
        }
    }

    fn fields(self) -> &'static [FieldSpec] {
        match self {
            Self::EditFile => &EDIT_FILE_FIELDS,
            Self::AnswerQuestion => &ANSWER_QUESTION_FIELDS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSpec {
    name: &'static str,
    required: bool,
    non_empty: bool,
}

const EDIT_FILE_FIELDS: [FieldSpec; 3] = [
    FieldSpec {
        name: "path",
        required: true,
        non_empty: true,
    },
    FieldSpec {
        name: "explanation",
        required: false,
        non_empty: false,
    },
    FieldSpec {
        name: "new_content",
        required: true,
        non_empty: false,
    },
];

const ANSWER_QUESTION_FIELDS: [FieldSpec; 1] = [FieldSpec {
    name: "answer",
    required: true,
    non_empty: false,
}];

static OPEN_FENCE: OnceLock<Option<Regex>> = OnceLock::new();
static CLOSE_FENCE: OnceLock<Option<Regex>> = OnceLock::new();

fn open_fence() -> Option<&'static Regex> {
    OPEN_FENCE
        .get_or_init(|| Regex::new(r"(?m)^[ \t]*```[A-Za-z0-9_+-]*[ \t]*\r?$").ok())
        .as_ref()
}

fn close_fence() -> Option<&'static Regex> {
    CLOSE_FENCE
        .get_or_init(|| Regex::new(r"(?m)^[ \t]*```[ \t]*\r?$").ok())
        .as_ref()
}

/// Removes the code fence the oracle may wrap its JSON in.
///
/// A bare object is left alone. Otherwise the body runs from the first fence
/// line to the next line holding only a closing fence; prose on either side
/// is dropped. JSON strings cannot span lines, so fences embedded in string
/// values never end the block.
pub fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        return trimmed;
    }
    let Some(open) = open_fence().and_then(|fence| fence.find(trimmed)) else {
        return trimmed;
    };
    let rest = &trimmed[open.end()..];
    let body = match close_fence().and_then(|fence| fence.find(rest)) {
        Some(close) => &rest[..close.start()],
        None => rest,
    };
    body.trim()
}

/// Decodes, validates and converts raw oracle output into an [`Action`].
pub fn parse(raw: &str) -> Result<Action, ParseError> {
    let body = strip_fences(raw);
    let value: Value =
        serde_json::from_str(body).map_err(|err| ParseError::Malformed(err.to_string()))?;
    let Value::Object(object) = value else {
        return Err(ParseError::Malformed(format!(
            "expected an object, found {}",
            json_type(&value)
        )));
    };

    let tag = match object.get(ACTION_FIELD) {
        Some(Value::String(tag)) => tag.as_str(),
        _ => return Err(ParseError::SchemaViolation(ACTION_FIELD.to_string())),
    };
    let kind = ActionKind::from_tag(tag).ok_or_else(|| ParseError::UnknownAction(tag.to_string()))?;

    let mut values = validate_fields(kind, &object)?.into_iter();
    let mut next = || values.next().unwrap_or_default();
    let action = match kind {
        ActionKind::EditFile => Action::EditFile {
            path: next(),
            explanation: next(),
            new_content: next(),
        },
        ActionKind::AnswerQuestion => Action::AnswerQuestion { answer: next() },
    };
    tracing::debug!(action = kind.tag(), "parsed oracle reply");
    Ok(action)
}

/// Returns the variant's string fields in declaration order.
fn validate_fields(kind: ActionKind, object: &Map<String, Value>) -> Result<Vec<String>, ParseError> {
    let specs = kind.fields();
    let mut values = Vec::with_capacity(specs.len());
    for spec in specs {
        match object.get(spec.name) {
            Some(Value::String(text)) => {
                if spec.non_empty && text.trim().is_empty() {
                    return Err(ParseError::SchemaViolation(spec.name.to_string()));
                }
                values.push(text.clone());
            }
            None if !spec.required => values.push(String::new()),
            _ => return Err(ParseError::SchemaViolation(spec.name.to_string())),
        }
    }

    if let Some(extra) = object
        .keys()
        .find(|key| key.as_str() != ACTION_FIELD && !specs.iter().any(|spec| spec.name == key.as_str()))
    {
        return Err(ParseError::SchemaViolation(extra.clone()));
    }

    Ok(values)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn edit(path: &str, explanation: &str, new_content: &str) -> Action {
        Action::EditFile {
            path: path.to_string(),
            explanation: explanation.to_string(),
            new_content: new_content.to_string(),
        }
    }

    #[test]
    fn edit_file_recovers_every_field() {
        let raw = json!({
            "action": "EDIT_FILE",
            "path": "src/lib.rs",
            "explanation": "add a doc comment",
            "new_content": "/// Adds.\nfn add() {}\n\t\"quoted\"\n",
        })
        .to_string();
        assert_eq!(
            parse(&raw),
            Ok(edit(
                "src/lib.rs",
                "add a doc comment",
                "/// Adds.\nfn add() {}\n\t\"quoted\"\n"
            ))
        );
    }

    #[test]
    fn answer_question_recovers_answer() {
        let raw = r#"{"action":"ANSWER_QUESTION","answer":"It sorts the list."}"#;
        assert_eq!(
            parse(raw),
            Ok(Action::AnswerQuestion {
                answer: "It sorts the list.".to_string()
            })
        );
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let raw = "Here you go:\n```json\n{\"action\":\"ANSWER_QUESTION\",\"answer\":\"yes\"}\n```\n";
        assert_eq!(
            parse(raw),
            Ok(Action::AnswerQuestion {
                answer: "yes".to_string()
            })
        );
    }

    #[test]
    fn bare_fence_without_language_is_unwrapped() {
        assert_eq!(strip_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn trailing_prose_after_fence_is_dropped() {
        let raw = "```json\n{\"action\":\"ANSWER_QUESTION\",\"answer\":\"yes\"}\n```\nLet me know if you need anything else.";
        assert_eq!(
            parse(raw),
            Ok(Action::AnswerQuestion {
                answer: "yes".to_string()
            })
        );
    }

    #[test]
    fn prose_then_fence_keeps_nested_fences_in_content() {
        let markdown = "```rust\nfn main() {}\n```\n";
        let body = json!({
            "action": "EDIT_FILE",
            "path": "README.md",
            "new_content": markdown,
        });
        let raw = format!("Here is the edit:\n```json\n{body}\n```\nThanks!");
        assert_eq!(parse(&raw), Ok(edit("README.md", "", markdown)));

        let pretty = serde_json::to_string_pretty(&body).expect("encode");
        let raw = format!("Sure.\n\n```\n{pretty}\n```");
        assert_eq!(parse(&raw), Ok(edit("README.md", "", markdown)));
    }

    #[test]
    fn unclosed_fence_takes_the_rest() {
        assert_eq!(strip_fences("```json\n{\"a\":1}\n"), "{\"a\":1}");
    }

    #[test]
    fn fences_inside_new_content_survive() {
        let markdown = "# Title\n\n```rust\nfn main() {}\n```\n";
        let raw = json!({
            "action": "EDIT_FILE",
            "path": "README.md",
            "new_content": markdown,
        })
        .to_string();
        assert_eq!(parse(&raw), Ok(edit("README.md", "", markdown)));

        let fenced = format!("```json\n{raw}\n```");
        assert_eq!(parse(&fenced), Ok(edit("README.md", "", markdown)));
    }

    #[test]
    fn missing_explanation_defaults_to_empty() {
        let raw = r#"{"action":"EDIT_FILE","path":"a.py","new_content":"x = 1\n"}"#;
        assert_eq!(parse(raw), Ok(edit("a.py", "", "x = 1\n")));
    }

    #[test]
    fn prose_is_malformed() {
        let err = parse("Sure! I added the comment you asked for.").unwrap_err();
        assert!(matches!(err, ParseError::Malformed(_)), "{err:?}");
    }

    #[test]
    fn non_object_json_is_malformed() {
        for raw in ["[1,2]", "\"EDIT_FILE\"", "42", "null"] {
            assert!(
                matches!(parse(raw), Err(ParseError::Malformed(_))),
                "{raw} should be malformed"
            );
        }
    }

    #[test]
    fn missing_new_content_is_schema_violation() {
        let raw = r#"{"action":"EDIT_FILE", "path": "x"}"#;
        assert_eq!(
            parse(raw),
            Err(ParseError::SchemaViolation("new_content".to_string()))
        );
    }

    #[test]
    fn missing_or_mistyped_tag_is_schema_violation() {
        assert_eq!(
            parse(r#"{"answer":"hi"}"#),
            Err(ParseError::SchemaViolation("action".to_string()))
        );
        assert_eq!(
            parse(r#"{"action":7,"answer":"hi"}"#),
            Err(ParseError::SchemaViolation("action".to_string()))
        );
    }

    #[test]
    fn unknown_tags_are_never_guessed() {
        for tag in ["RUN_COMMAND", "CREATE_FILE", "edit_file", ""] {
            let raw = json!({ "action": tag, "answer": "x" }).to_string();
            assert_eq!(parse(&raw), Err(ParseError::UnknownAction(tag.to_string())));
        }
    }

    #[test]
    fn empty_path_is_schema_violation() {
        let raw = r#"{"action":"EDIT_FILE","path":"  ","new_content":""}"#;
        assert_eq!(parse(raw), Err(ParseError::SchemaViolation("path".to_string())));
    }

    #[test]
    fn mistyped_field_is_schema_violation() {
        let raw = r#"{"action":"EDIT_FILE","path":"a","new_content":["x"]}"#;
        assert_eq!(
            parse(raw),
            Err(ParseError::SchemaViolation("new_content".to_string()))
        );
        let raw = r#"{"action":"EDIT_FILE","path":"a","explanation":null,"new_content":""}"#;
        assert_eq!(
            parse(raw),
            Err(ParseError::SchemaViolation("explanation".to_string()))
        );
    }

    #[test]
    fn extra_field_is_schema_violation() {
        let raw = r#"{"action":"ANSWER_QUESTION","answer":"a","confidence":"high"}"#;
        assert_eq!(
            parse(raw),
            Err(ParseError::SchemaViolation("confidence".to_string()))
        );
        let raw = r#"{"action":"ANSWER_QUESTION","answer":"a","path":"x"}"#;
        assert_eq!(parse(raw), Err(ParseError::SchemaViolation("path".to_string())));
    }

    #[test]
    fn parse_is_deterministic() {
        let raw = r#"{"action":"EDIT_FILE","path":"a","bogus":1,"new_content":"b"}"#;
        assert_eq!(parse(raw), parse(raw));
    }

    #[test]
    fn kind_tags_round_trip() {
        for kind in [ActionKind::EditFile, ActionKind::AnswerQuestion] {
            assert_eq!(ActionKind::from_tag(kind.tag()), Some(kind));
        }
        assert!(edit("a", "", "").is_mutating());
    }
}
