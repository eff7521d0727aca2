use std::path::PathBuf;

use strum_macros::IntoStaticStr;
use thiserror::Error;

use crate::lang::LangError;
use crate::messenger::MessengerError;

/// Load-time failures. Any of these aborts startup, no partial session is
/// created.
#[derive(Error, Debug, IntoStaticStr)]
pub enum ConfigError {
    #[error("Unable to detect configuration dialect{}", .hint.as_ref().map(|h| format!(" for {}", h)).unwrap_or_default())]
    UnknownDialect { hint: Option<String> },
    #[error("Syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("Unterminated script block starting at line {line}")]
    UnterminatedBlock { line: usize },
    #[error("Missing required bot token")]
    MissingToken,
    #[error("Missing field `{field}` in {location}")]
    MissingField { location: String, field: String },
    #[error("Handler `{handler}` references unknown keyboard `{keyboard}`")]
    UnknownKeyboard { handler: String, keyboard: String },
    #[error("Duplicate keyboard name `{0}`")]
    DuplicateKeyboard(String),
    #[error("Duplicate variable name `{0}`")]
    DuplicateVariable(String),
    #[error("Handler `{handler}` uses unknown effect `{kind}`")]
    UnknownEffect { handler: String, kind: String },
    #[error("Invalid value in {location}: {message}")]
    InvalidValue { location: String, message: String },
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Document is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ConfigError {
    pub fn kind(&self) -> &'static str {
        self.into()
    }

    pub(crate) fn syntax(line: usize, message: impl Into<String>) -> Self {
        ConfigError::Syntax {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn missing(location: impl Into<String>, field: &str) -> Self {
        ConfigError::MissingField {
            location: location.into(),
            field: field.to_string(),
        }
    }

    pub(crate) fn invalid(location: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            location: location.into(),
            message: message.into(),
        }
    }
}

/// Condition failures. Recovered as `false`.
#[derive(Error, Debug, IntoStaticStr)]
pub enum EvalError {
    #[error("Condition `{expression}` is invalid: {source}")]
    Invalid {
        expression: String,
        source: LangError,
    },
}

impl EvalError {
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}

/// Script failures. Recovered as a no-op for the invocation.
#[derive(Error, Debug, IntoStaticStr)]
pub enum ScriptError {
    #[error("Script error: {0}")]
    Lang(#[from] LangError),
}

impl ScriptError {
    pub fn kind(&self) -> &'static str {
        match self {
            ScriptError::Lang(e) => e.kind(),
        }
    }
}

/// Per-effect failures. Recovered per effect, the remaining effects run.
#[derive(Error, Debug, IntoStaticStr)]
pub enum EffectError {
    #[error("Variable `{variable}` is not numeric (found {found})")]
    NotNumeric {
        variable: String,
        found: &'static str,
    },
    #[error("Arithmetic overflow on variable `{0}`")]
    Overflow(String),
    #[error("Event carries no editable message")]
    NoEditableMessage,
    #[error("Outbound request failed: {0}")]
    Messenger(#[from] MessengerError),
}

impl EffectError {
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Eval error: {0}")]
    Eval(#[from] EvalError),
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),
    #[error("Effect error: {0}")]
    Effect(#[from] EffectError),
    #[error("Messenger error: {0}")]
    Messenger(#[from] MessengerError),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

// エラー作成用のヘルパー関数
impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(ConfigError::MissingToken.kind(), "MissingToken");
        assert_eq!(EffectError::NoEditableMessage.kind(), "NoEditableMessage");
        assert_eq!(
            EffectError::NotNumeric {
                variable: "x".to_string(),
                found: "str"
            }
            .kind(),
            "NotNumeric"
        );
    }

    #[test]
    fn test_display_locations() {
        let err = ConfigError::syntax(12, "expected `key = value`");
        assert_eq!(
            err.to_string(),
            "Syntax error at line 12: expected `key = value`"
        );
        let err = ConfigError::UnknownDialect {
            hint: Some("bot.txt".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Unable to detect configuration dialect for bot.txt"
        );
    }
}
