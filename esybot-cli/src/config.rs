use std::path::Path;

use esybot::RuntimeConfig;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use crate::telegram::TelegramError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Config(#[from] esybot::ConfigError),

    #[error("{0}")]
    Runtime(#[from] esybot::Error),

    #[error("Telegram error: {0}")]
    Telegram(#[from] TelegramError),

    #[error("No bot token: set it in the bot file, pass --token or set ESYBOT_TOKEN")]
    MissingToken,
}

pub type CliResult<T> = Result<T, CliError>;

/// Runtime settings from `path`, or the defaults when the file is absent.
pub fn load_runtime_config(path: &Path) -> CliResult<RuntimeConfig> {
    if path.exists() {
        Ok(RuntimeConfig::from_file(path)?)
    } else {
        Ok(RuntimeConfig::default())
    }
}

/// Token precedence: CLI argument or environment (both through clap), then
/// the bot file.
pub fn resolve_token(override_token: Option<&str>, declared: &str) -> CliResult<SecretString> {
    let token = override_token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| declared.trim());
    if token.is_empty() {
        return Err(CliError::MissingToken);
    }
    Ok(SecretString::new(Box::from(token)))
}

pub fn partial_show_secret(s: &SecretString) -> String {
    // show last 4 characters
    let chars = s.expose_secret().chars();
    if chars.clone().count() <= 4 {
        "**********".to_string()
    } else {
        let last_4 = chars.rev().take(4).collect::<String>();
        format!("******{}", last_4.chars().rev().collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_token_precedence() {
        let token = resolve_token(Some(" 999:zz "), "123:abc").unwrap();
        assert_eq!(token.expose_secret(), "999:zz");
        let token = resolve_token(Some(""), "123:abc").unwrap();
        assert_eq!(token.expose_secret(), "123:abc");
        assert!(matches!(
            resolve_token(None, "  "),
            Err(CliError::MissingToken)
        ));
    }

    #[test]
    fn test_partial_show_secret() {
        let secret = SecretString::new(Box::from("123456:abcdefgh"));
        assert_eq!(partial_show_secret(&secret), "******efgh");
        let short = SecretString::new(Box::from("abc"));
        assert_eq!(partial_show_secret(&short), "**********");
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_runtime_config(&dir.path().join("none.json")).unwrap();
        assert_eq!(config.script.max_steps, RuntimeConfig::default().script.max_steps);
    }
}
