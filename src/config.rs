use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use crate::{Error, InternalResult};

/// Runtime settings that are not part of a bot declaration.
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub script: ScriptConfig,

    #[serde(default)]
    pub transport: TransportConfig,
}

/// Execution budget for embedded scripts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    #[serde(default = "default_script_timeout", with = "duration_ms")]
    pub timeout: Duration,

    #[serde(default = "default_max_string_len")]
    pub max_string_len: usize,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            timeout: default_script_timeout(),
            max_string_len: default_max_string_len(),
        }
    }
}

/// Settings for the chat transport collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_poll_timeout", with = "duration_secs")]
    pub poll_timeout: Duration,

    #[serde(default = "default_request_timeout", with = "duration_ms")]
    pub request_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            poll_timeout: default_poll_timeout(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl RuntimeConfig {
    // JSONファイルから設定を読み込む
    pub fn from_file<P: AsRef<Path>>(path: P) -> InternalResult<Self> {
        let file = File::open(path.as_ref())
            .map_err(|e| Error::internal(format!("Failed to open config file: {}", e)))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .map_err(|e| Error::internal(format!("Failed to parse config file: {}", e)))
    }

    pub fn from_str(s: &str) -> InternalResult<Self> {
        serde_json::from_str(s)
            .map_err(|e| Error::internal(format!("Failed to parse config: {}", e)))
    }
}

// デフォルト値の定義
fn default_max_steps() -> usize {
    10_000
}
fn default_script_timeout() -> Duration {
    Duration::from_millis(500)
}
fn default_max_string_len() -> usize {
    64 * 1024
}
fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}
fn default_poll_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_request_timeout() -> Duration {
    Duration::from_millis(40_000)
}

// Duration型のシリアライズ/デシリアライズヘルパー
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
