//! # Config Normalizer
//!
//! Every supported dialect is normalized into one [`Declaration`]:
//!
//! * **structured**: YAML (`.yaml`, `.yml`) and JSON (`.json`) documents, see
//!   [`structured`]
//! * **sections**: `[SECTION]` headings with `key = value` lines (`.ini`,
//!   `.esi`, `.bot`, `.simple`, `.conf`), see [`sections`]
//!
//! The dialect comes from the file extension of the hint when there is one,
//! otherwise from the document itself. Normalization ends with
//! [`Declaration::validate`], so a returned declaration is always loadable.

use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use strum_macros::{Display, EnumString};
use tracing::{debug, instrument};

use crate::declaration::Declaration;
use crate::error::ConfigError;

pub mod sections;
pub mod structured;

lazy_static! {
    static ref SECTION_HEADING: Regex = Regex::new(r"(?m)^[ \t]*\[[^\]\r\n]+\][ \t]*\r?$")
        .expect("section heading pattern is valid");
    static ref YAML_KEY: Regex =
        Regex::new(r"(?m)^[A-Za-z_][A-Za-z0-9_]*[ \t]*:").expect("yaml key pattern is valid");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Dialect {
    #[strum(to_string = "yaml", serialize = "yml")]
    Yaml,
    Json,
    #[strum(
        to_string = "sections",
        serialize = "ini",
        serialize = "esi",
        serialize = "bot",
        serialize = "simple",
        serialize = "conf"
    )]
    Sections,
}

impl Dialect {
    /// From a path-like hint (`bot.yaml`) or a bare dialect name (`yaml`).
    pub fn from_hint(hint: &str) -> Option<Self> {
        let extension = Path::new(hint)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(hint);
        extension.parse().ok()
    }

    /// Structural sniffing, used when the hint does not decide.
    pub fn sniff(text: &str) -> Option<Self> {
        let text = text.trim_start_matches('\u{feff}');
        if text.trim_start().starts_with('{') {
            return Some(Dialect::Json);
        }
        if SECTION_HEADING.is_match(text) {
            return Some(Dialect::Sections);
        }
        if YAML_KEY.is_match(text) {
            return Some(Dialect::Yaml);
        }
        None
    }

    pub fn detect(text: &str, hint: Option<&str>) -> Result<Self, ConfigError> {
        hint.and_then(Self::from_hint)
            .or_else(|| Self::sniff(text))
            .ok_or_else(|| ConfigError::UnknownDialect {
                hint: hint.map(str::to_string),
            })
    }
}

/// Normalizes a document of a known dialect and validates the result.
pub fn normalize(text: &str, dialect: Dialect) -> Result<Declaration, ConfigError> {
    let text = text.trim_start_matches('\u{feff}');
    let declaration = match dialect {
        Dialect::Yaml => structured::from_yaml(text)?,
        Dialect::Json => structured::from_json(text)?,
        Dialect::Sections => sections::parse(text)?,
    };
    declaration.validate()?;
    Ok(declaration)
}

/// Decodes, detects the dialect and normalizes.
#[instrument(level = "debug", skip(raw), fields(bytes = raw.len()))]
pub fn load_declaration(raw: &[u8], hint: Option<&str>) -> Result<Declaration, ConfigError> {
    let text = std::str::from_utf8(raw)?;
    let dialect = Dialect::detect(text, hint)?;
    debug!(%dialect, "detected configuration dialect");
    let declaration = normalize(text, dialect)?;
    debug!(
        bot = %declaration.meta.name,
        variables = declaration.variables.len(),
        keyboards = declaration.keyboards.len(),
        handlers = declaration.handlers.len(),
        "declaration loaded"
    );
    Ok(declaration)
}

pub fn load_declaration_file<P: AsRef<Path>>(path: P) -> Result<Declaration, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_declaration(&raw, Some(path.to_string_lossy().as_ref()))
}
