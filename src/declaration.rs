//! # Declaration
//!
//! The normalized, dialect-agnostic description of one bot: metadata,
//! variable seeds, keyboards and handlers. Every configuration dialect is
//! lowered into these types by [`crate::loader`], and everything downstream
//! (store seeding, keyboard cache, dispatch table) only ever sees this model.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, IntoStaticStr};

use crate::error::ConfigError;
use crate::value::Value;

pub const DEFAULT_BOT_NAME: &str = "ESYBOT";
pub const DEFAULT_BOT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotMeta {
    pub token: String,
    pub name: String,
    pub version: String,
    pub description: String,
}

impl Default for BotMeta {
    fn default() -> Self {
        Self {
            token: String::new(),
            name: DEFAULT_BOT_NAME.to_string(),
            version: DEFAULT_BOT_VERSION.to_string(),
            description: String::new(),
        }
    }
}

/// A seed for the variable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value: Value,
    pub type_hint: Option<String>,
    pub description: Option<String>,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            type_hint: None,
            description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ButtonAction {
    Url(String),
    Callback(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Button {
    pub text: String,
    pub action: ButtonAction,
    /// Start a new row after this button.
    pub new_row: bool,
}

impl Button {
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: ButtonAction::Callback(data.into()),
            new_row: false,
        }
    }

    pub fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: ButtonAction::Url(url.into()),
            new_row: false,
        }
    }

    pub fn with_new_row(mut self) -> Self {
        self.new_row = true;
        self
    }
}

/// Callback token derived from a button label: lowercase, spaces to
/// underscores.
pub fn slug(label: &str) -> String {
    label.trim().to_lowercase().replace(' ', "_")
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum KeyboardKind {
    #[default]
    Inline,
    Reply,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyboard {
    pub name: String,
    pub kind: KeyboardKind,
    pub buttons: Vec<Button>,
    pub resize: bool,
    pub one_time: bool,
}

impl Keyboard {
    pub fn inline(name: impl Into<String>, buttons: Vec<Button>) -> Self {
        Self {
            name: name.into(),
            kind: KeyboardKind::Inline,
            buttons,
            resize: true,
            one_time: false,
        }
    }

    pub fn reply(name: impl Into<String>, buttons: Vec<Button>) -> Self {
        Self {
            kind: KeyboardKind::Reply,
            ..Self::inline(name, buttons)
        }
    }
}

/// Parameters shared by `send`, `reply` and `edit`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MessageEffect {
    pub text: String,
    pub keyboard: Option<String>,
    pub parse_mode: Option<String>,
}

impl MessageEffect {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_keyboard(mut self, keyboard: impl Into<String>) -> Self {
        self.keyboard = Some(keyboard.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Effect {
    Send(MessageEffect),
    Reply(MessageEffect),
    Edit(MessageEffect),
    AnswerCallback { text: Option<String>, alert: bool },
    Increment { variable: String, amount: Value },
    Decrement { variable: String, amount: Value },
    Set { variable: String, value: String },
}

impl Effect {
    pub fn kind(&self) -> &'static str {
        self.into()
    }

    pub fn send(text: impl Into<String>) -> Self {
        Effect::Send(MessageEffect::text(text))
    }

    pub fn increment(variable: impl Into<String>) -> Self {
        Effect::Increment {
            variable: variable.into(),
            amount: Value::Integer(1),
        }
    }

    pub fn decrement(variable: impl Into<String>) -> Self {
        Effect::Decrement {
            variable: variable.into(),
            amount: Value::Integer(1),
        }
    }

    pub fn set(variable: impl Into<String>, value: impl Into<String>) -> Self {
        Effect::Set {
            variable: variable.into(),
            value: value.into(),
        }
    }

    pub fn keyboard(&self) -> Option<&str> {
        match self {
            Effect::Send(m) | Effect::Reply(m) | Effect::Edit(m) => m.keyboard.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Handler {
    pub name: String,
    /// Raw trigger descriptor, normalized by the dispatch table.
    pub trigger: String,
    pub condition: Option<String>,
    pub effects: Vec<Effect>,
    pub else_effects: Vec<Effect>,
    pub script: Option<String>,
}

impl Handler {
    pub fn new(name: impl Into<String>, trigger: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            trigger: trigger.into(),
            ..Default::default()
        }
    }

    pub fn with_effects(mut self, effects: Vec<Effect>) -> Self {
        self.effects = effects;
        self
    }

    pub fn with_else(mut self, effects: Vec<Effect>) -> Self {
        self.else_effects = effects;
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Declaration {
    pub meta: BotMeta,
    pub variables: Vec<Variable>,
    pub keyboards: Vec<Keyboard>,
    pub handlers: Vec<Handler>,
}

impl Declaration {
    /// Load-time checks shared by all dialects.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.meta.token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }

        let mut variables = HashSet::new();
        for variable in &self.variables {
            if !variables.insert(variable.name.as_str()) {
                return Err(ConfigError::DuplicateVariable(variable.name.clone()));
            }
        }

        let mut keyboards = HashSet::new();
        for keyboard in &self.keyboards {
            if !keyboards.insert(keyboard.name.as_str()) {
                return Err(ConfigError::DuplicateKeyboard(keyboard.name.clone()));
            }
        }

        for handler in &self.handlers {
            for effect in handler.effects.iter().chain(handler.else_effects.iter()) {
                if let Some(name) = effect.keyboard() {
                    if !keyboards.contains(name) {
                        return Err(ConfigError::UnknownKeyboard {
                            handler: handler.name.clone(),
                            keyboard: name.to_string(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    pub fn keyboard(&self, name: &str) -> Option<&Keyboard> {
        self.keyboards.iter().find(|k| k.name == name)
    }
}
