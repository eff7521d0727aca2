//! # Keyboard Builder
//!
//! Turns a declared [`Keyboard`] into the markup object the chat platform
//! expects. Markup serializes to the Telegram Bot API shape
//! (`inline_keyboard` / `keyboard`).
//!
//! Buttons fill the current row; a button flagged `new_row` closes the row
//! after itself.

use std::borrow::Cow;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::declaration::{Button, ButtonAction, Keyboard, KeyboardKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineButton {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub callback_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyButton {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyboardMarkup {
    Inline {
        inline_keyboard: Vec<Vec<InlineButton>>,
    },
    Reply {
        keyboard: Vec<Vec<ReplyButton>>,
        resize_keyboard: bool,
        one_time_keyboard: bool,
    },
}

impl KeyboardMarkup {
    pub fn button_count(&self) -> usize {
        match self {
            KeyboardMarkup::Inline { inline_keyboard } => {
                inline_keyboard.iter().map(Vec::len).sum()
            }
            KeyboardMarkup::Reply { keyboard, .. } => keyboard.iter().map(Vec::len).sum(),
        }
    }

    /// Labels in row order, mostly for display and tests.
    pub fn labels(&self) -> Vec<&str> {
        match self {
            KeyboardMarkup::Inline { inline_keyboard } => inline_keyboard
                .iter()
                .flatten()
                .map(|b| b.text.as_str())
                .collect(),
            KeyboardMarkup::Reply { keyboard, .. } => keyboard
                .iter()
                .flatten()
                .map(|b| b.text.as_str())
                .collect(),
        }
    }
}

fn rows<T>(buttons: &[Button], mut make: impl FnMut(&Button) -> T) -> Vec<Vec<T>> {
    let mut rows = Vec::new();
    let mut current = Vec::new();
    for button in buttons {
        current.push(make(button));
        if button.new_row {
            rows.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        rows.push(current);
    }
    rows
}

/// Builds markup with labels passed through `label`. A keyboard without
/// buttons has no markup.
pub fn build_with(keyboard: &Keyboard, label: impl Fn(&str) -> String) -> Option<KeyboardMarkup> {
    if keyboard.buttons.is_empty() {
        return None;
    }
    let markup = match keyboard.kind {
        KeyboardKind::Inline => KeyboardMarkup::Inline {
            inline_keyboard: rows(&keyboard.buttons, |button| {
                let (url, callback_data) = match &button.action {
                    ButtonAction::Url(url) => (Some(url.clone()), None),
                    ButtonAction::Callback(data) => (None, Some(data.clone())),
                };
                InlineButton {
                    text: label(&button.text),
                    url,
                    callback_data,
                }
            }),
        },
        KeyboardKind::Reply => KeyboardMarkup::Reply {
            keyboard: rows(&keyboard.buttons, |button| ReplyButton {
                text: label(&button.text),
            }),
            resize_keyboard: keyboard.resize,
            one_time_keyboard: keyboard.one_time,
        },
    };
    Some(markup)
}

pub fn build(keyboard: &Keyboard) -> Option<KeyboardMarkup> {
    build_with(keyboard, str::to_string)
}

#[derive(Debug, Clone)]
struct CachedKeyboard {
    keyboard: Keyboard,
    markup: KeyboardMarkup,
    templated: bool,
}

/// Markup built once per declaration, looked up by name.
#[derive(Debug, Clone, Default)]
pub struct KeyboardCache {
    entries: HashMap<String, CachedKeyboard>,
}

impl KeyboardCache {
    pub fn build(keyboards: &[Keyboard]) -> Self {
        let entries = keyboards
            .iter()
            .filter_map(|keyboard| {
                build(keyboard).map(|markup| {
                    let templated = keyboard.buttons.iter().any(|b| b.text.contains('$'));
                    (
                        keyboard.name.clone(),
                        CachedKeyboard {
                            keyboard: keyboard.clone(),
                            markup,
                            templated,
                        },
                    )
                })
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&KeyboardMarkup> {
        self.entries.get(name).map(|e| &e.markup)
    }

    /// Cached markup, or a fresh one with substituted labels when any label
    /// contains a placeholder.
    pub fn resolve(
        &self,
        name: &str,
        label: impl Fn(&str) -> String,
    ) -> Option<Cow<'_, KeyboardMarkup>> {
        let entry = self.entries.get(name)?;
        if entry.templated {
            build_with(&entry.keyboard, label).map(Cow::Owned)
        } else {
            Some(Cow::Borrowed(&entry.markup))
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
