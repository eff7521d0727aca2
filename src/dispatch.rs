//! # Handler Dispatch Table
//!
//! Maps a normalized [`Trigger`] to at most one handler.
//!
//! | raw descriptor                     | trigger            |
//! |------------------------------------|--------------------|
//! | `start`, `/start`                  | `Start`            |
//! | `command:<n>`, `/<n>`              | `Command(n)`       |
//! | `callback:<t>`                     | `Callback(t)`      |
//! | `message`, `text`                  | `Message`          |
//! | `photo`, `document`, `voice`, ...  | `Content(..)`      |
//! | anything else                      | `Callback(raw)`    |
//!
//! Keywords and command names are case-insensitive; callback tokens keep
//! their case.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::context::{ContentType, InboundEvent};
use crate::declaration::Handler;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Trigger {
    Start,
    Command(String),
    Callback(String),
    Message,
    Content(ContentType),
}

impl Trigger {
    pub fn normalize(raw: &str) -> Self {
        let raw = raw.trim();
        let lower = raw.to_ascii_lowercase();

        if let Some(name) = lower.strip_prefix("command:") {
            return Self::command(name);
        }
        if let Some(name) = lower.strip_prefix('/') {
            return Self::command(name);
        }
        if lower.starts_with("callback:") {
            return Trigger::Callback(raw["callback:".len()..].trim().to_string());
        }
        match lower.as_str() {
            "start" => Trigger::Start,
            "message" | "text" => Trigger::Message,
            _ => match lower.parse::<ContentType>() {
                Ok(content) => Trigger::Content(content),
                Err(_) => Trigger::Callback(raw.to_string()),
            },
        }
    }

    fn command(name: &str) -> Self {
        let name = name.trim();
        if name == "start" {
            Trigger::Start
        } else {
            Trigger::Command(name.to_string())
        }
    }

    /// Commands never fall through to the `Message` trigger.
    pub fn from_event(event: &InboundEvent) -> Self {
        match event {
            InboundEvent::Callback { data, .. } => Trigger::Callback(data.clone()),
            InboundEvent::Media { content, .. } => Trigger::Content(*content),
            InboundEvent::Message { text, .. } => match text.trim_start().strip_prefix('/') {
                Some(rest) => {
                    // "/add@MyBot 5" -> "add"
                    let word = rest.split_whitespace().next().unwrap_or_default();
                    let name = word.split('@').next().unwrap_or_default();
                    Self::command(&name.to_ascii_lowercase())
                }
                None => Trigger::Message,
            },
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Start => write!(f, "start"),
            Trigger::Command(name) => write!(f, "command:{}", name),
            Trigger::Callback(token) => write!(f, "callback:{}", token),
            Trigger::Message => write!(f, "message"),
            Trigger::Content(content) => write!(f, "{}", content),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DispatchTable {
    handlers: HashMap<Trigger, Arc<Handler>>,
}

impl DispatchTable {
    pub fn from_handlers(handlers: &[Handler]) -> Self {
        let mut table = Self::default();
        for handler in handlers {
            table.insert(handler.clone());
        }
        table
    }

    /// Registers a handler. The last registration for a trigger wins.
    pub fn insert(&mut self, handler: Handler) -> Option<Arc<Handler>> {
        let trigger = Trigger::normalize(&handler.trigger);
        let replaced = self.handlers.insert(trigger.clone(), Arc::new(handler));
        if let Some(previous) = &replaced {
            warn!(
                trigger = %trigger,
                replaced = %previous.name,
                "duplicate trigger, keeping the last handler"
            );
        }
        replaced
    }

    pub fn lookup(&self, trigger: &Trigger) -> Option<Arc<Handler>> {
        self.handlers.get(trigger).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn triggers(&self) -> impl Iterator<Item = &Trigger> {
        self.handlers.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{MessageRef, Sender};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize() {
        assert_eq!(Trigger::normalize("START"), Trigger::Start);
        assert_eq!(Trigger::normalize("/start"), Trigger::Start);
        assert_eq!(
            Trigger::normalize("COMMAND:Help"),
            Trigger::Command("help".to_string())
        );
        assert_eq!(
            Trigger::normalize("/stats"),
            Trigger::Command("stats".to_string())
        );
        assert_eq!(
            Trigger::normalize("CALLBACK:Add_One"),
            Trigger::Callback("Add_One".to_string())
        );
        assert_eq!(Trigger::normalize("Text"), Trigger::Message);
        assert_eq!(
            Trigger::normalize("PHOTO"),
            Trigger::Content(ContentType::Photo)
        );
        assert_eq!(
            Trigger::normalize("Menu_Main"),
            Trigger::Callback("Menu_Main".to_string())
        );
    }

    fn message(text: &str) -> InboundEvent {
        InboundEvent::Message {
            sender: Sender::default(),
            chat_id: 1,
            message_id: 1,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_from_event() {
        assert_eq!(Trigger::from_event(&message("/start")), Trigger::Start);
        assert_eq!(
            Trigger::from_event(&message("/Add@MyBot 5")),
            Trigger::Command("add".to_string())
        );
        assert_eq!(Trigger::from_event(&message("hello")), Trigger::Message);
        assert_eq!(
            Trigger::from_event(&InboundEvent::Callback {
                sender: Sender::default(),
                chat_id: 1,
                callback_id: "x".to_string(),
                data: "Add_One".to_string(),
                message: Some(MessageRef {
                    chat_id: 1,
                    message_id: 2
                }),
            }),
            Trigger::Callback("Add_One".to_string())
        );
    }

    #[test]
    fn test_last_registration_wins() {
        let table = DispatchTable::from_handlers(&[
            Handler::new("first", "/start"),
            Handler::new("help", "command:help"),
            Handler::new("second", "START"),
        ]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup(&Trigger::Start).unwrap().name, "second");
        assert!(table.lookup(&Trigger::Message).is_none());
    }
}
