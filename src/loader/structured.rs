//! Structured dialect (YAML and JSON).
//!
//! ```yaml
//! config:
//!   token: "123:abc"
//!   name: Counter
//! variables:
//!   - name: count
//!     value: 0
//! keyboards:
//!   - name: menu
//!     type: inline
//!     buttons:
//!       - text: Add
//!         callback_data: add
//! handlers:
//!   - name: start
//!     trigger: start
//!     effects:
//!       - send:
//!           text: "Count: $count"
//!           keyboard: menu
//! ```
//!
//! Both formats are read into a [`serde_json::Value`] tree first, so the
//! lowering below is shared. Scalars keep their native types.

use serde_json::{Map, Value as JsonValue};

use crate::declaration::{
    BotMeta, Button, ButtonAction, Declaration, Effect, Handler, Keyboard, KeyboardKind,
    MessageEffect, Variable, slug,
};
use crate::error::ConfigError;
use crate::value::Value;

type Object = Map<String, JsonValue>;

pub fn from_yaml(text: &str) -> Result<Declaration, ConfigError> {
    let document: JsonValue = serde_yaml::from_str(text)?;
    from_document(&document)
}

pub fn from_json(text: &str) -> Result<Declaration, ConfigError> {
    let document: JsonValue = serde_json::from_str(text)?;
    from_document(&document)
}

pub fn from_document(document: &JsonValue) -> Result<Declaration, ConfigError> {
    let root = document
        .as_object()
        .ok_or_else(|| ConfigError::invalid("document", "expected a mapping at the top level"))?;

    let meta = match root.get("config").or_else(|| root.get("bot")) {
        Some(config) => bot_meta(config)?,
        None => BotMeta::default(),
    };

    Ok(Declaration {
        meta,
        variables: variables(root.get("variables"))?,
        keyboards: list(root.get("keyboards"), "keyboards")?
            .iter()
            .enumerate()
            .map(|(index, item)| keyboard(index, item))
            .collect::<Result<_, _>>()?,
        handlers: list(root.get("handlers"), "handlers")?
            .iter()
            .enumerate()
            .map(|(index, item)| handler(index, item))
            .collect::<Result<_, _>>()?,
    })
}

fn list<'a>(value: Option<&'a JsonValue>, location: &str) -> Result<&'a [JsonValue], ConfigError> {
    match value {
        None | Some(JsonValue::Null) => Ok(&[]),
        Some(JsonValue::Array(items)) => Ok(items),
        Some(_) => Err(ConfigError::invalid(location, "expected a list")),
    }
}

fn object<'a>(value: &'a JsonValue, location: &str) -> Result<&'a Object, ConfigError> {
    value
        .as_object()
        .ok_or_else(|| ConfigError::invalid(location, "expected a mapping"))
}

/// Strings, numbers and booleans as text.
fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn text_field(object: &Object, key: &str) -> Option<String> {
    object.get(key).and_then(scalar_text)
}

fn required_text(object: &Object, key: &str, location: &str) -> Result<String, ConfigError> {
    text_field(object, key).ok_or_else(|| ConfigError::missing(location, key))
}

fn bool_field(
    object: &Object,
    key: &str,
    default: bool,
    location: &str,
) -> Result<bool, ConfigError> {
    match object.get(key) {
        None | Some(JsonValue::Null) => Ok(default),
        Some(JsonValue::Bool(b)) => Ok(*b),
        Some(other) => Err(ConfigError::invalid(
            location,
            format!("`{}` must be a boolean, got {}", key, other),
        )),
    }
}

fn bot_meta(config: &JsonValue) -> Result<BotMeta, ConfigError> {
    let config = object(config, "config")?;
    let defaults = BotMeta::default();
    Ok(BotMeta {
        token: text_field(config, "token").unwrap_or_default(),
        name: text_field(config, "name").unwrap_or(defaults.name),
        version: text_field(config, "version").unwrap_or(defaults.version),
        description: text_field(config, "description").unwrap_or_default(),
    })
}

fn variable_value(value: &JsonValue, location: &str) -> Result<Value, ConfigError> {
    Value::from_json(value).ok_or_else(|| {
        ConfigError::invalid(location, format!("expected a scalar value, got {}", value))
    })
}

fn variables(value: Option<&JsonValue>) -> Result<Vec<Variable>, ConfigError> {
    match value {
        None | Some(JsonValue::Null) => Ok(Vec::new()),
        // name: value
        Some(JsonValue::Object(map)) => map
            .iter()
            .map(|(name, value)| -> Result<Variable, ConfigError> {
                let location = format!("variable `{}`", name);
                Ok(Variable::new(name.clone(), variable_value(value, &location)?))
            })
            .collect(),
        Some(JsonValue::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(index, item)| -> Result<Variable, ConfigError> {
                let location = format!("variables[{}]", index);
                let entry = object(item, &location)?;
                let name = required_text(entry, "name", &location)?;
                let location = format!("variable `{}`", name);
                let value = entry
                    .get("value")
                    .ok_or_else(|| ConfigError::missing(location.as_str(), "value"))?;
                Ok(Variable {
                    value: variable_value(value, &location)?,
                    type_hint: text_field(entry, "type"),
                    description: text_field(entry, "description"),
                    name,
                })
            })
            .collect(),
        Some(_) => Err(ConfigError::invalid(
            "variables",
            "expected a list or a mapping",
        )),
    }
}

fn keyboard(index: usize, item: &JsonValue) -> Result<Keyboard, ConfigError> {
    let location = format!("keyboards[{}]", index);
    let entry = object(item, &location)?;
    let name = required_text(entry, "name", &location)?;
    let location = format!("keyboard `{}`", name);

    let kind = match text_field(entry, "type") {
        None => KeyboardKind::default(),
        Some(kind) => kind.parse().map_err(|_| {
            ConfigError::invalid(location.as_str(), format!("unknown keyboard type `{}`", kind))
        })?,
    };

    let buttons = list(entry.get("buttons"), &location)?
        .iter()
        .map(|button| self::button(button, &location))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Keyboard {
        kind,
        buttons,
        resize: bool_field(entry, "resize", true, &location)?,
        one_time: bool_field(entry, "one_time", false, &location)?,
        name,
    })
}

/// `callback_data`, else `action`, else a slug of the label.
fn button(item: &JsonValue, location: &str) -> Result<Button, ConfigError> {
    if let Some(label) = item.as_str() {
        return Ok(Button::callback(label, slug(label)));
    }
    let entry = object(item, location)?;
    let text = required_text(entry, "text", location)?;
    let action = match text_field(entry, "url").filter(|u| !u.is_empty()) {
        Some(url) => ButtonAction::Url(url),
        None => ButtonAction::Callback(
            text_field(entry, "callback_data")
                .or_else(|| text_field(entry, "action"))
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| slug(&text)),
        ),
    };
    Ok(Button {
        text,
        action,
        new_row: bool_field(entry, "new_row", false, location)?,
    })
}

fn handler(index: usize, item: &JsonValue) -> Result<Handler, ConfigError> {
    let location = format!("handlers[{}]", index);
    let entry = object(item, &location)?;
    let trigger = required_text(entry, "trigger", &location)?;
    let name = text_field(entry, "name").unwrap_or_else(|| trigger.clone());

    let primary = effects(entry.get("effects"), &name)?;
    let else_effects = effects(entry.get("else").or_else(|| entry.get("else_effects")), &name)?;

    Ok(Handler {
        condition: text_field(entry, "condition").filter(|c| !c.trim().is_empty()),
        script: text_field(entry, "script")
            .or_else(|| text_field(entry, "python"))
            .filter(|s| !s.trim().is_empty()),
        effects: primary,
        else_effects,
        trigger,
        name,
    })
}

fn effects(value: Option<&JsonValue>, handler: &str) -> Result<Vec<Effect>, ConfigError> {
    let location = format!("handler `{}`", handler);
    list(value, &location)?
        .iter()
        .enumerate()
        .map(|(index, item)| effect(item, handler, index))
        .collect()
}

/// `{kind: params}` or a bare `kind`.
fn effect(item: &JsonValue, handler: &str, index: usize) -> Result<Effect, ConfigError> {
    let location = format!("handler `{}` effect #{}", handler, index + 1);
    let (kind, params) = match item {
        JsonValue::String(kind) => (kind.as_str(), &JsonValue::Null),
        JsonValue::Object(map) if map.len() == 1 => match map.iter().next() {
            Some((kind, params)) => (kind.as_str(), params),
            None => return Err(ConfigError::invalid(location, "empty effect")),
        },
        _ => {
            return Err(ConfigError::invalid(
                location,
                "expected `kind` or a single-key mapping `kind: params`",
            ));
        }
    };

    let effect = match kind {
        "send" => Effect::Send(message(params, &location)?),
        "reply" => Effect::Reply(message(params, &location)?),
        "edit" => Effect::Edit(message(params, &location)?),
        "answer_callback" | "answer" => match params {
            JsonValue::Null => Effect::AnswerCallback {
                text: None,
                alert: false,
            },
            JsonValue::Object(map) => Effect::AnswerCallback {
                text: text_field(map, "text"),
                alert: bool_field(map, "alert", false, &location)?,
            },
            other => Effect::AnswerCallback {
                text: scalar_text(other),
                alert: false,
            },
        },
        "increment" | "inc" => {
            let (variable, amount) = step(params, &location)?;
            Effect::Increment { variable, amount }
        }
        "decrement" | "dec" => {
            let (variable, amount) = step(params, &location)?;
            Effect::Decrement { variable, amount }
        }
        "set" => set(params, &location)?,
        other => {
            return Err(ConfigError::UnknownEffect {
                handler: handler.to_string(),
                kind: other.to_string(),
            });
        }
    };
    Ok(effect)
}

fn message(params: &JsonValue, location: &str) -> Result<MessageEffect, ConfigError> {
    match params {
        JsonValue::Object(map) => Ok(MessageEffect {
            text: required_text(map, "text", location)?,
            keyboard: text_field(map, "keyboard").filter(|k| !k.is_empty()),
            parse_mode: text_field(map, "parse_mode").filter(|p| !p.is_empty()),
        }),
        JsonValue::Null => Err(ConfigError::missing(location, "text")),
        other => scalar_text(other)
            .map(MessageEffect::text)
            .ok_or_else(|| ConfigError::invalid(location, "expected text or a mapping")),
    }
}

fn step(params: &JsonValue, location: &str) -> Result<(String, Value), ConfigError> {
    match params {
        JsonValue::String(variable) => Ok((variable.clone(), Value::Integer(1))),
        JsonValue::Object(map) => {
            let variable = required_text(map, "variable", location)?;
            let amount = match map.get("amount") {
                None | Some(JsonValue::Null) => Value::Integer(1),
                Some(amount) => match Value::from_json(amount) {
                    Some(value) if value.is_numeric() => value,
                    _ => {
                        return Err(ConfigError::invalid(
                            location,
                            format!("`amount` must be a number, got {}", amount),
                        ));
                    }
                },
            };
            Ok((variable, amount))
        }
        _ => Err(ConfigError::missing(location, "variable")),
    }
}

/// `{variable, value}` or `"name = value"`.
fn set(params: &JsonValue, location: &str) -> Result<Effect, ConfigError> {
    match params {
        JsonValue::Object(map) => {
            let variable = required_text(map, "variable", location)?;
            let value = match map.get("value") {
                Some(value) => scalar_text(value).ok_or_else(|| {
                    ConfigError::invalid(location, format!("expected a scalar value, got {}", value))
                })?,
                None => return Err(ConfigError::missing(location, "value")),
            };
            Ok(Effect::Set { variable, value })
        }
        JsonValue::String(assignment) => match assignment.split_once('=') {
            Some((variable, value)) if !variable.trim().is_empty() => {
                Ok(Effect::set(variable.trim(), value.trim()))
            }
            _ => Err(ConfigError::invalid(location, "expected `name = value`")),
        },
        _ => Err(ConfigError::missing(location, "variable")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const COUNTER: &str = r#"
config:
  token: "123:abc"
  name: Counter
  version: 2
variables:
  - name: count
    value: 0
  - name: label
    value: "1"
    type: str
keyboards:
  - name: menu
    type: inline
    buttons:
      - text: Add One
        new_row: true
      - text: Stats
        action: show_stats
      - text: Docs
        url: https://example.com
handlers:
  - name: start
    trigger: start
    effects:
      - send:
          text: "Count: $count"
          keyboard: menu
  - trigger: callback:add_one
    condition: "$count < 10"
    python: "count += 1"
    effects:
      - increment: count
      - edit: "Count: $count"
      - answer_callback
    else:
      - answer_callback:
          text: Limit reached
          alert: true
"#;

    #[test]
    fn test_yaml_counter() {
        let declaration = from_yaml(COUNTER).unwrap();
        assert_eq!(declaration.meta.name, "Counter");
        assert_eq!(declaration.meta.version, "2");
        assert_eq!(declaration.variables[0].value, Value::Integer(0));
        assert_eq!(declaration.variables[1].value, Value::String("1".to_string()));
        assert_eq!(declaration.variables[1].type_hint.as_deref(), Some("str"));

        let menu = &declaration.keyboards[0];
        assert_eq!(
            menu.buttons,
            vec![
                Button::callback("Add One", "add_one").with_new_row(),
                Button::callback("Stats", "show_stats"),
                Button::url("Docs", "https://example.com"),
            ]
        );

        let add = &declaration.handlers[1];
        assert_eq!(add.name, "callback:add_one");
        assert_eq!(add.script.as_deref(), Some("count += 1"));
        assert_eq!(
            add.effects,
            vec![
                Effect::increment("count"),
                Effect::Edit(MessageEffect::text("Count: $count")),
                Effect::AnswerCallback {
                    text: None,
                    alert: false
                },
            ]
        );
        assert_eq!(
            add.else_effects,
            vec![Effect::AnswerCallback {
                text: Some("Limit reached".to_string()),
                alert: true
            }]
        );
    }

    #[test]
    fn test_else_effects_alias() {
        let declaration = from_yaml(
            r#"
config:
  token: "1:x"
handlers:
  - trigger: message
    condition: "1 == 2"
    effects:
      - send: primary
    else_effects:
      - reply: fallback
"#,
        )
        .unwrap();
        let handler = &declaration.handlers[0];
        assert_eq!(handler.effects, vec![Effect::send("primary")]);
        assert_eq!(
            handler.else_effects,
            vec![Effect::Reply(MessageEffect::text("fallback"))]
        );
    }

    #[test]
    fn test_json_with_variable_mapping() {
        let declaration = from_json(
            r#"{
                "bot": {"token": "t"},
                "variables": {"count": 1, "ratio": 0.5, "on": true},
                "handlers": [
                    {"trigger": "message", "effects": [
                        {"set": "mode = $text"},
                        {"decrement": {"variable": "ratio", "amount": 0.25}},
                        {"reply": {"text": "<b>ok</b>", "parse_mode": "HTML"}}
                    ]}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(declaration.meta.name, "ESYBOT");
        assert_eq!(declaration.variables.len(), 3);
        let effects = &declaration.handlers[0].effects;
        assert_eq!(effects[0], Effect::set("mode", "$text"));
        assert_eq!(
            effects[1],
            Effect::Decrement {
                variable: "ratio".to_string(),
                amount: Value::Float(0.25)
            }
        );
        match &effects[2] {
            Effect::Reply(message) => assert_eq!(message.parse_mode.as_deref(), Some("HTML")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_effect_errors() {
        let err = from_json(r#"{"handlers": [{"name": "h", "trigger": "start", "effects": ["explode"]}]}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownEffect { ref handler, ref kind } if handler == "h" && kind == "explode"
        ));

        let err = from_json(r#"{"handlers": [{"trigger": "start", "effects": [{"send": {"keyboard": "k"}}]}]}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field, .. } if field == "text"));

        let err = from_json(r#"{"handlers": [{"trigger": "x", "effects": [{"increment": {"variable": "n", "amount": "lots"}}]}]}"#)
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidValue");

        let err = from_json(r#"{"handlers": [{"effects": []}]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field, .. } if field == "trigger"));
    }

    #[test]
    fn test_malformed_documents() {
        assert_eq!(from_yaml("config: [unclosed").unwrap_err().kind(), "Yaml");
        assert_eq!(from_json("[1, 2]").unwrap_err().kind(), "InvalidValue");
        assert_eq!(
            from_json(r#"{"variables": [{"name": "x", "value": [1]}]}"#)
                .unwrap_err()
                .kind(),
            "InvalidValue"
        );
    }
}
