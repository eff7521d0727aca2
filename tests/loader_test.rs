use std::io::Write;

use esybot::declaration::ButtonAction;
use esybot::loader::Dialect;
use esybot::{ConfigError, Effect, KeyboardKind, Value, load_declaration, load_declaration_file};
use pretty_assertions::assert_eq;
use tempfile::Builder;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[ctor::ctor]
fn init_tests() {
    // テストの前に一度だけ実行したい処理
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

const SECTIONS: &str = r#"
; shop bot
[BOT]
token = 555:xyz
name = Shop
description = "Sells things"

[VARS]
stock = 3
price = 9.5
open = true

[KEYBOARD:main]
type = reply
button1 = Buy
button2 = Help

[START]
text = Welcome $first_name! $stock left at $price
keyboard = main

[buy]
if = $stock > 0
dec = stock
text = Sold! $stock left
else_text = Sold out
"#;

const JSON: &str = r#"{
  "bot": {"token": "1:j", "name": "Json Bot"},
  "variables": {"visits": 0, "motto": "hi"},
  "keyboards": [
    {"name": "links", "buttons": [{"text": "Site", "url": "https://example.com"}]}
  ],
  "handlers": [
    {"trigger": "message", "effects": [
      {"inc": "visits"},
      {"reply": {"text": "Visit #$visits", "keyboard": "links", "parse_mode": "HTML"}}
    ]}
  ]
}"#;

fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_sections_file() {
    let file = write_temp(".esi", SECTIONS);
    let declaration = load_declaration_file(file.path()).unwrap();

    assert_eq!(declaration.meta.name, "Shop");
    assert_eq!(declaration.meta.description, "Sells things");
    let values: Vec<&Value> = declaration.variables.iter().map(|v| &v.value).collect();
    assert_eq!(
        values,
        vec![&Value::Integer(3), &Value::Float(9.5), &Value::Boolean(true)]
    );

    let main = declaration.keyboard("main").unwrap();
    assert_eq!(main.kind, KeyboardKind::Reply);
    assert_eq!(main.buttons.len(), 2);

    let buy = declaration.handlers.iter().find(|h| h.name == "buy").unwrap();
    assert_eq!(buy.condition.as_deref(), Some("$stock > 0"));
    // text, answer, dec in that order
    let kinds: Vec<&str> = buy.effects.iter().map(Effect::kind).collect();
    assert_eq!(kinds, vec!["edit", "answer_callback", "decrement"]);
    assert_eq!(buy.else_effects.len(), 2);
}

#[test]
fn test_json_file() {
    let file = write_temp(".json", JSON);
    let declaration = load_declaration_file(file.path()).unwrap();

    assert_eq!(declaration.meta.name, "Json Bot");
    assert_eq!(declaration.variables.len(), 2);
    let links = declaration.keyboard("links").unwrap();
    assert_eq!(
        links.buttons[0].action,
        ButtonAction::Url("https://example.com".to_string())
    );
    match &declaration.handlers[0].effects[1] {
        Effect::Reply(message) => {
            assert_eq!(message.parse_mode.as_deref(), Some("HTML"));
            assert_eq!(message.keyboard.as_deref(), Some("links"));
        }
        other => panic!("unexpected effect: {:?}", other),
    }
}

#[test]
fn test_sniffed_without_hint() {
    assert!(load_declaration(SECTIONS.as_bytes(), None).is_ok());
    assert!(load_declaration(JSON.as_bytes(), None).is_ok());
    assert_eq!(Dialect::sniff(SECTIONS), Some(Dialect::Sections));
}

#[test]
fn test_missing_token() {
    let err = load_declaration(b"[VARS]\nx = 1\n", Some("bot.ini")).unwrap_err();
    assert!(matches!(err, ConfigError::MissingToken));
    let err = load_declaration(b"handlers: []\n", Some("bot.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::MissingToken));
}

#[test]
fn test_duplicate_variable_names() {
    // 同名セクションはマージされ、キーは上書きされる
    let declaration = load_declaration(
        b"[BOT]\ntoken = t\n[VARS]\nx = 1\n[VARS]\ny = 2\nx = 3\n",
        Some("bot.ini"),
    )
    .unwrap();
    assert_eq!(declaration.variables.len(), 2);
    assert_eq!(declaration.variables[0].value, Value::Integer(3));

    let err = load_declaration(
        br#"{"config": {"token": "t"}, "variables": [{"name": "x", "value": 1}, {"name": "x", "value": 2}]}"#,
        None,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateVariable(ref name) if name == "x"));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_declaration_file(dir.path().join("absent.yaml")).unwrap_err();
    assert_eq!(err.kind(), "Io");
}
