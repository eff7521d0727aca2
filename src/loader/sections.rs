//! Sections dialect.
//!
//! ```ini
//! [BOT]
//! token = 123:abc
//!
//! [VARS]
//! count = 0
//!
//! [START]
//! text = Count: $count
//! button1 = Add|add
//!
//! [add]
//! python {
//!     bonus = randint(1, 3)
//! }
//! inc = count
//! text = Count: $count (+$bonus)
//! ```
//!
//! Each section other than `[BOT]`, `[VARS]` and `[KEYBOARD:<name>]` is one
//! handler whose trigger is the section name. Its convention fields are
//! translated in the fixed order of [`EFFECT_ORDER`], whatever order they
//! appear in. Fields prefixed with `else_` build the else-effects the same
//! way.
//!
//! Script blocks (`python { ... }` or `script { ... }`) are cut out before
//! line parsing, so braces and `=` inside them never reach the line parser.
//! Line numbers of the remaining document are kept for error messages.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use crate::declaration::{
    BotMeta, Button, Declaration, Effect, Handler, Keyboard, KeyboardKind, MessageEffect,
    Variable, slug,
};
use crate::dispatch::Trigger;
use crate::error::ConfigError;
use crate::value::{Value, parse_value};

lazy_static! {
    static ref BLOCK_START: Regex =
        Regex::new(r"^\s*(?:python|script)\s*\{").expect("block pattern is valid");
}

const BLOCK_PLACEHOLDER: &str = "@@block:";
const DEFAULT_ANSWER: &str = "OK";

/// One translation step of the convention fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// `text` → send, or edit for callback triggers
    Text,
    /// `reply` → answer_callback, callback triggers only
    Answer,
    /// `inc` → increment
    Increment,
    /// `dec` → decrement
    Decrement,
    /// `set` (`name = value`) → set
    Set,
}

const EFFECT_ORDER: &[Step] = &[
    Step::Text,
    Step::Answer,
    Step::Increment,
    Step::Decrement,
    Step::Set,
];

/// Handler fields other than `button*` and `else_button*`.
const KNOWN_FIELDS: &[&str] = &[
    "text", "keyboard", "reply", "inc", "dec", "set", "if", "condition", "script", "python",
    "parse_mode",
];

#[derive(Debug, Clone, PartialEq)]
struct Field {
    key: String,
    value: String,
    line: usize,
}

#[derive(Debug, Clone, PartialEq)]
struct Section {
    name: String,
    line: usize,
    fields: Vec<Field>,
}

impl Section {
    fn get(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.key.eq_ignore_ascii_case(key))
    }

    fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a Field> + 'a {
        self.fields.iter().filter(move |f| {
            f.key
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        })
    }

    /// Later assignments replace earlier ones but keep the first position.
    fn insert(&mut self, field: Field) {
        match self
            .fields
            .iter_mut()
            .find(|f| f.key.eq_ignore_ascii_case(&field.key))
        {
            Some(existing) => {
                existing.value = field.value;
                existing.line = field.line;
            }
            None => self.fields.push(field),
        }
    }
}

pub fn parse(text: &str) -> Result<Declaration, ConfigError> {
    let (text, blocks) = extract_blocks(text)?;
    let sections = parse_sections(&text)?;
    build(&sections, &blocks)
}

/// Replaces every script block with a `script = <placeholder>` line followed
/// by blank lines, so the line count is unchanged. Block lines are trimmed.
fn extract_blocks(text: &str) -> Result<(String, Vec<String>), ConfigError> {
    let lines: Vec<&str> = text.lines().collect();
    let mut output = Vec::with_capacity(lines.len());
    let mut blocks = Vec::new();
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index];
        let Some(found) = BLOCK_START.find(line) else {
            output.push(line.to_string());
            index += 1;
            continue;
        };

        let start_line = index + 1;
        let mut scanner = BraceScanner::default();
        let mut body: Vec<String> = Vec::new();
        let mut rest = &line[found.end()..];
        let mut closed = false;

        loop {
            match scanner.scan(rest) {
                Some(end) => {
                    body.push(rest[..end].trim().to_string());
                    let trailing = rest[end + 1..].trim();
                    if !trailing.is_empty() && !trailing.starts_with('#') {
                        return Err(ConfigError::syntax(
                            index + 1,
                            format!("unexpected `{}` after script block", trailing),
                        ));
                    }
                    closed = true;
                    break;
                }
                None => {
                    body.push(rest.trim().to_string());
                    index += 1;
                    match lines.get(index) {
                        Some(next) => rest = next,
                        None => break,
                    }
                }
            }
        }
        if !closed {
            return Err(ConfigError::UnterminatedBlock { line: start_line });
        }

        output.push(format!("script = {}{}@@", BLOCK_PLACEHOLDER, blocks.len()));
        output.extend((start_line..=index).map(|_| String::new()));
        blocks.push(body.join("\n").trim().to_string());
        index += 1;
    }

    Ok((output.join("\n"), blocks))
}

/// Tracks brace depth across lines, ignoring quoted text and `#` comments.
#[derive(Debug)]
struct BraceScanner {
    depth: usize,
    quote: Option<char>,
    escaped: bool,
}

impl Default for BraceScanner {
    fn default() -> Self {
        Self {
            depth: 1,
            quote: None,
            escaped: false,
        }
    }
}

impl BraceScanner {
    /// Byte offset of the closing brace in `line`, if the block ends here.
    fn scan(&mut self, line: &str) -> Option<usize> {
        for (offset, c) in line.char_indices() {
            if let Some(quote) = self.quote {
                if self.escaped {
                    self.escaped = false;
                } else if c == '\\' {
                    self.escaped = true;
                } else if c == quote {
                    self.quote = None;
                }
                continue;
            }
            match c {
                '\'' | '"' => self.quote = Some(c),
                '#' => break,
                '{' => self.depth += 1,
                '}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        return Some(offset);
                    }
                }
                _ => {}
            }
        }
        // 文字列は行を跨がない
        self.quote = None;
        self.escaped = false;
        None
    }
}

fn parse_sections(text: &str) -> Result<Vec<Section>, ConfigError> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current: Option<usize> = None;

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') {
            let name = line
                .strip_prefix('[')
                .and_then(|l| l.strip_suffix(']'))
                .map(str::trim)
                .ok_or_else(|| ConfigError::syntax(line_no, "unclosed section heading"))?;
            if name.is_empty() {
                return Err(ConfigError::syntax(line_no, "empty section name"));
            }
            // 同名セクションはマージする
            current = match sections.iter().position(|s| s.name == name) {
                Some(position) => Some(position),
                None => {
                    sections.push(Section {
                        name: name.to_string(),
                        line: line_no,
                        fields: Vec::new(),
                    });
                    Some(sections.len() - 1)
                }
            };
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| ConfigError::syntax(line_no, "expected `key = value`"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::syntax(line_no, "missing key before `=`"));
        }
        let section = current
            .and_then(|position| sections.get_mut(position))
            .ok_or_else(|| ConfigError::syntax(line_no, "field outside of a section"))?;
        section.insert(Field {
            key: key.to_string(),
            value: value.trim().to_string(),
            line: line_no,
        });
    }

    Ok(sections)
}

fn build(sections: &[Section], blocks: &[String]) -> Result<Declaration, ConfigError> {
    let mut declaration = Declaration::default();

    for section in sections {
        let upper = section.name.to_ascii_uppercase();
        if upper == "BOT" {
            declaration.meta = bot_meta(section);
        } else if upper == "VARS" {
            declaration.variables.extend(
                section
                    .fields
                    .iter()
                    .map(|f| Variable::new(f.key.clone(), parse_value(&f.value))),
            );
        } else if let Some(name) = upper
            .strip_prefix("KEYBOARD:")
            .map(|_| section.name["KEYBOARD:".len()..].trim())
        {
            declaration.keyboards.push(keyboard(name, section)?);
        } else {
            let (handler, keyboards) = handler(section, blocks)?;
            declaration.keyboards.extend(keyboards);
            declaration.handlers.push(handler);
        }
    }

    Ok(declaration)
}

fn bot_meta(section: &Section) -> BotMeta {
    let defaults = BotMeta::default();
    let text = |key: &str| section.get(key).map(|f| unquote(&f.value));
    BotMeta {
        token: text("token").unwrap_or_default(),
        name: text("name").unwrap_or(defaults.name),
        version: text("version").unwrap_or(defaults.version),
        description: text("description").unwrap_or_default(),
    }
}

/// Quoted values lose their quotes, everything else is kept as written.
fn unquote(raw: &str) -> String {
    match parse_value(raw) {
        Value::String(s) => s,
        _ => raw.trim().to_string(),
    }
}

fn flag(field: &Field) -> Result<bool, ConfigError> {
    match parse_value(&field.value) {
        Value::Boolean(b) => Ok(b),
        _ => Err(ConfigError::syntax(
            field.line,
            format!("`{}` must be true or false", field.key),
        )),
    }
}

fn keyboard(name: &str, section: &Section) -> Result<Keyboard, ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::syntax(section.line, "keyboard section without a name"));
    }
    let kind = match section.get("type") {
        Some(field) => field.value.parse::<KeyboardKind>().map_err(|_| {
            ConfigError::syntax(
                field.line,
                format!("unknown keyboard type `{}`", field.value),
            )
        })?,
        None => KeyboardKind::default(),
    };
    let mut keyboard = Keyboard {
        kind,
        ..Keyboard::inline(name, buttons(section, "button")?)
    };
    if let Some(field) = section.get("resize") {
        keyboard.resize = flag(field)?;
    }
    if let Some(field) = section.get("one_time") {
        keyboard.one_time = flag(field)?;
    }
    Ok(keyboard)
}

/// `Label|callback`, `Label|https://url` or a bare `Label`.
fn button(field: &Field) -> Result<Button, ConfigError> {
    let parts: Vec<&str> = field.value.split('|').map(str::trim).collect();
    match parts.as_slice() {
        [label] if !label.is_empty() => Ok(Button::callback(*label, slug(label))),
        [label, target] if !label.is_empty() && !target.is_empty() => {
            if target.starts_with("http://")
                || target.starts_with("https://")
                || target.starts_with("tg://")
            {
                Ok(Button::url(*label, *target))
            } else {
                Ok(Button::callback(*label, *target))
            }
        }
        _ => Err(ConfigError::syntax(
            field.line,
            format!("expected `Label|callback` in `{}`", field.key),
        )),
    }
}

fn buttons(section: &Section, prefix: &str) -> Result<Vec<Button>, ConfigError> {
    section.with_prefix(prefix).map(button).collect()
}

/// Field names of one branch: `text`, `reply`, ... or `else_text`,
/// `else_reply`, ...
struct Branch {
    prefix: &'static str,
}

impl Branch {
    const PRIMARY: Branch = Branch { prefix: "" };
    const ELSE: Branch = Branch { prefix: "else_" };

    fn field<'a>(&self, section: &'a Section, name: &str) -> Option<&'a Field> {
        section.get(&format!("{}{}", self.prefix, name))
    }

    fn is_present(&self, section: &Section) -> bool {
        ["text", "keyboard", "button", "reply", "inc", "dec", "set"]
            .iter()
            .any(|name| {
                let key = format!("{}{}", self.prefix, name);
                let found = section.with_prefix(&key).next().is_some();
                found
            })
    }

    fn effects(
        &self,
        section: &Section,
        callback: bool,
        keyboards: &mut Vec<Keyboard>,
    ) -> Result<Vec<Effect>, ConfigError> {
        let mut effects = Vec::new();
        for step in EFFECT_ORDER {
            match step {
                Step::Text => {
                    if let Some(field) = self.field(section, "text") {
                        let mut message = MessageEffect::text(unquote(&field.value));
                        message.keyboard = self.keyboard(section, keyboards)?;
                        message.parse_mode =
                            self.field(section, "parse_mode").map(|f| f.value.clone());
                        effects.push(if callback {
                            Effect::Edit(message)
                        } else {
                            Effect::Send(message)
                        });
                    }
                }
                Step::Answer => {
                    let reply = self.field(section, "reply");
                    if callback {
                        effects.push(Effect::AnswerCallback {
                            text: Some(
                                reply
                                    .map(|f| unquote(&f.value))
                                    .unwrap_or_else(|| DEFAULT_ANSWER.to_string()),
                            ),
                            alert: false,
                        });
                    } else if let Some(field) = reply {
                        warn!(
                            section = %section.name,
                            line = field.line,
                            "`reply` only applies to button sections, ignored"
                        );
                    }
                }
                Step::Increment => {
                    if let Some(field) = self.field(section, "inc") {
                        effects.push(Effect::increment(variable_name(field)?));
                    }
                }
                Step::Decrement => {
                    if let Some(field) = self.field(section, "dec") {
                        effects.push(Effect::decrement(variable_name(field)?));
                    }
                }
                Step::Set => {
                    if let Some(field) = self.field(section, "set") {
                        let (variable, value) = field
                            .value
                            .split_once('=')
                            .map(|(n, v)| (n.trim(), v.trim()))
                            .filter(|(n, _)| !n.is_empty())
                            .ok_or_else(|| {
                                ConfigError::syntax(field.line, "expected `set = name = value`")
                            })?;
                        effects.push(Effect::set(variable, value));
                    }
                }
            }
        }
        Ok(effects)
    }

    /// A named `keyboard` field, or an inline keyboard synthesized from the
    /// branch's `button*` fields.
    fn keyboard(
        &self,
        section: &Section,
        keyboards: &mut Vec<Keyboard>,
    ) -> Result<Option<String>, ConfigError> {
        let prefix = format!("{}button", self.prefix);
        let buttons = buttons(section, &prefix)?;
        if let Some(field) = self.field(section, "keyboard") {
            if !buttons.is_empty() {
                warn!(
                    section = %section.name,
                    line = field.line,
                    "both `keyboard` and buttons given, using the named keyboard"
                );
            }
            return Ok(Some(field.value.clone()));
        }
        if buttons.is_empty() {
            return Ok(None);
        }
        let name = format!("{}:{}buttons", section.name, self.prefix);
        keyboards.push(Keyboard::inline(name.clone(), buttons));
        Ok(Some(name))
    }
}

fn variable_name(field: &Field) -> Result<String, ConfigError> {
    let name = field.value.trim();
    if name.is_empty() {
        return Err(ConfigError::syntax(
            field.line,
            format!("`{}` needs a variable name", field.key),
        ));
    }
    Ok(name.to_string())
}

fn script(field: &Field, blocks: &[String]) -> String {
    let value = field.value.trim();
    let block = value
        .strip_prefix(BLOCK_PLACEHOLDER)
        .and_then(|rest| rest.strip_suffix("@@"))
        .and_then(|index| index.parse::<usize>().ok())
        .and_then(|index| blocks.get(index));
    match block {
        Some(body) => body.clone(),
        None => unquote(value),
    }
}

fn handler(section: &Section, blocks: &[String]) -> Result<(Handler, Vec<Keyboard>), ConfigError> {
    let callback = matches!(Trigger::normalize(&section.name), Trigger::Callback(_));
    let mut keyboards = Vec::new();

    let effects = Branch::PRIMARY.effects(section, callback, &mut keyboards)?;
    let else_effects = if Branch::ELSE.is_present(section) {
        Branch::ELSE.effects(section, callback, &mut keyboards)?
    } else {
        Vec::new()
    };

    for field in &section.fields {
        let key = field.key.to_ascii_lowercase();
        let bare = key.strip_prefix("else_").unwrap_or(&key);
        if !KNOWN_FIELDS.contains(&bare) && !bare.starts_with("button") {
            warn!(section = %section.name, line = field.line, field = %field.key, "unknown field ignored");
        }
    }

    let handler = Handler {
        name: section.name.clone(),
        trigger: section.name.clone(),
        condition: section
            .get("if")
            .or_else(|| section.get("condition"))
            .map(|f| f.value.clone())
            .filter(|c| !c.is_empty()),
        effects,
        else_effects,
        script: section
            .get("script")
            .or_else(|| section.get("python"))
            .map(|f| script(f, blocks))
            .filter(|s| !s.is_empty()),
    };
    debug!(
        handler = %handler.name,
        callback,
        effects = handler.effects.len(),
        else_effects = handler.else_effects.len(),
        "section translated"
    );
    Ok((handler, keyboards))
}
