//! # Template Substitution
//!
//! Resolves `$name` and `${name}` placeholders. A name is
//! `[A-Za-z_][A-Za-z0-9_]*`, matched greedily.
//!
//! ## Resolution order
//!
//! 1. declared variables in the [`VariableStore`]
//! 2. the script scratch scope
//! 3. system bindings from the [`EventContext`] (`user_id`, `chat_id`,
//!    `first_name`, `username`, `text`, `data`, `date`, `time`, `datetime`)
//!
//! User variables win when a name collides with a system binding.
//! Unresolved placeholders are kept verbatim. Substitution is a single pass:
//! an inserted value is never scanned again, so a variable holding `$y`
//! produces the literal text `$y`.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, satisfy},
    combinator::{map, recognize},
    multi::many0,
    sequence::{delimited, pair, preceded},
};

use crate::context::EventContext;
use crate::store::VariableStore;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart<'a> {
    Literal(&'a str),
    Placeholder { name: &'a str, braced: bool },
}

fn parse_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

fn parse_braced(input: &str) -> IResult<&str, TemplatePart<'_>> {
    map(delimited(tag("${"), parse_name, char('}')), |name| {
        TemplatePart::Placeholder { name, braced: true }
    })(input)
}

fn parse_bare(input: &str) -> IResult<&str, TemplatePart<'_>> {
    map(preceded(char('$'), parse_name), |name| {
        TemplatePart::Placeholder {
            name,
            braced: false,
        }
    })(input)
}

fn parse_literal(input: &str) -> IResult<&str, TemplatePart<'_>> {
    alt((
        map(take_while1(|c| c != '$'), TemplatePart::Literal),
        map(tag("$"), TemplatePart::Literal),
    ))(input)
}

/// Splits a template into literal runs and placeholders.
pub fn parse_template(input: &str) -> Vec<TemplatePart<'_>> {
    match many0(alt((parse_braced, parse_bare, parse_literal)))(input) {
        Ok((_, parts)) => parts,
        // 全ての入力はリテラルとして受理されるので到達しない
        Err(_) => vec![TemplatePart::Literal(input)],
    }
}

#[derive(Clone, Debug)]
pub struct TemplateEngine {
    store: VariableStore,
}

impl TemplateEngine {
    pub fn new(store: VariableStore) -> Self {
        Self { store }
    }

    pub fn resolve(&self, name: &str, context: &EventContext) -> Option<Value> {
        self.store
            .get(name)
            .or_else(|| self.store.scratch(name))
            .or_else(|| context.system_binding(name))
    }

    pub fn substitute(&self, text: &str, context: &EventContext) -> String {
        if !text.contains('$') {
            return text.to_string();
        }

        let mut output = String::with_capacity(text.len());
        for part in parse_template(text) {
            match part {
                TemplatePart::Literal(s) => output.push_str(s),
                TemplatePart::Placeholder { name, braced } => {
                    match self.resolve(name, context) {
                        Some(value) => output.push_str(&value.to_string()),
                        None if braced => {
                            output.push_str("${");
                            output.push_str(name);
                            output.push('}');
                        }
                        None => {
                            output.push('$');
                            output.push_str(name);
                        }
                    }
                }
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::Variable;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn engine(vars: &[Variable]) -> TemplateEngine {
        TemplateEngine::new(VariableStore::seeded(vars))
    }

    #[test]
    fn test_parse_template_parts() {
        assert_eq!(
            parse_template("Hi ${name}, $x!"),
            vec![
                TemplatePart::Literal("Hi "),
                TemplatePart::Placeholder {
                    name: "name",
                    braced: true
                },
                TemplatePart::Literal(", "),
                TemplatePart::Placeholder {
                    name: "x",
                    braced: false
                },
                TemplatePart::Literal("!"),
            ]
        );
        assert_eq!(
            parse_template("$5 and $"),
            vec![
                TemplatePart::Literal("$"),
                TemplatePart::Literal("5 and "),
                TemplatePart::Literal("$"),
            ]
        );
    }

    #[test]
    fn test_substitute_variables_and_system() {
        let engine = engine(&[Variable::new("count", 3), Variable::new("ratio", 0.5)]);
        let mut ctx = EventContext::synthetic(10);
        ctx.first_name = "Bob".to_string();
        assert_eq!(
            engine.substitute("Count: $count, ${ratio} for $first_name in $chat_id", &ctx),
            "Count: 3, 0.5 for Bob in 10"
        );
    }

    #[test]
    fn test_unknown_placeholders_are_kept() {
        let engine = engine(&[]);
        let ctx = EventContext::synthetic(1);
        assert_eq!(engine.substitute("$nope ${nada} $", &ctx), "$nope ${nada} $");
    }

    #[test]
    fn test_greedy_names() {
        let engine = engine(&[Variable::new("count", 1)]);
        let ctx = EventContext::synthetic(1);
        assert_eq!(engine.substitute("$counter ${count}er", &ctx), "$counter 1er");
    }

    #[test]
    fn test_no_recursive_expansion() {
        let engine = engine(&[Variable::new("x", "$y"), Variable::new("y", "5")]);
        let ctx = EventContext::synthetic(1);
        assert_eq!(engine.substitute("$x", &ctx), "$y");
    }

    #[test]
    fn test_user_variable_beats_system_binding() {
        let engine = engine(&[Variable::new("text", "declared")]);
        let mut ctx = EventContext::synthetic(1);
        ctx.text = "inbound".to_string();
        assert_eq!(engine.substitute("$text", &ctx), "declared");
    }

    #[test]
    fn test_scratch_scope_after_variables() {
        let store = VariableStore::seeded(&[Variable::new("a", 1)]);
        store.set_scratch("luck", Value::Integer(77));
        store.set_scratch("a", Value::Integer(2));
        let engine = TemplateEngine::new(store);
        let ctx = EventContext::synthetic(1);
        assert_eq!(engine.substitute("$a $luck", &ctx), "1 77");
    }

    proptest! {
        #[test]
        fn prop_substitution_is_repeatable(text in "[abcxy $\\{\\}]{0,40}") {
            let engine = engine(&[Variable::new("x", 9), Variable::new("y", "$x")]);
            let ctx = EventContext::synthetic(1);
            let first = engine.substitute(&text, &ctx);
            let second = engine.substitute(&text, &ctx);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_text_without_dollar_is_unchanged(text in "[^$]{0,60}") {
            let engine = engine(&[Variable::new("x", 9)]);
            let ctx = EventContext::synthetic(1);
            prop_assert_eq!(engine.substitute(&text, &ctx), text);
        }
    }
}
