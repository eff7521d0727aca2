//! # Effect Executor
//!
//! Runs a handler's effects strictly in declaration order. Execution is
//! best-effort: a failing effect is logged with the handler name and error
//! kind, and the next effect still runs. Mutations are visible to every later
//! effect of the same invocation.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::context::EventContext;
use crate::declaration::{Effect, MessageEffect};
use crate::error::EffectError;
use crate::keyboard::{KeyboardCache, KeyboardMarkup};
use crate::messenger::{Messenger, OutboundMessage};
use crate::store::VariableStore;
use crate::template::TemplateEngine;
use crate::value::{Value, parse_value};

/// Counters for one effect list run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EffectSummary {
    pub executed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Requests handed to the messenger, successful or not.
    pub outbound: usize,
}

impl EffectSummary {
    pub fn merge(&mut self, other: EffectSummary) {
        self.executed += other.executed;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.outbound += other.outbound;
    }
}

enum Applied {
    Done,
    Skipped,
}

#[derive(Clone)]
pub struct EffectExecutor {
    store: VariableStore,
    templates: TemplateEngine,
    keyboards: Arc<KeyboardCache>,
    messenger: Arc<dyn Messenger>,
}

impl EffectExecutor {
    pub fn new(
        store: VariableStore,
        keyboards: Arc<KeyboardCache>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            templates: TemplateEngine::new(store.clone()),
            store,
            keyboards,
            messenger,
        }
    }

    #[instrument(level = "debug", skip(self, effects, context), fields(event_id = %context.event_id, count = effects.len()))]
    pub async fn run(
        &self,
        effects: &[Effect],
        context: &EventContext,
        handler: &str,
    ) -> EffectSummary {
        let mut summary = EffectSummary::default();
        for effect in effects {
            match self.apply(effect, context, &mut summary).await {
                Ok(Applied::Done) => summary.executed += 1,
                Ok(Applied::Skipped) => summary.skipped += 1,
                Err(EffectError::NoEditableMessage) => {
                    summary.skipped += 1;
                    warn!(
                        handler,
                        effect = effect.kind(),
                        error.kind = EffectError::NoEditableMessage.kind(),
                        "edit skipped, event carries no message to edit"
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(handler, effect = effect.kind(), error.kind = e.kind(), error = %e, "effect failed");
                }
            }
        }
        summary
    }

    async fn apply(
        &self,
        effect: &Effect,
        context: &EventContext,
        summary: &mut EffectSummary,
    ) -> Result<Applied, EffectError> {
        match effect {
            Effect::Send(message) => {
                let outbound = self.render(message, context);
                summary.outbound += 1;
                self.messenger
                    .send_message(context.chat_id, outbound)
                    .await?;
            }
            Effect::Reply(message) => {
                let outbound = self.render(message, context);
                summary.outbound += 1;
                match context.message_id {
                    Some(reply_to) => {
                        self.messenger
                            .reply_message(context.chat_id, reply_to, outbound)
                            .await?
                    }
                    None => self.messenger.send_message(context.chat_id, outbound).await?,
                };
            }
            Effect::Edit(message) => {
                let target = context.editable.ok_or(EffectError::NoEditableMessage)?;
                let outbound = self.render(message, context);
                summary.outbound += 1;
                self.messenger.edit_message(target, outbound).await?;
            }
            Effect::AnswerCallback { text, alert } => {
                let Some(callback_id) = context.callback_id.as_deref() else {
                    debug!("answer_callback ignored for a non-button event");
                    return Ok(Applied::Skipped);
                };
                let text = text
                    .as_ref()
                    .map(|t| self.templates.substitute(t, context));
                summary.outbound += 1;
                self.messenger
                    .answer_callback(callback_id, text, *alert)
                    .await?;
            }
            Effect::Increment { variable, amount } => {
                let next = self.step(variable, amount, false)?;
                debug!(variable = %variable, value = %next, "incremented");
            }
            Effect::Decrement { variable, amount } => {
                let next = self.step(variable, amount, true)?;
                debug!(variable = %variable, value = %next, "decremented");
            }
            Effect::Set { variable, value } => {
                let value = parse_value(&self.templates.substitute(value, context));
                debug!(variable = %variable, value = %value, "set");
                self.store.set(variable, value);
            }
        }
        Ok(Applied::Done)
    }

    fn render(&self, message: &MessageEffect, context: &EventContext) -> OutboundMessage {
        OutboundMessage {
            text: self.templates.substitute(&message.text, context),
            markup: message
                .keyboard
                .as_deref()
                .and_then(|name| self.markup(name, context)),
            parse_mode: message.parse_mode.clone(),
        }
    }

    fn markup(&self, name: &str, context: &EventContext) -> Option<KeyboardMarkup> {
        let markup = self
            .keyboards
            .resolve(name, |label| self.templates.substitute(label, context));
        if markup.is_none() {
            debug!(keyboard = name, "keyboard not found, sending without markup");
        }
        markup.map(|m| m.into_owned())
    }

    /// Absent variables start at 0. The read-modify-write holds the key's
    /// lock, so concurrent steps on one variable are not lost.
    fn step(&self, variable: &str, amount: &Value, negate: bool) -> Result<Value, EffectError> {
        self.store.update(variable, |current| {
            let current = current.cloned().unwrap_or(Value::Integer(0));
            match (&current, amount) {
                (Value::Integer(a), Value::Integer(b)) => {
                    let result = if negate {
                        a.checked_sub(*b)
                    } else {
                        a.checked_add(*b)
                    };
                    result
                        .map(Value::Integer)
                        .ok_or_else(|| EffectError::Overflow(variable.to_string()))
                }
                _ => match (current.as_f64(), amount.as_f64()) {
                    (Some(a), Some(b)) => Ok(Value::Float(if negate { a - b } else { a + b })),
                    (None, _) => Err(EffectError::NotNumeric {
                        variable: variable.to_string(),
                        found: current.type_name(),
                    }),
                    (_, None) => Err(EffectError::NotNumeric {
                        variable: variable.to_string(),
                        found: amount.type_name(),
                    }),
                },
            }
        })
    }
}
