//! # Embedded Script Runner
//!
//! Runs a handler's script body in an isolated scope and writes the results
//! back to the [`VariableStore`].
//!
//! The scope is built from, in increasing priority: context fields, the
//! scratch scope, declared variables. After a successful run only names whose
//! value changed are written back:
//!
//! * declared variables are updated in the store
//! * other names go to the scratch scope, except `_`-prefixed names and
//!   context fields, which are discarded
//!
//! A failing script commits nothing.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, instrument};

use crate::context::{CONTEXT_FIELDS, EventContext};
use crate::error::ScriptError;
use crate::lang::{self, Interpreter, Limits};
use crate::store::VariableStore;
use crate::value::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptOutcome {
    pub variable_deltas: BTreeMap<String, Value>,
    pub scratch_deltas: BTreeMap<String, Value>,
    pub steps: usize,
}

impl ScriptOutcome {
    pub fn is_empty(&self) -> bool {
        self.variable_deltas.is_empty() && self.scratch_deltas.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct ScriptRunner {
    store: VariableStore,
    limits: Limits,
}

impl ScriptRunner {
    pub fn new(store: VariableStore, limits: Limits) -> Self {
        Self { store, limits }
    }

    /// Executes and commits.
    #[instrument(level = "debug", skip(self, source, context), fields(event_id = %context.event_id))]
    pub fn run(&self, source: &str, context: &EventContext) -> Result<ScriptOutcome, ScriptError> {
        let outcome = self.execute(source, context)?;
        self.commit(&outcome);
        debug!(
            variables = outcome.variable_deltas.len(),
            scratch = outcome.scratch_deltas.len(),
            steps = outcome.steps,
            "script committed"
        );
        Ok(outcome)
    }

    /// Executes without touching the store.
    pub fn execute(
        &self,
        source: &str,
        context: &EventContext,
    ) -> Result<ScriptOutcome, ScriptError> {
        let program = lang::parse_program(source)?;

        let initial = self.scope(context);
        let mut interpreter = Interpreter::new(initial.clone(), self.limits);
        interpreter.execute(&program)?;
        let steps = interpreter.steps();

        let mut outcome = ScriptOutcome {
            steps,
            ..Default::default()
        };
        for (name, value) in interpreter.into_scope() {
            if initial.get(&name) == Some(&value) {
                continue;
            }
            if self.store.contains(&name) {
                outcome.variable_deltas.insert(name, value);
            } else if !name.starts_with('_') && !CONTEXT_FIELDS.contains(&name.as_str()) {
                outcome.scratch_deltas.insert(name, value);
            }
        }
        Ok(outcome)
    }

    pub fn commit(&self, outcome: &ScriptOutcome) {
        for (name, value) in &outcome.variable_deltas {
            self.store.set(name, value.clone());
        }
        for (name, value) in &outcome.scratch_deltas {
            self.store.set_scratch(name, value.clone());
        }
    }

    fn scope(&self, context: &EventContext) -> HashMap<String, Value> {
        let mut scope: HashMap<String, Value> = CONTEXT_FIELDS
            .iter()
            .filter_map(|name| context.field(name).map(|v| (name.to_string(), v)))
            .collect();
        scope.extend(self.store.scratch_snapshot());
        scope.extend(self.store.snapshot());
        scope
    }
}
