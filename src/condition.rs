//! # Condition Evaluator
//!
//! A condition is template text. After substitution it must be one
//! expression of the embedded language, evaluated with no bindings and no
//! functions:
//!
//! ```text
//! $count > 5 and $mode == 'on'   # after substitution: 6 > 5 and ...
//! ```
//!
//! Substituted strings are not quoted automatically, so string comparisons
//! need the quotes in the condition text itself (`'$name' == 'Ann'`).

use tracing::warn;

use crate::context::EventContext;
use crate::error::EvalError;
use crate::lang::{self, Interpreter, Limits};
use crate::template::TemplateEngine;

#[derive(Clone, Debug)]
pub struct ConditionEvaluator {
    templates: TemplateEngine,
    limits: Limits,
}

impl ConditionEvaluator {
    pub fn new(templates: TemplateEngine, limits: Limits) -> Self {
        Self { templates, limits }
    }

    /// An empty condition is true.
    pub fn evaluate(&self, expression: &str, context: &EventContext) -> Result<bool, EvalError> {
        if expression.trim().is_empty() {
            return Ok(true);
        }
        let substituted = self.templates.substitute(expression, context);
        let invalid = |source| EvalError::Invalid {
            expression: substituted.clone(),
            source,
        };
        let expr = lang::parse_expression(&substituted).map_err(invalid)?;
        let value = Interpreter::expressions_only(self.limits)
            .evaluate(&expr)
            .map_err(invalid)?;
        Ok(value.is_truthy())
    }

    /// Like [`ConditionEvaluator::evaluate`], with errors logged and read
    /// as `false`.
    pub fn check(&self, expression: &str, context: &EventContext, handler: &str) -> bool {
        match self.evaluate(expression, context) {
            Ok(result) => result,
            Err(e) => {
                warn!(handler, error.kind = e.kind(), error = %e, "condition failed, treating as false");
                false
            }
        }
    }
}
