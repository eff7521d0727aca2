use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::trace;

use super::builtins;
use super::parser::{BinaryOp, Expr, Program, Stmt, UnaryOp};
use super::{LangError, LangResult};
use crate::config::ScriptConfig;
use crate::value::Value;

/// How often the wall clock is consulted, in steps.
const DEADLINE_CHECK_INTERVAL: usize = 32;

/// Execution budget for one interpreter run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub max_steps: usize,
    pub timeout: Duration,
    pub max_string_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self::from(&ScriptConfig::default())
    }
}

impl From<&ScriptConfig> for Limits {
    fn from(config: &ScriptConfig) -> Self {
        Self {
            max_steps: config.max_steps,
            timeout: config.timeout,
            max_string_len: config.max_string_len,
        }
    }
}

/// Tree-walking evaluator over a single flat scope.
///
/// An interpreter built with [`Interpreter::expressions_only`] rejects every
/// function call, which is how conditions are evaluated.
pub struct Interpreter {
    scope: HashMap<String, Value>,
    limits: Limits,
    functions_enabled: bool,
    steps: usize,
    started: Instant,
}

impl Interpreter {
    pub fn new(scope: HashMap<String, Value>, limits: Limits) -> Self {
        Self {
            scope,
            limits,
            functions_enabled: true,
            steps: 0,
            started: Instant::now(),
        }
    }

    pub fn expressions_only(limits: Limits) -> Self {
        Self {
            functions_enabled: false,
            ..Self::new(HashMap::new(), limits)
        }
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn scope(&self) -> &HashMap<String, Value> {
        &self.scope
    }

    pub fn into_scope(self) -> HashMap<String, Value> {
        self.scope
    }

    pub fn execute(&mut self, program: &Program) -> LangResult<()> {
        self.execute_block(&program.statements)?;
        trace!(steps = self.steps, "program finished");
        Ok(())
    }

    fn execute_block(&mut self, statements: &[Stmt]) -> LangResult<()> {
        for statement in statements {
            self.execute_statement(statement)?;
        }
        Ok(())
    }

    fn execute_statement(&mut self, statement: &Stmt) -> LangResult<()> {
        self.tick()?;
        match statement {
            Stmt::Assign { target, op, value } => {
                let rhs = self.evaluate(value)?;
                let next = match op {
                    None => rhs,
                    Some(op) => {
                        let current = self
                            .scope
                            .get(target)
                            .cloned()
                            .ok_or_else(|| LangError::UnknownName(target.clone()))?;
                        self.apply_binary(*op, current, rhs)?
                    }
                };
                self.scope.insert(target.clone(), next);
            }
            Stmt::If {
                branches,
                otherwise,
            } => {
                let mut taken = false;
                for (condition, body) in branches {
                    if self.evaluate(condition)?.is_truthy() {
                        self.execute_block(body)?;
                        taken = true;
                        break;
                    }
                }
                if !taken {
                    if let Some(body) = otherwise {
                        self.execute_block(body)?;
                    }
                }
            }
            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    self.execute_block(body)?;
                }
            }
            Stmt::Expr(expr) => {
                self.evaluate(expr)?;
            }
        }
        Ok(())
    }

    pub fn evaluate(&mut self, expr: &Expr) -> LangResult<Value> {
        self.tick()?;
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Name(name) => self
                .scope
                .get(name)
                .cloned()
                .ok_or_else(|| LangError::UnknownName(name.clone())),
            Expr::Unary { op, expr } => {
                let value = self.evaluate(expr)?;
                match op {
                    UnaryOp::Not => Ok(Value::Boolean(!value.is_truthy())),
                    UnaryOp::Negate => match value {
                        Value::Integer(i) => i
                            .checked_neg()
                            .map(Value::Integer)
                            .ok_or(LangError::Overflow),
                        Value::Float(f) => Ok(Value::Float(-f)),
                        other => Err(LangError::Type(format!(
                            "bad operand type for unary -: '{}'",
                            other.type_name()
                        ))),
                    },
                }
            }
            Expr::Binary { op, left, right } => match op {
                BinaryOp::And => {
                    let lhs = self.evaluate(left)?;
                    if !lhs.is_truthy() {
                        return Ok(Value::Boolean(false));
                    }
                    Ok(Value::Boolean(self.evaluate(right)?.is_truthy()))
                }
                BinaryOp::Or => {
                    let lhs = self.evaluate(left)?;
                    if lhs.is_truthy() {
                        return Ok(Value::Boolean(true));
                    }
                    Ok(Value::Boolean(self.evaluate(right)?.is_truthy()))
                }
                _ => {
                    let lhs = self.evaluate(left)?;
                    let rhs = self.evaluate(right)?;
                    self.apply_binary(*op, lhs, rhs)
                }
            },
            Expr::Call { function, args } => {
                if !self.functions_enabled {
                    return Err(LangError::UnknownFunction(function.clone()));
                }
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate(arg)?);
                }
                let result = builtins::call(function, values)?;
                self.check_string(result)
            }
        }
    }

    fn apply_binary(&self, op: BinaryOp, lhs: Value, rhs: Value) -> LangResult<Value> {
        let result = match op {
            BinaryOp::Add => match (lhs, rhs) {
                (Value::String(a), Value::String(b)) => {
                    if a.len() + b.len() > self.limits.max_string_len {
                        return Err(LangError::StringTooLong(self.limits.max_string_len));
                    }
                    Value::String(a + &b)
                }
                (lhs, rhs) => arithmetic(op, &lhs, &rhs)?,
            },
            BinaryOp::Multiply => match (&lhs, &rhs) {
                (Value::String(s), Value::Integer(n)) | (Value::Integer(n), Value::String(s)) => {
                    let count = usize::try_from(*n).unwrap_or(0);
                    if s.len().saturating_mul(count) > self.limits.max_string_len {
                        return Err(LangError::StringTooLong(self.limits.max_string_len));
                    }
                    Value::String(s.repeat(count))
                }
                _ => arithmetic(op, &lhs, &rhs)?,
            },
            BinaryOp::Subtract | BinaryOp::Divide | BinaryOp::FloorDivide | BinaryOp::Modulo => {
                arithmetic(op, &lhs, &rhs)?
            }
            BinaryOp::Equal => Value::Boolean(values_equal(&lhs, &rhs)),
            BinaryOp::NotEqual => Value::Boolean(!values_equal(&lhs, &rhs)),
            BinaryOp::LessThan => Value::Boolean(compare_values(op, &lhs, &rhs)?.is_lt()),
            BinaryOp::LessThanEqual => Value::Boolean(compare_values(op, &lhs, &rhs)?.is_le()),
            BinaryOp::GreaterThan => Value::Boolean(compare_values(op, &lhs, &rhs)?.is_gt()),
            BinaryOp::GreaterThanEqual => {
                Value::Boolean(compare_values(op, &lhs, &rhs)?.is_ge())
            }
            BinaryOp::And => Value::Boolean(lhs.is_truthy() && rhs.is_truthy()),
            BinaryOp::Or => Value::Boolean(lhs.is_truthy() || rhs.is_truthy()),
        };
        Ok(result)
    }

    fn check_string(&self, value: Value) -> LangResult<Value> {
        match &value {
            Value::String(s) if s.len() > self.limits.max_string_len => {
                Err(LangError::StringTooLong(self.limits.max_string_len))
            }
            _ => Ok(value),
        }
    }

    fn tick(&mut self) -> LangResult<()> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(LangError::StepLimit(self.limits.max_steps));
        }
        if self.steps % DEADLINE_CHECK_INTERVAL == 0 && self.started.elapsed() > self.limits.timeout
        {
            return Err(LangError::Timeout(self.limits.timeout));
        }
        Ok(())
    }
}

fn type_error(op: BinaryOp, lhs: &Value, rhs: &Value) -> LangError {
    LangError::Type(format!(
        "unsupported operand types for {}: '{}' and '{}'",
        op,
        lhs.type_name(),
        rhs.type_name()
    ))
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> LangResult<Value> {
    match (lhs, rhs) {
        (Value::Integer(a), Value::Integer(b)) => integer_arithmetic(op, *a, *b),
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => float_arithmetic(op, a, b),
            _ => Err(type_error(op, lhs, rhs)),
        },
    }
}

fn integer_arithmetic(op: BinaryOp, a: i64, b: i64) -> LangResult<Value> {
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Subtract => a.checked_sub(b),
        BinaryOp::Multiply => a.checked_mul(b),
        BinaryOp::Divide => return float_arithmetic(op, a as f64, b as f64),
        BinaryOp::FloorDivide => {
            if b == 0 {
                return Err(LangError::DivisionByZero);
            }
            a.checked_div(b).map(|q| {
                if (a % b != 0) && ((a < 0) != (b < 0)) {
                    q - 1
                } else {
                    q
                }
            })
        }
        BinaryOp::Modulo => {
            if b == 0 {
                return Err(LangError::DivisionByZero);
            }
            a.checked_rem(b)
                .map(|r| if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
        }
        _ => None,
    };
    result.map(Value::Integer).ok_or(LangError::Overflow)
}

fn float_arithmetic(op: BinaryOp, a: f64, b: f64) -> LangResult<Value> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide | BinaryOp::FloorDivide | BinaryOp::Modulo if b == 0.0 => {
            return Err(LangError::DivisionByZero);
        }
        BinaryOp::Divide => a / b,
        BinaryOp::FloorDivide => (a / b).floor(),
        BinaryOp::Modulo => {
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                r + b
            } else {
                r
            }
        }
        _ => {
            return Err(type_error(op, &Value::Float(a), &Value::Float(b)));
        }
    };
    Ok(Value::Float(result))
}

/// Numeric values compare across int and float. Any other type mismatch,
/// including bool against int, is unequal.
pub fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Integer(a), Value::Integer(b)) => a == b,
        (Value::Integer(_), Value::Float(_)) | (Value::Float(_), Value::Integer(_)) => {
            lhs.as_f64() == rhs.as_f64()
        }
        _ => lhs == rhs,
    }
}

/// Ordering for numbers and for strings. Mixed types are a type error.
pub fn compare_values(op: BinaryOp, lhs: &Value, rhs: &Value) -> LangResult<Ordering> {
    match (lhs, rhs) {
        (Value::Integer(a), Value::Integer(b)) => Ok(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).ok_or_else(|| type_error(op, lhs, rhs)),
            _ => Err(LangError::Type(format!(
                "'{}' not supported between '{}' and '{}'",
                op,
                lhs.type_name(),
                rhs.type_name()
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::{parse_expression, parse_program};
    use pretty_assertions::assert_eq;

    fn eval(source: &str) -> LangResult<Value> {
        let expr = parse_expression(source)?;
        Interpreter::new(HashMap::new(), Limits::default()).evaluate(&expr)
    }

    fn run(source: &str, scope: HashMap<String, Value>) -> LangResult<HashMap<String, Value>> {
        let program = parse_program(source)?;
        let mut interpreter = Interpreter::new(scope, Limits::default());
        interpreter.execute(&program)?;
        Ok(interpreter.into_scope())
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), Value::Integer(7));
        assert_eq!(eval("7 / 2").unwrap(), Value::Float(3.5));
        assert_eq!(eval("7 // 2").unwrap(), Value::Integer(3));
        assert_eq!(eval("-7 // 2").unwrap(), Value::Integer(-4));
        assert_eq!(eval("-7 % 3").unwrap(), Value::Integer(2));
        assert_eq!(eval("1 + 0.5").unwrap(), Value::Float(1.5));
        assert_eq!(eval("'ab' + 'cd'").unwrap(), Value::String("abcd".to_string()));
        assert_eq!(eval("'ab' * 2").unwrap(), Value::String("abab".to_string()));
    }

    #[test]
    fn test_arithmetic_errors() {
        assert_eq!(eval("1 / 0"), Err(LangError::DivisionByZero));
        assert_eq!(eval("1 % 0"), Err(LangError::DivisionByZero));
        assert_eq!(eval("9223372036854775807 + 1"), Err(LangError::Overflow));
        assert!(matches!(eval("'a' - 1"), Err(LangError::Type(_))));
        assert!(matches!(eval("'a' < 1"), Err(LangError::Type(_))));
    }

    #[test]
    fn test_comparison_and_logic() {
        assert_eq!(eval("1 == 1.0").unwrap(), Value::Boolean(true));
        assert_eq!(eval("true == 1").unwrap(), Value::Boolean(false));
        assert_eq!(eval("'a' != 1").unwrap(), Value::Boolean(true));
        assert_eq!(eval("'abc' < 'abd'").unwrap(), Value::Boolean(true));
        assert_eq!(eval("5 > 3 and 2 >= 2").unwrap(), Value::Boolean(true));
        assert_eq!(eval("not 0 || false").unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_short_circuit_skips_errors() {
        assert_eq!(eval("false and missing").unwrap(), Value::Boolean(false));
        assert_eq!(eval("true or 1 / 0").unwrap(), Value::Boolean(true));
        assert!(matches!(eval("missing"), Err(LangError::UnknownName(_))));
    }

    #[test]
    fn test_statements_update_scope() {
        let mut scope = HashMap::new();
        scope.insert("count".to_string(), Value::Integer(2));
        let scope = run(
            "count += 3\nif count > 4 { big = true } else { big = false }\ni = 0\nwhile i < 3 { i += 1 }",
            scope,
        )
        .unwrap();
        assert_eq!(scope.get("count"), Some(&Value::Integer(5)));
        assert_eq!(scope.get("big"), Some(&Value::Boolean(true)));
        assert_eq!(scope.get("i"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_compound_assign_requires_existing_name() {
        assert_eq!(
            run("missing += 1", HashMap::new()),
            Err(LangError::UnknownName("missing".to_string()))
        );
    }

    #[test]
    fn test_step_limit_stops_infinite_loop() {
        let program = parse_program("while true { }").unwrap();
        let limits = Limits {
            max_steps: 1_000,
            ..Limits::default()
        };
        let mut interpreter = Interpreter::new(HashMap::new(), limits);
        assert_eq!(
            interpreter.execute(&program),
            Err(LangError::StepLimit(1_000))
        );
    }

    #[test]
    fn test_timeout_stops_long_loop() {
        let program = parse_program("while true { x = 1 }").unwrap();
        let limits = Limits {
            max_steps: usize::MAX,
            timeout: Duration::from_millis(20),
            ..Limits::default()
        };
        let mut interpreter = Interpreter::new(HashMap::new(), limits);
        assert_eq!(
            interpreter.execute(&program),
            Err(LangError::Timeout(Duration::from_millis(20)))
        );
    }

    #[test]
    fn test_string_limit() {
        let limits = Limits {
            max_string_len: 8,
            ..Limits::default()
        };
        let program = parse_program("s = 'abcd'\ns = s + s\ns = s + s").unwrap();
        let mut interpreter = Interpreter::new(HashMap::new(), limits);
        assert_eq!(interpreter.execute(&program), Err(LangError::StringTooLong(8)));
    }

    #[test]
    fn test_expressions_only_rejects_calls() {
        let expr = parse_expression("len('abc') == 3").unwrap();
        let mut interpreter = Interpreter::expressions_only(Limits::default());
        assert_eq!(
            interpreter.evaluate(&expr),
            Err(LangError::UnknownFunction("len".to_string()))
        );
    }
}
