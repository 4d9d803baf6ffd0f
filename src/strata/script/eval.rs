//! Expression evaluation over serde_json values

use serde_json::{Map, Number, Value};

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::ScriptError;

/// Upper bound on the length of a list built by `range`.
const MAX_RANGE: i64 = 1_000_000;

/// Where an expression finds its variables and how it escapes text.
pub trait Scope {
    /// Resolve a variable. Unknown names either resolve to nil or fail with
    /// [ScriptError::Missing], depending on the scope's policy.
    fn lookup(&self, name: &str) -> Result<Value, ScriptError>;

    fn escape(&self, text: &str) -> String;
}

/// nil, false, zero, and empty strings and collections are false. Everything else is true.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// The text a value renders as. nil renders as nothing, collections as compact JSON.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

fn fail<T>(message: impl Into<String>) -> Result<T, ScriptError> {
    Err(ScriptError::Eval(message.into()))
}

fn float(value: f64) -> Result<Value, ScriptError> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| ScriptError::Eval("arithmetic produced a non-finite number".to_string()))
}

pub fn evaluate(expr: &Expr, scope: &dyn Scope) -> Result<Value, ScriptError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Variable(name) => scope.lookup(name),
        Expr::List(items) => items
            .iter()
            .map(|item| evaluate(item, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::Map(entries) => {
            let mut map = Map::new();
            for (key, value) in entries {
                map.insert(key.clone(), evaluate(value, scope)?);
            }
            Ok(Value::Object(map))
        }
        Expr::Member(base, name) => member(evaluate(base, scope)?, name),
        Expr::Index(base, index) => {
            let base = evaluate(base, scope)?;
            let index = evaluate(index, scope)?;
            index_value(base, &index)
        }
        Expr::Unary(UnaryOp::Not, operand) => {
            Ok(Value::Bool(!is_truthy(&evaluate(operand, scope)?)))
        }
        Expr::Unary(UnaryOp::Neg, operand) => negate(evaluate(operand, scope)?),
        Expr::Binary(BinaryOp::And, left, right) => {
            let left = evaluate(left, scope)?;
            if is_truthy(&left) {
                evaluate(right, scope)
            } else {
                Ok(left)
            }
        }
        Expr::Binary(BinaryOp::Or, left, right) => {
            let left = evaluate(left, scope)?;
            if is_truthy(&left) {
                Ok(left)
            } else {
                evaluate(right, scope)
            }
        }
        Expr::Binary(op, left, right) => {
            let left = evaluate(left, scope)?;
            let right = evaluate(right, scope)?;
            binary(*op, left, right)
        }
        Expr::Call(name, args) => {
            let args = args
                .iter()
                .map(|arg| evaluate(arg, scope))
                .collect::<Result<Vec<_>, _>>()?;
            call(name, args, scope)
        }
    }
}

fn member(base: Value, name: &str) -> Result<Value, ScriptError> {
    match base {
        Value::Object(mut map) => Ok(map.remove(name).unwrap_or(Value::Null)),
        Value::Null => Ok(Value::Null),
        other => fail(format!(
            "cannot read '{}' from a {}",
            name,
            type_name(&other)
        )),
    }
}

fn index_value(base: Value, index: &Value) -> Result<Value, ScriptError> {
    match (base, index) {
        (Value::Array(mut items), Value::Number(n)) => {
            let Some(i) = n.as_i64() else {
                return fail("list index must be an integer");
            };
            let len = items.len() as i64;
            let i = if i < 0 { len + i } else { i };
            if (0..len).contains(&i) {
                Ok(items.swap_remove(i as usize))
            } else {
                Ok(Value::Null)
            }
        }
        (Value::Object(mut map), Value::String(key)) => Ok(map.remove(key).unwrap_or(Value::Null)),
        (Value::Null, _) => Ok(Value::Null),
        (base, index) => fail(format!(
            "cannot index a {} with a {}",
            type_name(&base),
            type_name(index)
        )),
    }
}

fn negate(value: Value) -> Result<Value, ScriptError> {
    match &value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => i
                .checked_neg()
                .map(Value::from)
                .ok_or_else(|| ScriptError::Eval("integer overflow".to_string())),
            None => float(-n.as_f64().unwrap_or(0.0)),
        },
        other => fail(format!("cannot negate a {}", type_name(other))),
    }
}

fn numbers_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        _ => left == right,
    }
}

fn arithmetic(op: BinaryOp, a: &Number, b: &Number) -> Result<Value, ScriptError> {
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div | BinaryOp::Rem if b == 0 => return fail("division by zero"),
            BinaryOp::Div => a.checked_div(b),
            BinaryOp::Rem => a.checked_rem(b),
            _ => return fail("not an arithmetic operator"),
        };
        return result
            .map(Value::from)
            .ok_or_else(|| ScriptError::Eval("integer overflow".to_string()));
    }
    let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
    match op {
        BinaryOp::Add => float(a + b),
        BinaryOp::Sub => float(a - b),
        BinaryOp::Mul => float(a * b),
        BinaryOp::Div | BinaryOp::Rem if b == 0.0 => fail("division by zero"),
        BinaryOp::Div => float(a / b),
        BinaryOp::Rem => float(a % b),
        _ => fail("not an arithmetic operator"),
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, ScriptError> {
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(numbers_equal(&left, &right))),
        BinaryOp::Ne => return Ok(Value::Bool(!numbers_equal(&left, &right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => a.as_f64().partial_cmp(&b.as_f64()),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            };
            let Some(ordering) = ordering else {
                return fail(format!(
                    "cannot compare a {} with a {}",
                    type_name(&left),
                    type_name(&right)
                ));
            };
            let result = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            return Ok(Value::Bool(result));
        }
        _ => {}
    }

    match (op, left, right) {
        (op, Value::Number(a), Value::Number(b)) => arithmetic(op, &a, &b),
        (BinaryOp::Add, Value::String(a), b) => Ok(Value::String(a + &render_value(&b))),
        (BinaryOp::Add, a @ (Value::Number(_) | Value::Bool(_)), Value::String(b)) => {
            Ok(Value::String(render_value(&a) + &b))
        }
        (BinaryOp::Add, Value::Array(mut a), Value::Array(b)) => {
            a.extend(b);
            Ok(Value::Array(a))
        }
        (BinaryOp::Mul, Value::String(s), Value::Number(n))
        | (BinaryOp::Mul, Value::Number(n), Value::String(s)) => match n.as_u64() {
            Some(times) if times <= MAX_RANGE as u64 => Ok(Value::String(s.repeat(times as usize))),
            _ => fail("string repetition needs a small non-negative integer"),
        },
        (op, left, right) => fail(format!(
            "unsupported operands for {:?}: {} and {}",
            op,
            type_name(&left),
            type_name(&right)
        )),
    }
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), ScriptError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{} to {}", min, max)
        };
        return fail(format!(
            "{}() takes {} argument(s), got {}",
            name,
            expected,
            args.len()
        ));
    }
    Ok(())
}

fn integer(name: &str, value: &Value) -> Result<i64, ScriptError> {
    value
        .as_i64()
        .ok_or_else(|| ScriptError::Eval(format!("{}() needs integers", name)))
}

fn call(name: &str, mut args: Vec<Value>, scope: &dyn Scope) -> Result<Value, ScriptError> {
    match name {
        "len" => {
            arity(name, &args, 1, 1)?;
            let len = match &args[0] {
                Value::Null => 0,
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                other => return fail(format!("len() of a {}", type_name(other))),
            };
            Ok(Value::from(len))
        }
        "range" => {
            arity(name, &args, 1, 2)?;
            let (start, end) = if args.len() == 1 {
                (0, integer(name, &args[0])?)
            } else {
                (integer(name, &args[0])?, integer(name, &args[1])?)
            };
            if end.saturating_sub(start) > MAX_RANGE {
                return fail("range() is too large");
            }
            Ok(Value::Array((start..end).map(Value::from).collect()))
        }
        "upper" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::String(render_value(&args[0]).to_uppercase()))
        }
        "lower" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::String(render_value(&args[0]).to_lowercase()))
        }
        "escape" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::String(scope.escape(&render_value(&args[0]))))
        }
        "str" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::String(render_value(&args[0])))
        }
        "join" => {
            arity(name, &args, 1, 2)?;
            let separator = args.get(1).map(render_value).unwrap_or_default();
            match &args[0] {
                Value::Array(items) => Ok(Value::String(
                    items
                        .iter()
                        .map(render_value)
                        .collect::<Vec<_>>()
                        .join(&separator),
                )),
                other => fail(format!("join() of a {}", type_name(other))),
            }
        }
        "default" => {
            arity(name, &args, 2, 2)?;
            let fallback = args.pop().unwrap_or(Value::Null);
            let value = args.pop().unwrap_or(Value::Null);
            Ok(if value.is_null() { fallback } else { value })
        }
        _ => fail(format!("unknown function '{}'", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strata::script::parse_expression;
    use serde_json::json;

    struct Vars(Value, bool);

    impl Scope for Vars {
        fn lookup(&self, name: &str) -> Result<Value, ScriptError> {
            match self.0.get(name) {
                Some(value) => Ok(value.clone()),
                None if self.1 => Err(ScriptError::Missing(name.to_string())),
                None => Ok(Value::Null),
            }
        }

        fn escape(&self, text: &str) -> String {
            text.replace('<', "&lt;")
        }
    }

    fn eval(code: &str) -> Result<Value, ScriptError> {
        let vars = Vars(
            json!({
                "name": "Ada",
                "items": [1, 2, 3],
                "user": {"tags": ["a", "b"], "age": 36},
                "empty": "",
            }),
            false,
        );
        evaluate(&parse_expression(code).unwrap(), &vars)
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), json!(7));
        assert_eq!(eval("7 / 2").unwrap(), json!(3));
        assert_eq!(eval("7 % 4").unwrap(), json!(3));
        assert_eq!(eval("1.5 + 1").unwrap(), json!(2.5));
        assert_eq!(eval("-user.age").unwrap(), json!(-36));
        assert!(matches!(eval("1 / 0"), Err(ScriptError::Eval(_))));
    }

    #[test]
    fn test_strings_and_lists() {
        assert_eq!(eval(r#""Hi " + name"#).unwrap(), json!("Hi Ada"));
        assert_eq!(eval(r#""n" + 1"#).unwrap(), json!("n1"));
        assert_eq!(eval(r#""ab" * 2"#).unwrap(), json!("abab"));
        assert_eq!(eval("items + [4]").unwrap(), json!([1, 2, 3, 4]));
    }

    #[test]
    fn test_access() {
        assert_eq!(eval("user.tags[1]").unwrap(), json!("b"));
        assert_eq!(eval("items[-1]").unwrap(), json!(3));
        assert_eq!(eval("items[9]").unwrap(), Value::Null);
        assert_eq!(eval("user.missing.deeper").unwrap(), Value::Null);
        assert!(matches!(eval("name.first"), Err(ScriptError::Eval(_))));
    }

    #[test]
    fn test_logic_returns_operands() {
        assert_eq!(eval(r#"empty or "fallback""#).unwrap(), json!("fallback"));
        assert_eq!(eval("name and 1").unwrap(), json!(1));
        assert_eq!(eval("not empty").unwrap(), json!(true));
        assert_eq!(eval("1 == 1.0").unwrap(), json!(true));
        assert_eq!(eval(r#""a" < "b""#).unwrap(), json!(true));
        assert!(matches!(eval(r#"1 < "b""#), Err(ScriptError::Eval(_))));
    }

    #[test]
    fn test_builtins() {
        assert_eq!(eval("len(items)").unwrap(), json!(3));
        assert_eq!(eval("len(name)").unwrap(), json!(3));
        assert_eq!(eval("range(3)").unwrap(), json!([0, 1, 2]));
        assert_eq!(eval("range(2, 4)").unwrap(), json!([2, 3]));
        assert_eq!(eval("upper(name)").unwrap(), json!("ADA"));
        assert_eq!(eval(r#"join(items, "-")"#).unwrap(), json!("1-2-3"));
        assert_eq!(eval(r#"escape("<b>")"#).unwrap(), json!("&lt;b>"));
        assert_eq!(eval(r#"default(nothing, "x")"#).unwrap(), json!("x"));
        assert_eq!(eval("str(items)").unwrap(), json!("[1,2,3]"));
        assert!(matches!(eval("len()"), Err(ScriptError::Eval(_))));
        assert!(matches!(eval("nope(1)"), Err(ScriptError::Eval(_))));
    }

    #[test]
    fn test_strict_scope_reports_missing() {
        let vars = Vars(json!({}), true);
        let expr = parse_expression("ghost").unwrap();
        assert_eq!(
            evaluate(&expr, &vars),
            Err(ScriptError::Missing("ghost".to_string()))
        );
    }

    #[test]
    fn test_truthiness_and_rendering() {
        for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!([]), json!({})] {
            assert!(!is_truthy(&falsy), "{} should be false", falsy);
        }
        assert!(is_truthy(&json!("0")));
        assert_eq!(render_value(&json!(null)), "");
        assert_eq!(render_value(&json!({"a": [1]})), r#"{"a":[1]}"#);
        assert_eq!(render_value(&json!(2.5)), "2.5");
    }
}
