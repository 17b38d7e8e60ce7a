use super::parser::{parse, BinaryOp, Expr, UnaryOp};
use super::{CompiledExpression, ExpressionBackend};
use crate::error::{StreamError, StreamResult};
use crate::value::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Built-in numeric expression evaluator.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeBackend;

impl ExpressionBackend for NativeBackend {
    fn compile(
        &self,
        text: &str,
        variables: &[String],
    ) -> StreamResult<Box<dyn CompiledExpression>> {
        let parsed = parse(text)?;
        let slots: HashMap<String, usize> = variables
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();
        let root = lower(&parsed, &slots)?;
        Ok(Box::new(NativeExpression {
            root,
            slots,
            values: vec![Value::Blank; variables.len()],
        }))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Function {
    Abs,
    Sqrt,
    Exp,
    Ln,
    Log10,
    Floor,
    Ceil,
    Round,
    Min,
    Max,
    Pow,
    If,
    IsNan,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        let f = match name.to_ascii_uppercase().as_str() {
            "ABS" => Function::Abs,
            "SQRT" => Function::Sqrt,
            "EXP" => Function::Exp,
            "LN" => Function::Ln,
            "LOG10" => Function::Log10,
            "FLOOR" => Function::Floor,
            "CEIL" | "CEILING" => Function::Ceil,
            "ROUND" => Function::Round,
            "MIN" => Function::Min,
            "MAX" => Function::Max,
            "POW" | "POWER" => Function::Pow,
            "IF" => Function::If,
            "ISNAN" => Function::IsNan,
            _ => return None,
        };
        Some(f)
    }

    fn accepts(self, argc: usize) -> bool {
        match self {
            Function::Abs
            | Function::Sqrt
            | Function::Exp
            | Function::Ln
            | Function::Log10
            | Function::Floor
            | Function::Ceil
            | Function::IsNan => argc == 1,
            Function::Round => argc == 1 || argc == 2,
            Function::Pow => argc == 2,
            Function::If => argc == 3,
            Function::Min | Function::Max => argc >= 1,
        }
    }
}

#[derive(Clone, Debug)]
enum Node {
    Literal(Value),
    Variable(usize),
    Call(Function, Vec<Node>),
    Unary(UnaryOp, Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
}

fn lower(expr: &Expr, slots: &HashMap<String, usize>) -> StreamResult<Node> {
    Ok(match expr {
        Expr::Number(n) => Node::Literal(Value::Number(*n)),
        Expr::Text(s) => Node::Literal(Value::Text(s.clone())),
        Expr::Boolean(b) => Node::Literal(Value::Boolean(*b)),
        Expr::Identifier(name) => {
            let slot = slots
                .get(name)
                .ok_or_else(|| StreamError::Build(format!("unknown variable {name}")))?;
            Node::Variable(*slot)
        }
        Expr::Call { name, args } => {
            let function = Function::lookup(name)
                .ok_or_else(|| StreamError::Build(format!("unknown function {name}")))?;
            if !function.accepts(args.len()) {
                return Err(StreamError::Build(format!(
                    "function {name} does not accept {} argument(s)",
                    args.len()
                )));
            }
            let args = args
                .iter()
                .map(|arg| lower(arg, slots))
                .collect::<StreamResult<Vec<_>>>()?;
            Node::Call(function, args)
        }
        Expr::UnaryOp { op, expr } => Node::Unary(*op, Box::new(lower(expr, slots)?)),
        Expr::BinaryOp { op, left, right } => Node::Binary(
            *op,
            Box::new(lower(left, slots)?),
            Box::new(lower(right, slots)?),
        ),
    })
}

#[derive(Debug)]
struct NativeExpression {
    root: Node,
    slots: HashMap<String, usize>,
    values: Vec<Value>,
}

impl CompiledExpression for NativeExpression {
    fn set_variable(&mut self, name: &str, value: Value) {
        if let Some(&slot) = self.slots.get(name) {
            self.values[slot] = value;
        }
    }

    fn evaluate(&self) -> StreamResult<Value> {
        self.eval(&self.root)
    }
}

impl NativeExpression {
    fn eval(&self, node: &Node) -> StreamResult<Value> {
        match node {
            Node::Literal(value) => Ok(value.clone()),
            Node::Variable(slot) => Ok(self.values[*slot].clone()),
            Node::Unary(UnaryOp::Negate, inner) => {
                Ok(Value::Number(-self.eval(inner)?.to_number()?))
            }
            Node::Unary(UnaryOp::Not, inner) => Ok(Value::Boolean(!self.eval(inner)?.truthy()?)),
            Node::Binary(BinaryOp::And, left, right) => {
                if !self.eval(left)?.truthy()? {
                    return Ok(Value::Boolean(false));
                }
                Ok(Value::Boolean(self.eval(right)?.truthy()?))
            }
            Node::Binary(BinaryOp::Or, left, right) => {
                if self.eval(left)?.truthy()? {
                    return Ok(Value::Boolean(true));
                }
                Ok(Value::Boolean(self.eval(right)?.truthy()?))
            }
            Node::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                eval_binary(*op, &left, &right)
            }
            Node::Call(Function::If, args) => {
                if self.eval(&args[0])?.truthy()? {
                    self.eval(&args[1])
                } else {
                    self.eval(&args[2])
                }
            }
            Node::Call(function, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<StreamResult<Vec<_>>>()?;
                eval_call(*function, &args)
            }
        }
    }
}

fn eval_binary(op: BinaryOp, left: &Value, right: &Value) -> StreamResult<Value> {
    match op {
        BinaryOp::Add
        | BinaryOp::Subtract
        | BinaryOp::Multiply
        | BinaryOp::Divide
        | BinaryOp::Modulo
        | BinaryOp::Power => {
            let l = left.to_number()?;
            let r = right.to_number()?;
            let out = match op {
                BinaryOp::Add => l + r,
                BinaryOp::Subtract => l - r,
                BinaryOp::Multiply => l * r,
                BinaryOp::Divide => l / r,
                BinaryOp::Modulo => l % r,
                _ => l.powf(r),
            };
            Ok(Value::Number(out))
        }
        BinaryOp::Concat => Ok(Value::Text(format!("{}{}", as_text(left), as_text(right)))),
        BinaryOp::Equals => Ok(Value::Boolean(compare(left, right)? == Some(Ordering::Equal))),
        BinaryOp::NotEquals => Ok(Value::Boolean(compare(left, right)? != Some(Ordering::Equal))),
        BinaryOp::Less
        | BinaryOp::LessEquals
        | BinaryOp::Greater
        | BinaryOp::GreaterEquals => {
            let ordering = compare(left, right)?;
            let Some(ordering) = ordering else {
                return Ok(Value::Boolean(false));
            };
            let out = match op {
                BinaryOp::Less => ordering == Ordering::Less,
                BinaryOp::LessEquals => ordering != Ordering::Greater,
                BinaryOp::Greater => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Value::Boolean(out))
        }
        BinaryOp::And | BinaryOp::Or => {
            let l = left.truthy()?;
            let r = right.truthy()?;
            Ok(Value::Boolean(if op == BinaryOp::And { l && r } else { l || r }))
        }
    }
}

/// Orders two values; `None` means unordered (NaN involved).
fn compare(left: &Value, right: &Value) -> StreamResult<Option<Ordering>> {
    match (left, right) {
        (Value::Text(l), Value::Text(r)) => Ok(Some(l.cmp(r))),
        (Value::Row(l), Value::Row(r)) => Ok(Some(l.cmp(r))),
        (Value::Text(_) | Value::Row(_), _) | (_, Value::Text(_) | Value::Row(_)) => {
            Err(StreamError::Evaluate(format!("cannot compare {left} with {right}")))
        }
        _ => Ok(left.to_number()?.partial_cmp(&right.to_number()?)),
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::Blank => String::new(),
        Value::Text(s) => s.clone(),
        other => other.to_string(),
    }
}

fn eval_call(function: Function, args: &[Value]) -> StreamResult<Value> {
    let number = |idx: usize| args[idx].to_number();
    let out = match function {
        Function::Abs => number(0)?.abs(),
        Function::Sqrt => number(0)?.sqrt(),
        Function::Exp => number(0)?.exp(),
        Function::Ln => number(0)?.ln(),
        Function::Log10 => number(0)?.log10(),
        Function::Floor => number(0)?.floor(),
        Function::Ceil => number(0)?.ceil(),
        Function::Round => {
            let digits = if args.len() > 1 { number(1)? } else { 0.0 };
            let scale = 10f64.powf(digits.trunc());
            (number(0)? * scale).round() / scale
        }
        Function::Pow => number(0)?.powf(number(1)?),
        Function::Min | Function::Max => {
            let mut acc = number(0)?;
            for idx in 1..args.len() {
                let n = number(idx)?;
                acc = if function == Function::Min { acc.min(n) } else { acc.max(n) };
            }
            acc
        }
        Function::IsNan => {
            return Ok(Value::Boolean(match &args[0] {
                Value::Blank => true,
                Value::Number(n) => n.is_nan(),
                _ => false,
            }))
        }
        // Lowered to a lazy branch in `eval`.
        Function::If => return Err(StreamError::Evaluate("IF evaluated eagerly".into())),
    };
    Ok(Value::Number(out))
}
