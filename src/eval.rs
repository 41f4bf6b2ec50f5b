//! Safe arithmetic evaluator over a closed grammar.
//!
//! ```text
//! expr  := term (('+' | '-') term)*
//! term  := unary (('*' | '/') unary)*
//! unary := ('+' | '-') unary | power
//! power := atom (('^' | '**') unary)?
//! atom  := NUMBER | '(' expr ')'
//! ```
//!
//! There are no names, calls or comparisons, so nothing outside the grammar can be reached.
//! Exponentiation binds tighter than a leading sign and is right-associative (`-2^2 == -4`).

use std::collections::HashMap;

use tracing::{debug, instrument};

use crate::error::EvalError;

const DIVISION_EPSILON: f64 = 1e-9;
const MAX_POW_BASE: f64 = 1e6;
const MAX_POW_EXPONENT: f64 = 12.0;
const INTEGER_EPSILON: f64 = 1e-9;
/// Deepest allowed nesting of parentheses and signs.
const MAX_NESTING: usize = 64;
/// Longest token stream accepted; bounds the tree size for the recursive walks.
const MAX_TOKENS: usize = 256;
/// Tolerance used when comparing a result with the target.
pub const TARGET_TOLERANCE: f64 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
  Add,
  Sub,
  Mul,
  Div,
  Pow,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
  Plus,
  Neg,
}

/// Parsed expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
  Num { value: f64, text: String },
  Unary { op: UnaryOp, operand: Box<Node> },
  Binary { op: BinOp, lhs: Box<Node>, rhs: Box<Node> },
}

impl Node {
  /// Nesting depth; a bare literal is 1.
  pub fn depth(&self) -> usize {
    match self {
      Node::Num { .. } => 1,
      Node::Unary { operand, .. } => 1 + operand.depth(),
      Node::Binary { lhs, rhs, .. } => 1 + lhs.depth().max(rhs.depth()),
    }
  }

  /// Visit every binary operator in the tree.
  pub fn for_each_op(&self, f: &mut impl FnMut(BinOp)) {
    match self {
      Node::Num { .. } => {}
      Node::Unary { operand, .. } => operand.for_each_op(f),
      Node::Binary { op, lhs, rhs } => {
        f(*op);
        lhs.for_each_op(f);
        rhs.for_each_op(f);
      }
    }
  }

  /// Literals in order. A literal directly under a minus sign is flagged, since `(-3)` may
  /// stand for the value -3 or for 3 negated.
  fn collect_literals<'a>(&'a self, out: &mut Vec<Literal<'a>>) {
    match self {
      Node::Num { value, text } => out.push(Literal { value: *value, text, negated: false }),
      Node::Unary { op: UnaryOp::Neg, operand } => match operand.as_ref() {
        Node::Num { value, text } => out.push(Literal { value: *value, text, negated: true }),
        other => other.collect_literals(out),
      },
      Node::Unary { operand, .. } => operand.collect_literals(out),
      Node::Binary { lhs, rhs, .. } => {
        lhs.collect_literals(out);
        rhs.collect_literals(out);
      }
    }
  }

  /// Numeric value of the tree with division and power guards.
  pub fn value(&self) -> Result<f64, EvalError> {
    match self {
      Node::Num { value, .. } => Ok(*value),
      Node::Unary { op, operand } => {
        let v = operand.value()?;
        Ok(match op {
          UnaryOp::Plus => v,
          UnaryOp::Neg => -v,
        })
      }
      Node::Binary { op, lhs, rhs } => {
        let a = lhs.value()?;
        let b = rhs.value()?;
        match op {
          BinOp::Add => Ok(a + b),
          BinOp::Sub => Ok(a - b),
          BinOp::Mul => Ok(a * b),
          BinOp::Div => {
            if b.abs() < DIVISION_EPSILON {
              return Err(EvalError::DivisionByZero);
            }
            Ok(a / b)
          }
          BinOp::Pow => {
            if a.abs() > MAX_POW_BASE || b.abs() > MAX_POW_EXPONENT {
              return Err(EvalError::PowerOverflow { base: a, exponent: b });
            }
            if a.abs() < DIVISION_EPSILON && b < 0.0 {
              return Err(EvalError::DivisionByZero);
            }
            let r = a.powf(b);
            if !r.is_finite() {
              return Err(EvalError::IllegalExpression(format!("{}^{} has no real value", a, b)));
            }
            Ok(r)
          }
        }
      }
    }
  }
}

struct Literal<'a> {
  value: f64,
  text: &'a str,
  negated: bool,
}

#[derive(Clone, Debug, PartialEq)]
enum Tok {
  Num(f64, String),
  Plus,
  Minus,
  Star,
  Slash,
  Caret,
  LParen,
  RParen,
}

fn tokenize(input: &str) -> Result<Vec<Tok>, EvalError> {
  let bytes = input.as_bytes();
  let mut out = Vec::new();
  let mut pos = 0;
  while pos < input.len() {
    if out.len() > MAX_TOKENS {
      return Err(EvalError::IllegalExpression("expression too long".into()));
    }
    let b = bytes[pos];
    match b {
      b' ' | b'\t' | b'\n' | b'\r' => pos += 1,
      b'+' => { out.push(Tok::Plus); pos += 1; }
      b'-' => { out.push(Tok::Minus); pos += 1; }
      b'/' => { out.push(Tok::Slash); pos += 1; }
      b'^' => { out.push(Tok::Caret); pos += 1; }
      b'(' => { out.push(Tok::LParen); pos += 1; }
      b')' => { out.push(Tok::RParen); pos += 1; }
      b'*' => {
        if bytes.get(pos + 1) == Some(&b'*') {
          out.push(Tok::Caret);
          pos += 2;
        } else {
          out.push(Tok::Star);
          pos += 1;
        }
      }
      b'0'..=b'9' | b'.' => {
        let start = pos;
        while pos < input.len() && bytes[pos].is_ascii_digit() {
          pos += 1;
        }
        if pos < input.len() && bytes[pos] == b'.' {
          pos += 1;
          while pos < input.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
          }
        }
        let text = &input[start..pos];
        let value: f64 = text
          .parse()
          .map_err(|_| EvalError::IllegalExpression(format!("bad number '{}'", text)))?;
        out.push(Tok::Num(value, text.to_string()));
      }
      _ => {
        let ch = input[pos..].chars().next().unwrap_or('?');
        return Err(EvalError::IllegalExpression(format!("unexpected '{}' at {}", ch, pos)));
      }
    }
  }
  Ok(out)
}

struct Parser {
  toks: Vec<Tok>,
  pos: usize,
  depth: usize,
}

impl Parser {
  fn peek(&self) -> Option<&Tok> {
    self.toks.get(self.pos)
  }

  fn bump(&mut self) -> Option<Tok> {
    let t = self.toks.get(self.pos).cloned();
    self.pos += 1;
    t
  }

  fn descend(&mut self) -> Result<(), EvalError> {
    self.depth += 1;
    if self.depth > MAX_NESTING {
      return Err(EvalError::IllegalExpression("expression nested too deeply".into()));
    }
    Ok(())
  }

  fn expr(&mut self) -> Result<Node, EvalError> {
    let mut lhs = self.term()?;
    loop {
      let op = match self.peek() {
        Some(Tok::Plus) => BinOp::Add,
        Some(Tok::Minus) => BinOp::Sub,
        _ => return Ok(lhs),
      };
      self.pos += 1;
      let rhs = self.term()?;
      lhs = Node::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
    }
  }

  fn term(&mut self) -> Result<Node, EvalError> {
    let mut lhs = self.unary()?;
    loop {
      let op = match self.peek() {
        Some(Tok::Star) => BinOp::Mul,
        Some(Tok::Slash) => BinOp::Div,
        _ => return Ok(lhs),
      };
      self.pos += 1;
      let rhs = self.unary()?;
      lhs = Node::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
    }
  }

  fn unary(&mut self) -> Result<Node, EvalError> {
    let op = match self.peek() {
      Some(Tok::Plus) => UnaryOp::Plus,
      Some(Tok::Minus) => UnaryOp::Neg,
      _ => return self.power(),
    };
    self.pos += 1;
    self.descend()?;
    let operand = self.unary()?;
    self.depth -= 1;
    Ok(Node::Unary { op, operand: Box::new(operand) })
  }

  fn power(&mut self) -> Result<Node, EvalError> {
    let base = self.atom()?;
    if let Some(Tok::Caret) = self.peek() {
      self.pos += 1;
      self.descend()?;
      let exponent = self.unary()?;
      self.depth -= 1;
      return Ok(Node::Binary { op: BinOp::Pow, lhs: Box::new(base), rhs: Box::new(exponent) });
    }
    Ok(base)
  }

  fn atom(&mut self) -> Result<Node, EvalError> {
    match self.bump() {
      Some(Tok::Num(value, text)) => Ok(Node::Num { value, text }),
      Some(Tok::LParen) => {
        self.descend()?;
        let inner = self.expr()?;
        self.depth -= 1;
        match self.bump() {
          Some(Tok::RParen) => Ok(inner),
          _ => Err(EvalError::IllegalExpression("unbalanced parentheses".into())),
        }
      }
      Some(t) => Err(EvalError::IllegalExpression(format!("unexpected token {:?}", t))),
      None => Err(EvalError::IllegalExpression("unexpected end of expression".into())),
    }
  }
}

/// Parse an already-normalized expression.
pub fn parse(expr: &str) -> Result<Node, EvalError> {
  let toks = tokenize(expr)?;
  if toks.is_empty() {
    return Err(EvalError::IllegalExpression("empty expression".into()));
  }
  if toks.len() > MAX_TOKENS {
    return Err(EvalError::IllegalExpression("expression too long".into()));
  }
  let mut p = Parser { toks, pos: 0, depth: 0 };
  let node = p.expr()?;
  if p.pos != p.toks.len() {
    return Err(EvalError::IllegalExpression("trailing input".into()));
  }
  Ok(node)
}

fn as_integer(v: f64) -> Option<i64> {
  let r = v.round();
  if (v - r).abs() < INTEGER_EPSILON && r.abs() < i64::MAX as f64 {
    Some(r as i64)
  } else {
    None
  }
}

/// Literal multiset check: every required value appears exactly once and nothing else does.
/// A negated literal such as `(-3)` may match either 3 or -3.
fn check_operands(node: &Node, required: &[i64]) -> Result<(), EvalError> {
  let mut lits = Vec::new();
  node.collect_literals(&mut lits);
  let mut expected = required.to_vec();
  expected.sort_unstable();

  if operands_match(&lits, &expected) {
    return Ok(());
  }
  let mut found: Vec<String> = lits
    .iter()
    .map(|l| if l.negated { format!("-{}", l.text) } else { l.text.to_string() })
    .collect();
  found.sort();
  Err(EvalError::WrongOperands { expected, found })
}

fn operands_match(lits: &[Literal<'_>], expected: &[i64]) -> bool {
  if lits.len() != expected.len() {
    return false;
  }
  let mut remaining: HashMap<i64, usize> = HashMap::new();
  for v in expected {
    *remaining.entry(*v).or_default() += 1;
  }
  fn take(v: i64, remaining: &mut HashMap<i64, usize>) -> bool {
    match remaining.get_mut(&v) {
      Some(n) if *n > 0 => {
        *n -= 1;
        true
      }
      _ => false,
    }
  }

  // Plain literals must match their own value; signed ones may take either sign.
  let mut signed = Vec::new();
  for lit in lits {
    let Some(v) = as_integer(lit.value) else {
      return false;
    };
    if lit.negated {
      signed.push(v);
    } else if !take(v, &mut remaining) {
      return false;
    }
  }
  // Prefer the negative reading; both readings share an absolute value, so any leftover
  // of the opposite sign is only usable by another signed literal of the same magnitude.
  signed.into_iter().all(|v| take(-v, &mut remaining) || take(v, &mut remaining))
}

/// Evaluate `expr` and enforce that it uses exactly `required_values`, each once.
///
/// The expression should already be normalized (see `normalize::normalize`).
/// Arithmetic errors take precedence over the operand check.
#[instrument(level = "debug", skip(expr), fields(expr_len = expr.len()))]
pub fn evaluate(expr: &str, required_values: &[i64]) -> Result<f64, EvalError> {
  let node = parse(expr)?;
  let value = node.value()?;
  check_operands(&node, required_values)?;
  debug!(target: "play", value, "expression evaluated");
  Ok(value)
}

#[cfg(test)]
fn evaluate_unchecked(expr: &str) -> Result<f64, EvalError> {
  parse(expr)?.value()
}

pub fn hits_target(value: f64, target: i64) -> bool {
  (value - target as f64).abs() < TARGET_TOLERANCE
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn exact_use_is_enforced() {
    assert_eq!(evaluate("1+2+3+4", &[1, 2, 3, 4]), Ok(10.0));
    assert!(matches!(evaluate("1+2+3+5", &[1, 2, 3, 4]), Err(EvalError::WrongOperands { .. })));
    assert!(matches!(evaluate("1+2+3+4+4", &[1, 2, 3, 4]), Err(EvalError::WrongOperands { .. })));
    assert!(matches!(evaluate("1+2+3", &[1, 2, 3, 4]), Err(EvalError::WrongOperands { .. })));
  }

  #[test]
  fn operand_order_does_not_matter() {
    assert_eq!(evaluate("(13-7)*(5-1)", &[1, 5, 7, 13]), Ok(24.0));
    assert_eq!(evaluate("8/(3-8/3)", &[3, 3, 8, 8]).map(|v| hits_target(v, 24)), Ok(true));
  }

  #[test]
  fn rejects_anything_outside_the_grammar() {
    for bad in ["__import__('os')", "a+1", "1<2", "abs(3)", "1,2", "x", "1==1", "[1]"] {
      assert!(matches!(evaluate(bad, &[1, 2, 3, 4]), Err(EvalError::IllegalExpression(_))), "{bad}");
    }
  }

  #[test]
  fn rejects_malformed_input() {
    for bad in ["", "(1+2", "1+", "1 2", ")", "1+2)"] {
      assert!(matches!(parse(bad), Err(EvalError::IllegalExpression(_))), "{bad}");
    }
  }

  #[test]
  fn division_by_zero_beats_operand_check() {
    assert_eq!(evaluate("1/0", &[1]), Err(EvalError::DivisionByZero));
    assert_eq!(evaluate("4/(2-2)", &[4, 2, 2]), Err(EvalError::DivisionByZero));
  }

  #[test]
  fn power_is_guarded() {
    assert!(matches!(evaluate("2^13", &[2, 13]), Err(EvalError::PowerOverflow { .. })));
    assert!(matches!(evaluate("1000001^1", &[1000001, 1]), Err(EvalError::PowerOverflow { .. })));
    assert_eq!(evaluate("2^3*3*1", &[2, 3, 3, 1]), Ok(24.0));
    assert_eq!(evaluate("2**3*3*1", &[2, 3, 3, 1]), Ok(24.0));
  }

  #[test]
  fn power_binds_tighter_than_sign() {
    assert_eq!(evaluate_unchecked("-2^2"), Ok(-4.0));
    assert_eq!(evaluate_unchecked("2^-1"), Ok(0.5));
    assert_eq!(evaluate_unchecked("2^3^2"), Ok(512.0));
  }

  #[test]
  fn signs_wrap_literals_without_changing_them() {
    assert_eq!(evaluate("-1+2+3+4*5", &[1, 2, 3, 4, 5]), Ok(24.0));
  }

  #[test]
  fn near_integer_literals_count_as_integers() {
    assert_eq!(evaluate("1.0+2+3+4", &[1, 2, 3, 4]), Ok(10.0));
    assert!(matches!(evaluate("1.5+2+3+4", &[1, 2, 3, 4]), Err(EvalError::WrongOperands { .. })));
  }

  #[test]
  fn negated_literals_match_either_sign() {
    assert_eq!(evaluate("(-3)*(-8)*1*1", &[-3, -8, 1, 1]), Ok(24.0));
    assert_eq!(evaluate("-3*8*(-1)*1", &[3, 8, 1, 1]), Ok(24.0));
    assert_eq!(evaluate("(-3)-(-3)+24", &[-3, 3, 24]), Ok(24.0));
    assert!(matches!(evaluate("(-3)*8", &[-3, -8]), Err(EvalError::WrongOperands { .. })));
    assert!(matches!(evaluate("3*8", &[-3, 8]), Err(EvalError::WrongOperands { .. })));
  }

  #[test]
  fn deep_nesting_is_rejected_without_recursing() {
    let parens = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
    assert!(matches!(evaluate(&parens, &[1]), Err(EvalError::IllegalExpression(_))));
    let signs = format!("{}1", "-".repeat(100_000));
    assert!(matches!(evaluate(&signs, &[1]), Err(EvalError::IllegalExpression(_))));
    let chain = vec!["1"; 50_000].join("+");
    assert!(matches!(evaluate(&chain, &[1]), Err(EvalError::IllegalExpression(_))));

    let nested = format!("{}1{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
    assert_eq!(evaluate(&nested, &[1]), Ok(1.0));
    let too_deep = format!("{}1{}", "(".repeat(MAX_NESTING + 1), ")".repeat(MAX_NESTING + 1));
    assert_eq!(evaluate(&too_deep, &[1]), Err(EvalError::IllegalExpression("expression nested too deeply".into())));
  }

  #[test]
  fn depth_counts_nesting() {
    assert_eq!(parse("1").map(|n| n.depth()), Ok(1));
    assert_eq!(parse("1+2").map(|n| n.depth()), Ok(2));
    assert_eq!(parse("(1+2)*3").map(|n| n.depth()), Ok(3));
  }
}
