//! Difficulty scoring for solution expressions. Only used to bucket puzzles into pools.

use serde::Deserialize;

use crate::domain::Puzzle;
use crate::eval::{parse, BinOp};
use crate::normalize::normalize;

/// Score given to expressions that do not parse.
pub const UNPARSEABLE_SCORE: u32 = 999;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ComplexityWeights {
  pub add: u32,
  pub sub: u32,
  pub mul: u32,
  pub div: u32,
  pub pow: u32,
  /// Multiplied by the maximum nesting depth.
  pub depth: u32,
  /// One point per this many characters of normalized text.
  pub length_divisor: usize,
  /// Added once when two or more divisions appear.
  pub multi_div_penalty: u32,
  /// Added once when a power appears together with a division or depth >= 4.
  pub pow_combo_penalty: u32,
}

impl Default for ComplexityWeights {
  fn default() -> Self {
    Self {
      add: 1,
      sub: 1,
      mul: 1,
      div: 2,
      pow: 3,
      depth: 2,
      length_divisor: 6,
      multi_div_penalty: 2,
      pow_combo_penalty: 2,
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ComplexityConfig {
  pub weights: ComplexityWeights,
  /// A puzzle is "simple" when its easiest solution scores at most this.
  pub simple_threshold: u32,
  /// A puzzle is "hard" when its hardest solution scores at least this.
  pub hard_threshold: u32,
}

impl Default for ComplexityConfig {
  fn default() -> Self {
    Self { weights: ComplexityWeights::default(), simple_threshold: 11, hard_threshold: 18 }
  }
}

impl ComplexityConfig {
  /// Score one expression; higher is harder.
  pub fn score(&self, expr: &str) -> u32 {
    let text = normalize(expr);
    let node = match parse(&text) {
      Ok(n) => n,
      Err(_) => return UNPARSEABLE_SCORE,
    };
    let w = &self.weights;

    let (mut adds, mut subs, mut muls, mut divs, mut pows) = (0u32, 0u32, 0u32, 0u32, 0u32);
    node.for_each_op(&mut |op| match op {
      BinOp::Add => adds += 1,
      BinOp::Sub => subs += 1,
      BinOp::Mul => muls += 1,
      BinOp::Div => divs += 1,
      BinOp::Pow => pows += 1,
    });
    let depth = node.depth() as u32;

    let mut score = adds * w.add + subs * w.sub + muls * w.mul + divs * w.div + pows * w.pow;
    score += depth * w.depth;
    score += (text.chars().count() / w.length_divisor.max(1)) as u32;
    if divs >= 2 {
      score += w.multi_div_penalty;
    }
    if pows >= 1 && (divs >= 1 || depth >= 4) {
      score += w.pow_combo_penalty;
    }
    score
  }

  pub fn has_simple_solution(&self, puzzle: &Puzzle) -> bool {
    puzzle
      .solutions
      .iter()
      .map(|s| self.score(s))
      .min()
      .map_or(false, |m| m <= self.simple_threshold)
  }

  pub fn has_hard_solution(&self, puzzle: &Puzzle) -> bool {
    puzzle
      .solutions
      .iter()
      .map(|s| self.score(s))
      .max()
      .map_or(false, |m| m >= self.hard_threshold)
  }
}

/// Score with the default weights.
pub fn score(expr: &str) -> u32 {
  ComplexityConfig::default().score(expr)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn puzzle(solutions: &[&str]) -> Puzzle {
    Puzzle {
      case_id: 1,
      cards: [1, 2, 3, 4],
      solutions: solutions.iter().map(|s| s.to_string()).collect(),
      level: None,
    }
  }

  #[test]
  fn harder_expressions_score_higher() {
    assert!(score("1+2") < score("(1+2)^3/ (4-1)"));
    assert!(score("1+2+3+4") < score("8/(3-8/3)"));
  }

  #[test]
  fn known_scores() {
    // one add (1) + depth 2 (4) + len 3/6 (0)
    assert_eq!(score("1+2"), 5);
    // ops 1+1+1 + depth 4*2 + 7/6
    assert_eq!(score("1+2+3+4"), 12);
    // pow 3 + div 2 + add 1 + sub 1, depth 4 -> 8, len 13/6 -> 2, pow combo +2
    assert_eq!(score("(1+2)^3/(4-1)"), 19);
  }

  #[test]
  fn rank_letters_and_glyphs_are_scored_like_numbers() {
    assert_eq!(score("K+Q"), score("13+12"));
    assert_eq!(score("6 × 4"), score("6*4"));
  }

  #[test]
  fn unparseable_is_worst_case() {
    assert_eq!(score("1+"), UNPARSEABLE_SCORE);
    assert_eq!(score("foo(1)"), UNPARSEABLE_SCORE);
  }

  #[test]
  fn two_divisions_add_penalty() {
    let cfg = ComplexityConfig::default();
    let single = cfg.score("8/4+1+2");
    let double = cfg.score("8/4/1+2");
    // same length and depth; one extra div weight (2 - 1) plus the penalty (2)
    assert_eq!(double, single + 3);
  }

  #[test]
  fn simple_and_hard_classification() {
    let cfg = ComplexityConfig::default();
    // "2*3*4" scores 8, "1*2*3*4" scores 12
    assert!(cfg.has_simple_solution(&puzzle(&["2*3*4", "((1+2)^3/(4-1))"])));
    assert!(!cfg.has_simple_solution(&puzzle(&["1*2*3*4"])));
    assert!(cfg.has_hard_solution(&puzzle(&["2*3*4", "(1+2)^3/(4-1)"])));
    assert!(!cfg.has_hard_solution(&puzzle(&["1*2*3*4"])));
    assert!(!cfg.has_simple_solution(&puzzle(&[])));
    assert!(!cfg.has_hard_solution(&puzzle(&[])));
  }
}
