//! Expression normalization: rank letters and unicode math glyphs to plain ASCII arithmetic.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
  // A lone rank letter; `AK` or `Q2` are left alone.
  static ref RANK_TOKEN: Regex = Regex::new(r"(?i)\b([ATJQK])\b").unwrap();
}

/// Numeric value of a rank letter (case-insensitive).
pub fn rank_value(letter: char) -> Option<i64> {
  match letter.to_ascii_uppercase() {
    'A' => Some(1),
    'T' => Some(10),
    'J' => Some(11),
    'Q' => Some(12),
    'K' => Some(13),
    _ => None,
  }
}

fn map_glyph(ch: char) -> char {
  match ch {
    '×' | '∗' | '·' => '*',
    '÷' | '／' => '/',
    '−' | '—' | '–' => '-',
    other => other,
  }
}

/// Rewrite an expression into canonical arithmetic text.
///
/// `"K + K − J + 9"` becomes `"13+13-11+9"`. Empty input comes back empty.
/// Idempotent: the output contains no rank letters, glyphs or whitespace.
pub fn normalize(expr: &str) -> String {
  if expr.is_empty() {
    return String::new();
  }
  let glyphs: String = expr.chars().map(map_glyph).collect();
  let ranks = RANK_TOKEN.replace_all(&glyphs, |caps: &Captures| {
    caps[1]
      .chars()
      .next()
      .and_then(rank_value)
      .map(|v| v.to_string())
      .unwrap_or_else(|| caps[1].to_string())
  });
  ranks.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use proptest::prelude::*;

  #[test]
  fn maps_rank_letters() {
    assert_eq!(normalize("K+K-J+9"), "13+13-11+9");
    assert_eq!(normalize("a * t + q / k"), "1*10+12/13");
  }

  #[test]
  fn leaves_longer_identifiers_alone() {
    assert_eq!(normalize("AK+1"), "AK+1");
    assert_eq!(normalize("__import__('os')"), "__import__('os')");
  }

  #[test]
  fn maps_unicode_glyphs() {
    assert_eq!(normalize("3 × 8"), "3*8");
    assert_eq!(normalize("6∗4·1"), "6*4*1");
    assert_eq!(normalize("48 ÷ 2"), "48/2");
    assert_eq!(normalize("48／2"), "48/2");
    assert_eq!(normalize("30 − 6 — 0 – 0"), "30-6-0-0");
  }

  #[test]
  fn empty_is_unchanged() {
    assert_eq!(normalize(""), "");
  }

  #[test]
  fn whitespace_between_ranks_is_a_boundary() {
    // Stripping happens last, so spaced letters are still separate tokens.
    assert_eq!(normalize("Q Q"), "1212");
  }

  proptest! {
    #[test]
    fn normalize_is_idempotent(s in "[0-9ATJQKatjqk+*/()×÷−·\\- ^.]{0,24}") {
      let once = normalize(&s);
      prop_assert_eq!(normalize(&once), once.clone());
    }
  }
}
