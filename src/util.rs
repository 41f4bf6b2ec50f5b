//! Small utility helpers used across modules.

/// Card face for a value: 1 -> "A", 10 -> "T", 11 -> "J", 12 -> "Q", 13 -> "K", others as digits.
pub fn rank_code(n: i64) -> String {
  match n {
    1 => "A".into(),
    10 => "T".into(),
    11 => "J".into(),
    12 => "Q".into(),
    13 => "K".into(),
    other => other.to_string(),
  }
}

/// Answers that mean "these cards have no solution".
pub fn is_no_solution_claim(answer: &str) -> bool {
  let compact: String = answer
    .chars()
    .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
    .flat_map(char::to_lowercase)
    .collect();
  matches!(compact.as_str(), "nosolution" | "nosol" | "none" | "ns" | "impossible")
}

/// Log-safe truncation for user-submitted strings.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut end = max;
  while !s.is_char_boundary(end) {
    end -= 1;
  }
  format!("{}… ({} bytes total)", &s[..end], s.len())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rank_codes() {
    let codes: Vec<String> = [1, 2, 9, 10, 11, 12, 13].iter().map(|n| rank_code(*n)).collect();
    assert_eq!(codes, vec!["A", "2", "9", "T", "J", "Q", "K"]);
  }

  #[test]
  fn no_solution_claims() {
    for s in ["no solution", "No-Solution", "NOSOL", "none", " ns ", "no_solution"] {
      assert!(is_no_solution_claim(s), "{s}");
    }
    for s in ["", "1+2+3+4", "no", "solution"] {
      assert!(!is_no_solution_claim(s), "{s}");
    }
  }

  #[test]
  fn truncation_respects_char_boundaries() {
    assert_eq!(trunc_for_log("abc", 5), "abc");
    assert_eq!(trunc_for_log("×××", 3), "×… (6 bytes total)");
  }
}
