//! Identifier generation and artifact naming.

use uuid::Uuid;

use crate::dag::Dag;
use crate::error::WorkflowError;

/// A fresh random id for an operator, artifact or resource.
pub fn new_id() -> Uuid {
  Uuid::new_v4()
}

/// Trim surrounding whitespace; empty names are rejected.
pub fn sanitize_artifact_name(name: &str) -> Result<String, WorkflowError> {
  let trimmed = name.trim();
  if trimmed.is_empty() {
    return Err(WorkflowError::user_argument(
      "artifact name must not be empty",
    ));
  }
  Ok(trimmed.to_string())
}

pub fn default_artifact_name_from_op(op_name: &str) -> String {
  format!("{} artifact", op_name)
}

/// `"x"` becomes `"x (1)"` and `"x (N)"` becomes `"x (N+1)"` for a positive integer N
/// of any length.
pub fn bump_artifact_suffix(name: &str) -> String {
  if let Some((base, digits)) = split_suffix(name) {
    return format!("{} ({})", base, increment_decimal(digits));
  }
  format!("{} (1)", name)
}

/// Splits `"<base> (<N>)"` into the base and the digits of N without leading zeros.
fn split_suffix(name: &str) -> Option<(&str, &str)> {
  let inner = name.strip_suffix(')')?;
  let open = inner.rfind(" (")?;
  let digits = &inner[open + 2..];
  if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  let digits = digits.trim_start_matches('0');
  if digits.is_empty() {
    return None;
  }
  Some((&name[..open], digits))
}

fn increment_decimal(digits: &str) -> String {
  let mut out: Vec<u8> = digits.bytes().collect();
  for b in out.iter_mut().rev() {
    if *b == b'9' {
      *b = b'0';
    } else {
      *b += 1;
      return String::from_utf8_lossy(&out).into_owned();
    }
  }
  format!("1{}", String::from_utf8_lossy(&out))
}

/// The first of `"<prefix> 1"`, `"<prefix> 2"`, ... not used by any operator.
pub fn get_unclaimed_op_name(dag: &Dag, prefix: &str) -> String {
  let mut n: u64 = 1;
  loop {
    let candidate = format!("{} {}", prefix, n);
    if !dag.is_name_claimed(&candidate) {
      return candidate;
    }
    n += 1;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::add_extract;

  #[test]
  fn test_sanitize_artifact_name() {
    assert_eq!(sanitize_artifact_name("  churn  ").unwrap(), "churn");
    assert!(matches!(
      sanitize_artifact_name("   "),
      Err(WorkflowError::UserArgument { .. })
    ));
  }

  #[test]
  fn test_bump_artifact_suffix() {
    assert_eq!(bump_artifact_suffix("x"), "x (1)");
    assert_eq!(bump_artifact_suffix("x (1)"), "x (2)");
    assert_eq!(bump_artifact_suffix("x (9)"), "x (10)");
    assert_eq!(bump_artifact_suffix("x (abc)"), "x (abc) (1)");
    assert_eq!(bump_artifact_suffix("x (0)"), "x (0) (1)");
    assert_eq!(bump_artifact_suffix("x (-2)"), "x (-2) (1)");
    assert_eq!(bump_artifact_suffix("(3)"), "(3) (1)");
    assert_eq!(bump_artifact_suffix("x (007)"), "x (8)");
    assert_eq!(bump_artifact_suffix("x (199)"), "x (200)");
    assert_eq!(
      bump_artifact_suffix("x (18446744073709551615)"),
      "x (18446744073709551616)"
    );
    assert_eq!(
      bump_artifact_suffix("x (99999999999999999999)"),
      "x (100000000000000000000)"
    );
  }

  #[test]
  fn test_get_unclaimed_op_name() {
    let mut dag = Dag::new();
    assert_eq!(get_unclaimed_op_name(&dag, "foo:bar"), "foo:bar 1");

    add_extract(&mut dag, "foo:bar 1");
    add_extract(&mut dag, "foo:bar 2");
    assert_eq!(get_unclaimed_op_name(&dag, "foo:bar"), "foo:bar 3");
  }

  #[test]
  fn test_default_artifact_name() {
    assert_eq!(default_artifact_name_from_op("demo query"), "demo query artifact");
  }
}
