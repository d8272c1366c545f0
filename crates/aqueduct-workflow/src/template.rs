//! Parameter placeholders in extract queries and load destinations.
//!
//! Templates use minijinja syntax: `select * from {{ table_name }}`. Every
//! placeholder except the built-ins names a parameter operator in the DAG.

use std::collections::{BTreeMap, BTreeSet};

use minijinja::{Environment, UndefinedBehavior, Value};

use crate::error::WorkflowError;

/// Placeholders the server expands itself.
pub const BUILTIN_PLACEHOLDERS: &[&str] = &["today"];

/// The parameter names referenced by a template, sorted.
pub fn placeholders(template: &str) -> Result<BTreeSet<String>, WorkflowError> {
  let env = Environment::new();
  let tmpl = env.template_from_str(template).map_err(|e| {
    WorkflowError::user_argument(format!("invalid template `{}`: {}", template, e))
  })?;
  Ok(
    tmpl
      .undeclared_variables(false)
      .into_iter()
      .filter(|name| !BUILTIN_PLACEHOLDERS.contains(&name.as_str()))
      .collect(),
  )
}

/// Render a template with string parameter values.
///
/// Every placeholder must have a value.
pub fn render_query(
  template: &str,
  values: &BTreeMap<String, String>,
) -> Result<String, WorkflowError> {
  let mut env = Environment::new();
  env.set_undefined_behavior(UndefinedBehavior::Strict);
  env
    .render_str(template, Value::from_serialize(values))
    .map_err(|e| WorkflowError::user_argument(format!("failed to render `{}`: {}", template, e)))
}
