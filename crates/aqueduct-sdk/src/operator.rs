use aqueduct_config::{CheckSeverity, ResourceRequest};
use aqueduct_workflow::ArtifactValue;

use crate::artifact::Artifact;
use crate::packager::FunctionSource;

/// What a user function becomes in the DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
  Function,
  /// Produces one numeric artifact.
  Metric,
  /// Produces one boolean artifact.
  Check { severity: CheckSeverity },
}

/// Whether a call previews its outputs immediately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
  #[default]
  Eager,
  Lazy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outputs {
  Count(usize),
  Named(Vec<String>),
}

impl Outputs {
  pub(crate) fn len(&self) -> usize {
    match self {
      Outputs::Count(n) => *n,
      Outputs::Named(names) => names.len(),
    }
  }
}

/// A user function declared as an operator.
///
/// Calling it through [`WorkflowBuilder::call`](crate::WorkflowBuilder::call)
/// adds an operator to the workflow.
#[derive(Debug, Clone)]
pub struct OperatorFn {
  pub(crate) function_name: String,
  pub(crate) name: Option<String>,
  pub(crate) kind: FunctionKind,
  pub(crate) params: Vec<String>,
  pub(crate) outputs: Outputs,
  pub(crate) description: String,
  pub(crate) resources: Option<ResourceRequest>,
  pub(crate) engine: Option<String>,
  pub(crate) source: FunctionSource,
  pub(crate) mode: ExecutionMode,
}

impl OperatorFn {
  fn new(function_name: &str, kind: FunctionKind, params: &[&str], source: FunctionSource) -> Self {
    Self {
      function_name: function_name.to_string(),
      name: None,
      kind,
      params: params.iter().map(|p| p.to_string()).collect(),
      outputs: Outputs::Count(1),
      description: String::new(),
      resources: None,
      engine: None,
      source,
      mode: ExecutionMode::Eager,
    }
  }

  /// A function with the given declared parameter names.
  pub fn function(function_name: &str, params: &[&str], source: FunctionSource) -> Self {
    Self::new(function_name, FunctionKind::Function, params, source)
  }

  pub fn metric(function_name: &str, params: &[&str], source: FunctionSource) -> Self {
    Self::new(function_name, FunctionKind::Metric, params, source)
  }

  pub fn check(
    function_name: &str,
    params: &[&str],
    severity: CheckSeverity,
    source: FunctionSource,
  ) -> Self {
    Self::new(function_name, FunctionKind::Check { severity }, params, source)
  }

  /// Operator name, used instead of the function name.
  pub fn named(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  /// Explicit names for the outputs, one per output.
  pub fn outputs<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
    self.outputs = Outputs::Named(names.into_iter().map(Into::into).collect());
    self
  }

  /// Number of default-named outputs.
  pub fn num_outputs(mut self, n: usize) -> Self {
    self.outputs = Outputs::Count(n);
    self
  }

  pub fn description(mut self, description: impl Into<String>) -> Self {
    self.description = description.into();
    self
  }

  pub fn resources(mut self, resources: ResourceRequest) -> Self {
    self.resources = Some(resources);
    self
  }

  /// Run on the named compute resource instead of the flow's engine.
  pub fn engine(mut self, engine: impl Into<String>) -> Self {
    self.engine = Some(engine.into());
    self
  }

  pub fn execution_mode(mut self, mode: ExecutionMode) -> Self {
    self.mode = mode;
    self
  }

  /// A copy of this operator whose calls skip the preview.
  pub fn lazy(&self) -> Self {
    self.clone().execution_mode(ExecutionMode::Lazy)
  }

  /// The operator name: the explicit name if set, else the function name.
  pub fn op_name(&self) -> &str {
    self.name.as_deref().unwrap_or(&self.function_name)
  }

  pub fn kind(&self) -> FunctionKind {
    self.kind
  }
}

/// An argument of an operator call.
#[derive(Debug, Clone)]
pub enum Arg {
  Artifact(Artifact),
  /// A literal, turned into an implicit parameter.
  Value(ArtifactValue),
}

impl From<Artifact> for Arg {
  fn from(artifact: Artifact) -> Self {
    Arg::Artifact(artifact)
  }
}

impl From<&Artifact> for Arg {
  fn from(artifact: &Artifact) -> Self {
    Arg::Artifact(artifact.clone())
  }
}

impl From<ArtifactValue> for Arg {
  fn from(value: ArtifactValue) -> Self {
    Arg::Value(value)
  }
}
