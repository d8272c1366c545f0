//! Handles to artifacts of the session DAG or of a flow run.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use aqueduct_config::{
  ArtifactId, ArtifactMetadata, ArtifactType, CheckSeverity, CheckSpec, FunctionSpec,
  OperatorKind, OperatorSpec, SystemMetricSpec,
};
use aqueduct_workflow::{
  ArtifactValue, BUILTIN_PLACEHOLDERS, Dag, RemoveCheckOperatorDelta, Table, decode_param_spec,
  naming, render_query,
};
use serde_json::json;

use crate::context::WorkflowBuilder;
use crate::error::SdkError;
use crate::resource::SaveConfig;

#[derive(Clone)]
enum DagSource {
  Session,
  FlowRun(Rc<Dag>),
}

/// Shared state behind every artifact type.
#[derive(Clone)]
pub struct ArtifactHandle {
  builder: WorkflowBuilder,
  source: DagSource,
  id: ArtifactId,
  /// Producer name and artifact name when the handle was created.
  op_name: String,
  created_name: String,
  content: RefCell<Option<ArtifactValue>>,
}

impl fmt::Debug for ArtifactHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ArtifactHandle")
      .field("id", &self.id)
      .field("name", &self.created_name)
      .field("from_flow_run", &self.is_from_flow_run())
      .finish()
  }
}

impl ArtifactHandle {
  /// A handle to an artifact currently in the session DAG.
  pub(crate) fn session(builder: &WorkflowBuilder, id: ArtifactId) -> Result<Self, SdkError> {
    let (op_name, created_name) = names_in(&builder.borrow_dag(), id)?;
    Ok(Self {
      builder: builder.clone(),
      source: DagSource::Session,
      id,
      op_name,
      created_name,
      content: RefCell::new(None),
    })
  }

  /// A handle to an artifact of a finished run.
  pub(crate) fn flow_run(
    builder: &WorkflowBuilder,
    dag: Rc<Dag>,
    id: ArtifactId,
    content: Option<ArtifactValue>,
  ) -> Result<Self, SdkError> {
    let (op_name, created_name) = names_in(&dag, id)?;
    Ok(Self {
      builder: builder.clone(),
      source: DagSource::FlowRun(dag),
      id,
      op_name,
      created_name,
      content: RefCell::new(content),
    })
  }

  pub fn id(&self) -> ArtifactId {
    self.id
  }

  pub fn is_from_flow_run(&self) -> bool {
    matches!(self.source, DagSource::FlowRun(_))
  }

  pub(crate) fn builder(&self) -> &WorkflowBuilder {
    &self.builder
  }

  pub(crate) fn cached(&self) -> Option<ArtifactValue> {
    self.content.borrow().clone()
  }

  pub(crate) fn set_cached(&self, value: ArtifactValue) {
    *self.content.borrow_mut() = Some(value);
  }

  /// Run `f` against the DAG this artifact lives in.
  pub(crate) fn with_dag<R>(&self, f: impl FnOnce(&Dag) -> R) -> R {
    match &self.source {
      DagSource::Session => f(&self.builder.borrow_dag()),
      DagSource::FlowRun(dag) => f(dag),
    }
  }

  pub(crate) fn metadata(&self) -> Result<ArtifactMetadata, SdkError> {
    self
      .with_dag(|dag| dag.get_artifact(self.id).cloned())
      .ok_or_else(|| self.missing())
  }

  /// Fails unless this is a live artifact of the given session.
  pub(crate) fn ensure_in_session(&self, builder: &WorkflowBuilder) -> Result<(), SdkError> {
    if self.is_from_flow_run() {
      return Err(SdkError::user_argument(format!(
        "artifact `{}` comes from a flow run and cannot be used to build a new workflow",
        self.created_name
      )));
    }
    if !self.builder.same_session(builder) {
      return Err(SdkError::user_argument(format!(
        "artifact `{}` belongs to a different session",
        self.created_name
      )));
    }
    self.metadata().map(|_| ())
  }

  fn missing(&self) -> SdkError {
    let overwritten = match &self.source {
      DagSource::Session => self.builder.borrow_dag().is_name_claimed(&self.op_name),
      DagSource::FlowRun(_) => false,
    };
    if overwritten {
      SdkError::ArtifactOverwritten {
        name: self.created_name.clone(),
      }
    } else {
      SdkError::ArtifactNotFound { id: self.id }
    }
  }

  fn get(&self, parameters: Option<BTreeMap<String, ArtifactValue>>) -> Result<ArtifactValue, SdkError> {
    let parameters = parameters.filter(|p| !p.is_empty());

    if self.is_from_flow_run() {
      if parameters.is_some() {
        return Err(SdkError::user_argument(
          "parameters cannot be changed on an artifact from a flow run",
        ));
      }
      return self
        .cached()
        .ok_or_else(|| SdkError::ArtifactNeverComputed {
          name: self.created_name.clone(),
          reason: "the run did not compute it successfully".to_string(),
        });
    }

    self.metadata()?;
    if parameters.is_none()
      && let Some(value) = self.cached()
    {
      return Ok(value);
    }

    let mut values = self.builder.preview_artifacts(&[self.id], parameters.as_ref())?;
    let value = values
      .remove(&self.id)
      .ok_or_else(|| SdkError::internal(format!("preview returned no value for {}", self.id)))?;
    if parameters.is_none() {
      self.builder.record_value_type(self.id, &value)?;
      self.set_cached(value.clone());
    }
    Ok(value)
  }
}

fn names_in(dag: &Dag, id: ArtifactId) -> Result<(String, String), SdkError> {
  let artifact = dag.must_get_artifact(id)?;
  let producer = dag.must_get_operator_by_output(id)?;
  Ok((producer.name.clone(), artifact.name.clone()))
}

/// The query with the current values of its string parameters filled in.
/// Built-in placeholders are left for the server.
fn rendered_query(dag: &Dag, inputs: &[ArtifactId], template: &str) -> String {
  let mut values: BTreeMap<String, String> = BUILTIN_PLACEHOLDERS
    .iter()
    .map(|name| (name.to_string(), format!("{{{{ {} }}}}", name)))
    .collect();
  for input in inputs {
    if let Some(param) = dag.get_operator_by_output(*input)
      && let (Some(spec), Some(artifact)) = (param.spec.param(), dag.get_artifact(*input))
      && let Ok(value) = decode_param_spec(spec, artifact.artifact_type)
      && let Some(text) = value.as_str()
    {
      values.insert(param.name.clone(), text.to_string());
    }
  }
  render_query(template, &values).unwrap_or_else(|_| template.to_string())
}

/// Behavior shared by every artifact type.
pub trait BaseArtifact {
  fn handle(&self) -> &ArtifactHandle;

  fn id(&self) -> ArtifactId {
    self.handle().id
  }

  fn name(&self) -> Result<String, SdkError> {
    Ok(self.handle().metadata()?.name)
  }

  fn artifact_type(&self) -> Result<ArtifactType, SdkError> {
    Ok(self.handle().metadata()?.artifact_type)
  }

  fn from_flow_run(&self) -> bool {
    self.handle().is_from_flow_run()
  }

  /// Give the artifact an explicit name.
  fn set_name(&self, name: &str) -> Result<(), SdkError> {
    let handle = self.handle();
    handle.ensure_in_session(handle.builder())?;
    let name = naming::sanitize_artifact_name(name)?;
    handle.builder().rename_artifact(handle.id, name)
  }

  /// The artifact's value, computing it with a preview if needed.
  fn get(&self) -> Result<ArtifactValue, SdkError> {
    self.handle().get(None)
  }

  /// The value the artifact would have with the given parameter values.
  /// The session DAG is not changed.
  fn get_with_parameters(
    &self,
    parameters: BTreeMap<String, ArtifactValue>,
  ) -> Result<ArtifactValue, SdkError> {
    self.handle().get(Some(parameters))
  }

  /// Save this artifact to a resource when the flow runs.
  fn save(&self, config: &SaveConfig) -> Result<(), SdkError>
  where
    Self: Sized,
  {
    self.handle().builder().save(self, config)
  }

  /// Remove a check attached to this artifact, by name.
  fn remove_check(&self, check_name: &str) -> Result<(), SdkError> {
    let handle = self.handle();
    handle.ensure_in_session(handle.builder())?;
    handle
      .builder()
      .apply(&[&RemoveCheckOperatorDelta::new(handle.id, check_name)])
  }

  fn describe(&self) -> Result<String, SdkError> {
    let handle = self.handle();
    let metadata = handle.metadata()?;
    let mut out = format!("Name: {}\nType: {}\n", metadata.name, metadata.artifact_type);
    handle.with_dag(|dag| {
      if let Some(producer) = dag.get_operator_by_output(handle.id) {
        out.push_str(&format!("Produced by: {} ({})\n", producer.name, producer.kind()));
        let inputs: Vec<&str> = producer
          .inputs
          .iter()
          .filter_map(|id| dag.get_artifact(*id))
          .map(|a| a.name.as_str())
          .collect();
        if !inputs.is_empty() {
          out.push_str(&format!("Inputs: {}\n", inputs.join(", ")));
        }
        if let OperatorSpec::Extract(extract) = &producer.spec
          && let Some(template) = extract.params.template()
        {
          out.push_str(&format!("Query: {}\n", rendered_query(dag, &producer.inputs, template)));
        }
      }
      for (label, kinds) in [
        ("Metrics", &[OperatorKind::Metric, OperatorKind::SystemMetric][..]),
        ("Checks", &[OperatorKind::Check][..]),
      ] {
        let names: Vec<&str> = dag
          .list_operators(Some(kinds), Some(handle.id))
          .into_iter()
          .map(|op| op.name.as_str())
          .collect();
        if !names.is_empty() {
          out.push_str(&format!("{}: {}\n", label, names.join(", ")));
        }
      }
    });
    if handle.is_from_flow_run() {
      out.push_str("Source: flow run\n");
    }
    Ok(out)
  }
}

macro_rules! artifact_type {
  ($(#[$doc:meta])* $name:ident) => {
    $(#[$doc])*
    #[derive(Debug, Clone)]
    pub struct $name(ArtifactHandle);

    impl BaseArtifact for $name {
      fn handle(&self) -> &ArtifactHandle {
        &self.0
      }
    }
  };
}

artifact_type!(
  /// A tabular artifact.
  TableArtifact
);
artifact_type!(
  /// A numeric artifact, typically produced by a metric.
  NumericArtifact
);
artifact_type!(
  /// A boolean artifact, typically produced by a check.
  BoolArtifact
);
artifact_type!(
  /// Any other artifact, including ones whose type is not known until computed.
  GenericArtifact
);

/// A bound a metric is checked against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
  Upper(f64),
  Lower(f64),
  Equal(f64),
  NotEqual(f64),
}

impl Bound {
  fn describe(&self) -> (&'static str, f64) {
    match self {
      Bound::Upper(v) => ("upper", *v),
      Bound::Lower(v) => ("lower", *v),
      Bound::Equal(v) => ("equal", *v),
      Bound::NotEqual(v) => ("notequal", *v),
    }
  }
}

impl TableArtifact {
  /// The first `n` rows.
  pub fn head(&self, n: usize) -> Result<Table, SdkError> {
    match self.get()? {
      ArtifactValue::Table(table) => Ok(table.head(n)),
      other => Err(SdkError::user_action(format!(
        "artifact `{}` holds a {} value, not a table",
        self.name()?,
        other.artifact_type()
      ))),
    }
  }

  /// A metric counting the rows of this table.
  pub fn number_of_rows(&self) -> Result<NumericArtifact, SdkError> {
    let name = format!("{} number of rows", self.name()?);
    let spec = OperatorSpec::Metric(FunctionSpec::builtin("number_of_rows"));
    self.attach(name, spec, ArtifactType::Numeric)?.into_numeric()
  }

  /// The largest value in `column`.
  pub fn max(&self, column: &str) -> Result<NumericArtifact, SdkError> {
    self.column_metric(column, "max", "max")
  }

  /// The smallest value in `column`.
  pub fn min(&self, column: &str) -> Result<NumericArtifact, SdkError> {
    self.column_metric(column, "min", "min")
  }

  pub fn mean(&self, column: &str) -> Result<NumericArtifact, SdkError> {
    self.column_metric(column, "mean", "mean")
  }

  /// Standard deviation of `column`.
  pub fn std(&self, column: &str) -> Result<NumericArtifact, SdkError> {
    self.column_metric(column, "std", "std")
  }

  pub fn number_of_missing_values(&self, column: &str) -> Result<NumericArtifact, SdkError> {
    self.column_metric(column, "number_of_missing_values", "number of missing values")
  }

  /// A check that runs a named expectation against this table. `kwargs` are
  /// handed to the expectation unchanged.
  pub fn validate_with_expectation(
    &self,
    expectation: &str,
    kwargs: serde_json::Map<String, serde_json::Value>,
    severity: CheckSeverity,
  ) -> Result<BoolArtifact, SdkError> {
    let expectation = expectation.trim();
    if expectation.is_empty() {
      return Err(SdkError::user_argument("expectation name must not be empty"));
    }
    let name = format!("{} {}", self.name()?, expectation);
    let spec = OperatorSpec::Check(CheckSpec {
      function: FunctionSpec::builtin("validate_with_expectation")
        .with_arg("expectation", json!(expectation))
        .with_arg("kwargs", serde_json::Value::Object(kwargs)),
      level: severity,
    });
    self.attach(name, spec, ArtifactType::Bool)?.into_bool()
  }

  /// A metric the execution engine records for the operator producing this
  /// table, such as `runtime` or `max_memory`.
  pub fn system_metric(&self, metric_name: &str) -> Result<NumericArtifact, SdkError> {
    let name = format!("{} {}", self.name()?, metric_name);
    let spec = OperatorSpec::SystemMetric(SystemMetricSpec {
      metric_name: metric_name.to_string(),
    });
    self.attach(name, spec, ArtifactType::Numeric)?.into_numeric()
  }

  fn column_metric(
    &self,
    column: &str,
    builtin: &str,
    label: &str,
  ) -> Result<NumericArtifact, SdkError> {
    // Columns are only known once the table has been computed.
    if let Some(ArtifactValue::Table(table)) = self.handle().cached()
      && !table.columns.iter().any(|c| c == column)
    {
      return Err(SdkError::user_argument(format!(
        "table `{}` has no column `{}`",
        self.name()?,
        column
      )));
    }
    let name = format!("{} {} {}", self.name()?, column, label);
    let spec = OperatorSpec::Metric(FunctionSpec::builtin(builtin).with_arg("column", json!(column)));
    self.attach(name, spec, ArtifactType::Numeric)?.into_numeric()
  }

  fn attach(
    &self,
    name: String,
    spec: OperatorSpec,
    output_type: ArtifactType,
  ) -> Result<Artifact, SdkError> {
    let handle = self.handle();
    handle.ensure_in_session(handle.builder())?;
    handle.builder().add_builtin(name, spec, handle.id, output_type)
  }
}

impl NumericArtifact {
  pub fn value(&self) -> Result<f64, SdkError> {
    let value = self.get()?;
    value.as_f64().ok_or_else(|| {
      SdkError::internal(format!(
        "numeric artifact holds a {} value",
        value.artifact_type()
      ))
    })
  }

  /// A check that this metric stays within `bound`.
  pub fn bound(&self, bound: Bound, severity: CheckSeverity) -> Result<BoolArtifact, SdkError> {
    let handle = self.handle();
    handle.ensure_in_session(handle.builder())?;
    let (which, value) = bound.describe();
    let name = format!("{} {} bound {}", self.name()?, which, value);
    let spec = OperatorSpec::Check(CheckSpec {
      function: FunctionSpec::builtin("bound").with_arg(which, json!(value)),
      level: severity,
    });
    handle
      .builder()
      .add_builtin(name, spec, handle.id, ArtifactType::Bool)?
      .into_bool()
  }
}

impl BoolArtifact {
  pub fn value(&self) -> Result<bool, SdkError> {
    let value = self.get()?;
    value.as_bool().ok_or_else(|| {
      SdkError::internal(format!(
        "boolean artifact holds a {} value",
        value.artifact_type()
      ))
    })
  }
}

/// An artifact handle of any type.
#[derive(Debug, Clone)]
pub enum Artifact {
  Table(TableArtifact),
  Numeric(NumericArtifact),
  Bool(BoolArtifact),
  Generic(GenericArtifact),
}

impl Artifact {
  pub(crate) fn from_handle(handle: ArtifactHandle, artifact_type: ArtifactType) -> Self {
    match artifact_type {
      ArtifactType::Table => Artifact::Table(TableArtifact(handle)),
      ArtifactType::Numeric => Artifact::Numeric(NumericArtifact(handle)),
      ArtifactType::Bool => Artifact::Bool(BoolArtifact(handle)),
      _ => Artifact::Generic(GenericArtifact(handle)),
    }
  }

  /// Re-wrap the handle to match the artifact's current type.
  pub(crate) fn refresh(handle: ArtifactHandle) -> Result<Self, SdkError> {
    let artifact_type = handle.metadata()?.artifact_type;
    Ok(Self::from_handle(handle, artifact_type))
  }

  fn into_handle(self) -> ArtifactHandle {
    match self {
      Artifact::Table(a) => a.0,
      Artifact::Numeric(a) => a.0,
      Artifact::Bool(a) => a.0,
      Artifact::Generic(a) => a.0,
    }
  }

  /// Use as a table. Artifacts whose type is not yet known are accepted.
  pub fn into_table(self) -> Result<TableArtifact, SdkError> {
    self.convert(ArtifactType::Table, TableArtifact)
  }

  pub fn into_numeric(self) -> Result<NumericArtifact, SdkError> {
    self.convert(ArtifactType::Numeric, NumericArtifact)
  }

  pub fn into_bool(self) -> Result<BoolArtifact, SdkError> {
    self.convert(ArtifactType::Bool, BoolArtifact)
  }

  fn convert<T>(self, expected: ArtifactType, wrap: fn(ArtifactHandle) -> T) -> Result<T, SdkError> {
    let actual = self.artifact_type()?;
    if actual != expected && actual != ArtifactType::Untyped {
      return Err(SdkError::user_argument(format!(
        "artifact `{}` is a {} artifact, not a {} artifact",
        self.name()?,
        actual,
        expected
      )));
    }
    Ok(wrap(self.into_handle()))
  }
}

impl BaseArtifact for Artifact {
  fn handle(&self) -> &ArtifactHandle {
    match self {
      Artifact::Table(a) => &a.0,
      Artifact::Numeric(a) => &a.0,
      Artifact::Bool(a) => &a.0,
      Artifact::Generic(a) => &a.0,
    }
  }
}

macro_rules! into_artifact {
  ($($variant:ident($ty:ident)),*) => {
    $(
      impl From<$ty> for Artifact {
        fn from(artifact: $ty) -> Self {
          Artifact::$variant(artifact)
        }
      }
    )*
  };
}

into_artifact!(
  Table(TableArtifact),
  Numeric(NumericArtifact),
  Bool(BoolArtifact),
  Generic(GenericArtifact)
);
