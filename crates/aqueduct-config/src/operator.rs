use std::fmt;

use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactId, ArtifactType, SerializationType};
use crate::engine::{EngineConfig, ResourceRequest};
use crate::service::ServiceType;
use crate::ResourceId;

/// Identifier of an operator in the DAG.
pub type OperatorId = uuid::Uuid;

/// The kind of computation an operator performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
  Extract,
  Load,
  Function,
  Metric,
  Check,
  Param,
  SystemMetric,
}

impl fmt::Display for OperatorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      OperatorKind::Extract => "extract",
      OperatorKind::Load => "load",
      OperatorKind::Function => "function",
      OperatorKind::Metric => "metric",
      OperatorKind::Check => "check",
      OperatorKind::Param => "parameter",
      OperatorKind::SystemMetric => "system metric",
    };
    f.write_str(s)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckSeverity {
  Warning,
  Error,
}

/// A serialized parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
  /// Base64 of the serialized bytes.
  pub val: String,
  pub serialization_type: SerializationType,
  #[serde(default)]
  pub implicitly_created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum S3Format {
  Csv,
  Json,
  Parquet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
  Append,
  Replace,
  Fail,
}

/// Service-specific description of what an extract reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractParams {
  /// A query template; `{{ name }}` placeholders are filled from parameter inputs.
  Relational { query: String },
  S3 {
    filepath: String,
    artifact_type: ArtifactType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    format: Option<S3Format>,
  },
  Generic { config: serde_json::Value },
}

impl ExtractParams {
  /// The templated text whose placeholders are substituted from parameters.
  pub fn template(&self) -> Option<&str> {
    match self {
      ExtractParams::Relational { query } => Some(query),
      ExtractParams::S3 { filepath, .. } => Some(filepath),
      ExtractParams::Generic { .. } => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractSpec {
  pub resource_id: ResourceId,
  pub service: ServiceType,
  pub params: ExtractParams,
}

/// Service-specific description of where a load writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadParams {
  Relational { table: String, update_mode: UpdateMode },
  S3 {
    filepath: String,
    /// Left to the server when unset; non-table artifacts carry their own encoding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    format: Option<S3Format>,
  },
  Generic { config: serde_json::Value },
}

impl LoadParams {
  /// The destination identifier, which may contain parameter placeholders.
  pub fn destination(&self) -> Option<&str> {
    match self {
      LoadParams::Relational { table, .. } => Some(table),
      LoadParams::S3 { filepath, .. } => Some(filepath),
      LoadParams::Generic { .. } => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadSpec {
  pub resource_id: ResourceId,
  pub service: ServiceType,
  pub params: LoadParams,
}

/// Descriptor of a user function or a server built-in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
  /// `module:function` inside the package, or the name of a built-in.
  pub entry_point: String,
  #[serde(default)]
  pub builtin: bool,
  #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
  pub args: serde_json::Map<String, serde_json::Value>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub requirements: Vec<String>,
  /// Packaged source. Sent as a multipart attachment, never inside the JSON body.
  #[serde(skip)]
  pub package: Vec<u8>,
}

impl FunctionSpec {
  pub fn builtin(name: impl Into<String>) -> Self {
    Self {
      entry_point: name.into(),
      builtin: true,
      ..Default::default()
    }
  }

  pub fn with_arg(mut self, key: &str, value: serde_json::Value) -> Self {
    self.args.insert(key.to_string(), value);
    self
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckSpec {
  pub function: FunctionSpec,
  pub level: CheckSeverity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMetricSpec {
  pub metric_name: String,
}

/// Kind-tagged operator payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperatorSpec {
  Extract(ExtractSpec),
  Load(LoadSpec),
  Function(FunctionSpec),
  Metric(FunctionSpec),
  Check(CheckSpec),
  Param(ParamSpec),
  SystemMetric(SystemMetricSpec),
}

impl OperatorSpec {
  pub fn kind(&self) -> OperatorKind {
    match self {
      OperatorSpec::Extract(_) => OperatorKind::Extract,
      OperatorSpec::Load(_) => OperatorKind::Load,
      OperatorSpec::Function(_) => OperatorKind::Function,
      OperatorSpec::Metric(_) => OperatorKind::Metric,
      OperatorSpec::Check(_) => OperatorKind::Check,
      OperatorSpec::Param(_) => OperatorKind::Param,
      OperatorSpec::SystemMetric(_) => OperatorKind::SystemMetric,
    }
  }

  /// The function descriptor of function-like operators.
  pub fn function(&self) -> Option<&FunctionSpec> {
    match self {
      OperatorSpec::Function(f) | OperatorSpec::Metric(f) => Some(f),
      OperatorSpec::Check(c) => Some(&c.function),
      _ => None,
    }
  }

  pub fn param(&self) -> Option<&ParamSpec> {
    match self {
      OperatorSpec::Param(p) => Some(p),
      _ => None,
    }
  }
}

/// One node of computation in the DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operator {
  pub id: OperatorId,
  pub name: String,
  #[serde(default)]
  pub description: String,
  pub spec: OperatorSpec,
  #[serde(default)]
  pub inputs: Vec<ArtifactId>,
  #[serde(default)]
  pub outputs: Vec<ArtifactId>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub resources: Option<ResourceRequest>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub engine_override: Option<EngineConfig>,
}

impl Operator {
  pub fn new(id: OperatorId, name: impl Into<String>, spec: OperatorSpec) -> Self {
    Self {
      id,
      name: name.into(),
      description: String::new(),
      spec,
      inputs: Vec::new(),
      outputs: Vec::new(),
      resources: None,
      engine_override: None,
    }
  }

  pub fn kind(&self) -> OperatorKind {
    self.spec.kind()
  }

  /// Whether this is a parameter the SDK synthesized from a literal argument.
  pub fn is_implicit_param(&self) -> bool {
    self.spec.param().is_some_and(|p| p.implicitly_created)
  }

  /// The packaged source of this operator, if it has one to upload.
  pub fn package(&self) -> Option<&[u8]> {
    self
      .spec
      .function()
      .filter(|f| !f.builtin && !f.package.is_empty())
      .map(|f| f.package.as_slice())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use uuid::Uuid;

  #[test]
  fn test_operator_spec_is_kind_tagged() {
    let op = Operator::new(
      Uuid::new_v4(),
      "table_name",
      OperatorSpec::Param(ParamSpec {
        val: "ImhvdGVsX3Jldmlld3Mi".to_string(),
        serialization_type: SerializationType::Json,
        implicitly_created: false,
      }),
    );
    let json = serde_json::to_value(&op).unwrap();
    assert_eq!(json["spec"]["type"], "param");
    assert_eq!(json["spec"]["serialization_type"], "json");

    let back: Operator = serde_json::from_value(json).unwrap();
    assert_eq!(back, op);
    assert_eq!(back.kind(), OperatorKind::Param);
  }

  #[test]
  fn test_package_is_not_serialized() {
    let spec = FunctionSpec {
      entry_point: "model:predict".to_string(),
      package: vec![1, 2, 3],
      ..Default::default()
    };
    let op = Operator::new(Uuid::new_v4(), "predict", OperatorSpec::Function(spec));
    let json = serde_json::to_string(&op).unwrap();
    assert!(!json.contains("package"));
    assert_eq!(op.package(), Some(&[1u8, 2, 3][..]));
  }

  #[test]
  fn test_builtin_function_has_no_package() {
    let spec = FunctionSpec::builtin("number_of_rows");
    let op = Operator::new(Uuid::new_v4(), "rows", OperatorSpec::Metric(spec));
    assert_eq!(op.package(), None);
    assert!(op.spec.function().unwrap().builtin);
  }

  #[test]
  fn test_extract_template() {
    let params = ExtractParams::Relational {
      query: "select * from {{ table_name }}".to_string(),
    };
    assert_eq!(params.template(), Some("select * from {{ table_name }}"));
    let generic = ExtractParams::Generic {
      config: serde_json::json!({ "collection": "reviews" }),
    };
    assert_eq!(generic.template(), None);
  }
}
