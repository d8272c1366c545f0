use aqueduct_config::ArtifactType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// A column-oriented table with JSON cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
  pub columns: Vec<String>,
  #[serde(rename = "data")]
  pub rows: Vec<Vec<Value>>,
}

impl Table {
  pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
    Self { columns, rows }
  }

  pub fn num_rows(&self) -> usize {
    self.rows.len()
  }

  /// The cells of one column, top to bottom.
  pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
    let index = self.columns.iter().position(|c| c == name)?;
    Some(self.rows.iter().filter_map(|row| row.get(index)).collect())
  }

  /// The first `n` rows.
  pub fn head(&self, n: usize) -> Table {
    Table {
      columns: self.columns.clone(),
      rows: self.rows.iter().take(n).cloned().collect(),
    }
  }
}

/// The content of an artifact once computed, or the value of a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactValue {
  String(String),
  Bool(bool),
  Numeric(Number),
  Bytes(Vec<u8>),
  List(Vec<Value>),
  Tuple(Vec<Value>),
  Dict(Map<String, Value>),
  Json(Value),
  Table(Table),
  Image(Vec<u8>),
}

impl ArtifactValue {
  /// The artifact type this value is published as.
  pub fn artifact_type(&self) -> ArtifactType {
    match self {
      ArtifactValue::String(_) => ArtifactType::String,
      ArtifactValue::Bool(_) => ArtifactType::Bool,
      ArtifactValue::Numeric(_) => ArtifactType::Numeric,
      ArtifactValue::Bytes(_) => ArtifactType::Bytes,
      ArtifactValue::List(_) => ArtifactType::List,
      ArtifactValue::Tuple(_) => ArtifactType::Tuple,
      ArtifactValue::Dict(_) => ArtifactType::Dict,
      ArtifactValue::Json(_) => ArtifactType::Json,
      ArtifactValue::Table(_) => ArtifactType::Table,
      ArtifactValue::Image(_) => ArtifactType::Image,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      ArtifactValue::String(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      ArtifactValue::Bool(b) => Some(*b),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      ArtifactValue::Numeric(n) => n.as_f64(),
      _ => None,
    }
  }

  pub fn as_table(&self) -> Option<&Table> {
    match self {
      ArtifactValue::Table(t) => Some(t),
      _ => None,
    }
  }

  /// Parse a value from JSON text, mapping scalars and containers to their
  /// natural variant. Arrays become lists.
  pub fn from_json(value: Value) -> Self {
    match value {
      Value::String(s) => ArtifactValue::String(s),
      Value::Bool(b) => ArtifactValue::Bool(b),
      Value::Number(n) => ArtifactValue::Numeric(n),
      Value::Array(items) => ArtifactValue::List(items),
      Value::Object(map) => ArtifactValue::Dict(map),
      Value::Null => ArtifactValue::Json(Value::Null),
    }
  }
}

impl From<&str> for ArtifactValue {
  fn from(value: &str) -> Self {
    ArtifactValue::String(value.to_string())
  }
}

impl From<String> for ArtifactValue {
  fn from(value: String) -> Self {
    ArtifactValue::String(value)
  }
}

impl From<bool> for ArtifactValue {
  fn from(value: bool) -> Self {
    ArtifactValue::Bool(value)
  }
}

impl From<i64> for ArtifactValue {
  fn from(value: i64) -> Self {
    ArtifactValue::Numeric(value.into())
  }
}

impl From<i32> for ArtifactValue {
  fn from(value: i32) -> Self {
    ArtifactValue::Numeric(value.into())
  }
}

impl From<u64> for ArtifactValue {
  fn from(value: u64) -> Self {
    ArtifactValue::Numeric(value.into())
  }
}

/// Non-finite floats have no JSON representation and become `Json(null)`.
impl From<f64> for ArtifactValue {
  fn from(value: f64) -> Self {
    Number::from_f64(value)
      .map(ArtifactValue::Numeric)
      .unwrap_or(ArtifactValue::Json(Value::Null))
  }
}

impl From<Table> for ArtifactValue {
  fn from(value: Table) -> Self {
    ArtifactValue::Table(value)
  }
}

impl From<Vec<u8>> for ArtifactValue {
  fn from(value: Vec<u8>) -> Self {
    ArtifactValue::Bytes(value)
  }
}
