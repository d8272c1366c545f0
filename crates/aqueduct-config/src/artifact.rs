use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of an artifact in the DAG.
pub type ArtifactId = uuid::Uuid;

/// Pre-execution type of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
  Untyped,
  String,
  Bool,
  Numeric,
  Dict,
  Tuple,
  List,
  Table,
  Json,
  Bytes,
  Image,
  Picklable,
  TfKeras,
}

impl fmt::Display for ArtifactType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      ArtifactType::Untyped => "untyped",
      ArtifactType::String => "string",
      ArtifactType::Bool => "boolean",
      ArtifactType::Numeric => "numeric",
      ArtifactType::Dict => "dictionary",
      ArtifactType::Tuple => "tuple",
      ArtifactType::List => "list",
      ArtifactType::Table => "table",
      ArtifactType::Json => "json",
      ArtifactType::Bytes => "bytes",
      ArtifactType::Image => "image",
      ArtifactType::Picklable => "picklable",
      ArtifactType::TfKeras => "tensorflow-keras",
    };
    f.write_str(s)
  }
}

/// How an artifact value is encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializationType {
  String,
  Json,
  Bytes,
  Table,
  Image,
}

/// Metadata of one artifact node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
  pub id: ArtifactId,
  pub name: String,
  #[serde(rename = "type")]
  pub artifact_type: ArtifactType,
  /// Whether the user chose this name. Drives the publish-time collision policy.
  #[serde(default)]
  pub explicitly_named: bool,
  /// Whether the value was uploaded from the author's machine.
  #[serde(default)]
  pub from_local_data: bool,
}

impl ArtifactMetadata {
  pub fn new(id: ArtifactId, name: impl Into<String>, artifact_type: ArtifactType) -> Self {
    Self {
      id,
      name: name.into(),
      artifact_type,
      explicitly_named: false,
      from_local_data: false,
    }
  }

  pub fn explicitly_named(mut self, explicit: bool) -> Self {
    self.explicitly_named = explicit;
    self
  }
}
