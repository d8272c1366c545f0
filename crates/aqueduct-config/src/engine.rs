use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ResourceId;

/// The engine an operator (or a whole flow) executes on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineConfig {
  #[default]
  Aqueduct,
  AqueductConda { resource_id: ResourceId },
  Airflow { resource_id: ResourceId },
  K8s { resource_id: ResourceId },
  Lambda { resource_id: ResourceId },
  Databricks { resource_id: ResourceId },
  Spark { resource_id: ResourceId },
}

impl EngineConfig {
  /// The connected compute resource backing this engine, if any.
  pub fn resource_id(&self) -> Option<ResourceId> {
    match self {
      EngineConfig::Aqueduct => None,
      EngineConfig::AqueductConda { resource_id }
      | EngineConfig::Airflow { resource_id }
      | EngineConfig::K8s { resource_id }
      | EngineConfig::Lambda { resource_id }
      | EngineConfig::Databricks { resource_id }
      | EngineConfig::Spark { resource_id } => Some(*resource_id),
    }
  }
}

impl fmt::Display for EngineConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      EngineConfig::Aqueduct => "Aqueduct",
      EngineConfig::AqueductConda { .. } => "Aqueduct (Conda)",
      EngineConfig::Airflow { .. } => "Airflow",
      EngineConfig::K8s { .. } => "Kubernetes",
      EngineConfig::Lambda { .. } => "Lambda",
      EngineConfig::Databricks { .. } => "Databricks",
      EngineConfig::Spark { .. } => "Spark",
    };
    f.write_str(s)
  }
}

/// Compute resources requested by a single operator.
///
/// Which fields are allowed depends on the engine the operator runs on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub num_cpus: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub memory_mb: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub gpu_resource_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cuda_version: Option<String>,
}

impl ResourceRequest {
  pub fn is_empty(&self) -> bool {
    self.num_cpus.is_none()
      && self.memory_mb.is_none()
      && self.gpu_resource_name.is_none()
      && self.cuda_version.is_none()
  }
}
