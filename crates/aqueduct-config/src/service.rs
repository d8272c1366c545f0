use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::EngineConfig;
use crate::ResourceId;

/// The service behind a connected resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceType {
  Postgres,
  Snowflake,
  #[serde(rename = "MySQL")]
  MySql,
  Redshift,
  BigQuery,
  MariaDB,
  #[serde(rename = "SQL Server")]
  SqlServer,
  #[serde(rename = "SQLite")]
  Sqlite,
  #[serde(rename = "AWS Athena")]
  Athena,
  S3,
  #[serde(rename = "GCS")]
  Gcs,
  MongoDB,
  #[serde(rename = "Google Sheets")]
  GoogleSheets,
  Salesforce,
  Airflow,
  Kubernetes,
  Lambda,
  Databricks,
  Spark,
  Conda,
  Aqueduct,
}

impl ServiceType {
  /// Services that read and write tables with SQL.
  pub fn is_relational(&self) -> bool {
    matches!(
      self,
      ServiceType::Postgres
        | ServiceType::Snowflake
        | ServiceType::MySql
        | ServiceType::Redshift
        | ServiceType::BigQuery
        | ServiceType::MariaDB
        | ServiceType::SqlServer
        | ServiceType::Sqlite
        | ServiceType::Athena
    )
  }

  /// The engine configuration for a compute resource of this service.
  ///
  /// Returns `None` for data-only services.
  pub fn engine_config(&self, resource_id: ResourceId) -> Option<EngineConfig> {
    match self {
      ServiceType::Aqueduct => Some(EngineConfig::Aqueduct),
      ServiceType::Conda => Some(EngineConfig::AqueductConda { resource_id }),
      ServiceType::Airflow => Some(EngineConfig::Airflow { resource_id }),
      ServiceType::Kubernetes => Some(EngineConfig::K8s { resource_id }),
      ServiceType::Lambda => Some(EngineConfig::Lambda { resource_id }),
      ServiceType::Databricks => Some(EngineConfig::Databricks { resource_id }),
      ServiceType::Spark => Some(EngineConfig::Spark { resource_id }),
      _ => None,
    }
  }
}

impl fmt::Display for ServiceType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    // The wire name doubles as the display name.
    match serde_json::to_value(self) {
      Ok(serde_json::Value::String(s)) => f.write_str(&s),
      _ => write!(f, "{:?}", self),
    }
  }
}
