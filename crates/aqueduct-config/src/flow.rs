use serde::{Deserialize, Serialize};

use crate::FlowId;

/// What starts a run of a published flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
  Manual,
  Periodic,
  Cascade,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
  pub trigger: TriggerType,
  #[serde(default)]
  pub cron_schedule: String,
  /// For cascading flows, the flow whose completion triggers this one.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source_id: Option<FlowId>,
  #[serde(default)]
  pub disable_manual_trigger: bool,
}

impl Schedule {
  pub fn manual() -> Self {
    Self {
      trigger: TriggerType::Manual,
      cron_schedule: String::new(),
      source_id: None,
      disable_manual_trigger: false,
    }
  }

  pub fn periodic(cron: impl Into<String>) -> Self {
    Self {
      trigger: TriggerType::Periodic,
      cron_schedule: cron.into(),
      ..Self::manual()
    }
  }

  pub fn cascade(source_id: FlowId) -> Self {
    Self {
      trigger: TriggerType::Cascade,
      source_id: Some(source_id),
      ..Self::manual()
    }
  }
}

impl Default for Schedule {
  fn default() -> Self {
    Self::manual()
  }
}

/// How many past runs the server keeps. Negative means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
  pub k_latest_runs: i64,
}

impl Default for RetentionPolicy {
  fn default() -> Self {
    Self { k_latest_runs: -1 }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowMetadata {
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub schedule: Schedule,
  #[serde(default)]
  pub retention_policy: RetentionPolicy,
}
