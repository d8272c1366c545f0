//! Per-engine validation of operator resource requests.

use aqueduct_config::{EngineConfig, Operator, ResourceRequest};
use tracing::warn;

use crate::dag::Dag;
use crate::error::WorkflowError;

pub const LAMBDA_MIN_MEMORY_MB: u64 = 128;
pub const LAMBDA_MAX_MEMORY_MB: u64 = 10240;

/// Which resource fields an engine accepts.
struct Allowed {
  num_cpus: bool,
  memory: bool,
  gpu: bool,
}

impl Allowed {
  const NONE: Allowed = Allowed {
    num_cpus: false,
    memory: false,
    gpu: false,
  };

  fn for_engine(engine: &EngineConfig) -> Allowed {
    match engine {
      EngineConfig::K8s { .. } => Allowed {
        num_cpus: true,
        memory: true,
        gpu: true,
      },
      EngineConfig::Lambda { .. } => Allowed {
        memory: true,
        ..Allowed::NONE
      },
      _ => Allowed::NONE,
    }
  }
}

/// Check every operator's resource request against the engine it runs on.
///
/// An operator runs on its `engine_override` if set, else on the DAG's
/// engine, else on the built-in Aqueduct engine.
pub fn validate_engine_resources(dag: &Dag) -> Result<(), WorkflowError> {
  let default_engine = dag.engine_config.clone().unwrap_or_default();
  for op in dag.operators() {
    let Some(resources) = &op.resources else {
      continue;
    };
    let engine = op.engine_override.as_ref().unwrap_or(&default_engine);
    validate_request(op, resources, engine)?;
  }
  Ok(())
}

fn validate_request(
  op: &Operator,
  resources: &ResourceRequest,
  engine: &EngineConfig,
) -> Result<(), WorkflowError> {
  let allowed = Allowed::for_engine(engine);
  let forbidden = |field: &str| {
    WorkflowError::user_argument(format!(
      "operator `{}` requests `{}`, which is not supported on the {} engine",
      op.name, field, engine
    ))
  };

  if resources.num_cpus.is_some() && !allowed.num_cpus {
    return Err(forbidden("num_cpus"));
  }
  if resources.gpu_resource_name.is_some() && !allowed.gpu {
    return Err(forbidden("gpu_resource_name"));
  }
  if resources.cuda_version.is_some() {
    if !allowed.gpu {
      return Err(forbidden("cuda_version"));
    }
    if resources.gpu_resource_name.is_none() {
      return Err(WorkflowError::user_argument(format!(
        "operator `{}` sets `cuda_version` without requesting a gpu",
        op.name
      )));
    }
  }

  if let Some(memory) = resources.memory_mb {
    if !allowed.memory {
      return Err(forbidden("memory"));
    }
    if let EngineConfig::Lambda { .. } = engine {
      if !(LAMBDA_MIN_MEMORY_MB..=LAMBDA_MAX_MEMORY_MB).contains(&memory) {
        return Err(WorkflowError::user_argument(format!(
          "operator `{}` requests {}MB of memory; Lambda supports {}MB to {}MB",
          op.name, memory, LAMBDA_MIN_MEMORY_MB, LAMBDA_MAX_MEMORY_MB
        )));
      }
      warn!(
        operator = %op.name,
        memory_mb = memory,
        "custom Lambda memory adds about a minute of cold-start time to this operator"
      );
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use aqueduct_config::{OperatorSpec, ResourceId};
  use uuid::Uuid;

  use crate::test_support::add_function;

  fn dag_with(
    engine: EngineConfig,
    resources: ResourceRequest,
    engine_override: Option<EngineConfig>,
  ) -> Dag {
    let mut op = Operator::new(
      Uuid::new_v4(),
      "train",
      OperatorSpec::Function(Default::default()),
    );
    op.resources = Some(resources);
    op.engine_override = engine_override;
    let mut dag = Dag::new();
    dag.add_operator(op);
    dag.engine_config = Some(engine);
    dag
  }

  fn dag_with_request(engine: EngineConfig, resources: ResourceRequest) -> Dag {
    dag_with(engine, resources, None)
  }

  fn lambda() -> EngineConfig {
    EngineConfig::Lambda {
      resource_id: ResourceId::new_v4(),
    }
  }

  fn k8s() -> EngineConfig {
    EngineConfig::K8s {
      resource_id: ResourceId::new_v4(),
    }
  }

  fn memory(mb: u64) -> ResourceRequest {
    ResourceRequest {
      memory_mb: Some(mb),
      ..Default::default()
    }
  }

  #[test]
  fn test_lambda_memory_bounds() {
    for (mb, ok) in [(127, false), (128, true), (10240, true), (10241, false)] {
      let result = validate_engine_resources(&dag_with_request(lambda(), memory(mb)));
      assert_eq!(result.is_ok(), ok, "memory {}", mb);
    }
  }

  #[test]
  fn test_lambda_rejects_cpus_and_gpus() {
    let cpus = ResourceRequest {
      num_cpus: Some(2),
      ..Default::default()
    };
    assert!(matches!(
      validate_engine_resources(&dag_with_request(lambda(), cpus)),
      Err(WorkflowError::UserArgument { .. })
    ));

    let gpu = ResourceRequest {
      gpu_resource_name: Some("nvidia.com/gpu".to_string()),
      ..Default::default()
    };
    assert!(validate_engine_resources(&dag_with_request(lambda(), gpu)).is_err());
  }

  #[test]
  fn test_k8s_accepts_everything() {
    let request = ResourceRequest {
      num_cpus: Some(4),
      memory_mb: Some(100_000),
      gpu_resource_name: Some("nvidia.com/gpu".to_string()),
      cuda_version: Some("11.4.2".to_string()),
    };
    assert!(validate_engine_resources(&dag_with_request(k8s(), request)).is_ok());
  }

  #[test]
  fn test_cuda_requires_gpu() {
    let request = ResourceRequest {
      cuda_version: Some("11.4.2".to_string()),
      ..Default::default()
    };
    assert!(validate_engine_resources(&dag_with_request(k8s(), request)).is_err());
  }

  #[test]
  fn test_default_engines_reject_requests() {
    let airflow = EngineConfig::Airflow {
      resource_id: ResourceId::new_v4(),
    };
    for engine in [EngineConfig::Aqueduct, airflow] {
      assert!(validate_engine_resources(&dag_with_request(engine, memory(512))).is_err());
    }
  }

  #[test]
  fn test_override_is_validated() {
    assert!(validate_engine_resources(&dag_with(k8s(), memory(100), None)).is_ok());
    assert!(validate_engine_resources(&dag_with(k8s(), memory(100), Some(lambda()))).is_err());
    assert!(
      validate_engine_resources(&dag_with(EngineConfig::Aqueduct, memory(512), Some(lambda())))
        .is_ok()
    );
  }

  #[test]
  fn test_operators_without_requests_pass() {
    let mut dag = Dag::new();
    add_function(&mut dag, "train", &[]);
    dag.engine_config = Some(lambda());
    assert!(validate_engine_resources(&dag).is_ok());
  }
}
