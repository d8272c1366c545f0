use aqueduct_config::OperatorId;
use aqueduct_workflow::Dag;
use tracing::debug;

use crate::error::ClientError;

/// Size cap on the DAG JSON when any artifact carries local data.
pub const MAX_LOCAL_DATA_REQUEST_BYTES: usize = 32 * 1024 * 1024;

/// A DAG ready to be sent: the JSON body plus one packaged file per operator
/// with user code.
#[derive(Debug, Clone)]
pub struct DagPayload {
  pub dag_json: String,
  pub files: Vec<(OperatorId, Vec<u8>)>,
}

pub fn dag_payload(dag: &Dag) -> Result<DagPayload, ClientError> {
  let dag_json = serde_json::to_string(dag)?;
  check_size(dag, dag_json.len())?;

  let files: Vec<(OperatorId, Vec<u8>)> = dag
    .operators()
    .filter_map(|op| op.package().map(|package| (op.id, package.to_vec())))
    .collect();
  debug!(
    bytes = dag_json.len(),
    files = files.len(),
    "prepared dag payload"
  );

  Ok(DagPayload { dag_json, files })
}

fn check_size(dag: &Dag, size: usize) -> Result<(), ClientError> {
  let uses_local_data = dag.artifacts().any(|a| a.from_local_data);
  if uses_local_data && size > MAX_LOCAL_DATA_REQUEST_BYTES {
    return Err(ClientError::PayloadTooLarge {
      size,
      limit: MAX_LOCAL_DATA_REQUEST_BYTES,
    });
  }
  Ok(())
}
