//! An in-memory orchestration server for SDK tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use aqueduct_client::{
  ArtifactResult, ArtifactResultResponse, ClientError, DeleteWorkflowResponse, ExecState,
  ExecutionStatus, GetWorkflowResponse, Logs, OperatorResult, PreviewResponse,
  RegisterAirflowWorkflowResponse, RegisterWorkflowResponse, ResourceInfo, RunId,
  SavedObjectDeletion, SavedObjectSelection, ServerClient, WorkflowDagResultResponse,
  WorkflowEntry, WorkflowRun,
};
use aqueduct_config::{
  ArtifactId, FlowId, OperatorId, OperatorSpec, ParamSpec, ResourceId, Schedule, ServiceType,
};
use aqueduct_sdk::{
  ArtifactValue, ErrorKind, FunctionSource, OperatorFn, SDK_VERSION, SdkError, Table,
  WorkflowBuilder,
};
use aqueduct_workflow::{Dag, decode_param_spec, serialize_value};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

pub struct StoredRun {
  pub flow_id: FlowId,
  pub result: WorkflowDagResultResponse,
  pub values: HashMap<ArtifactId, ArtifactValue>,
}

#[derive(Default)]
pub struct ServerState {
  pub version: String,
  pub python_version: Option<String>,
  pub resources: Vec<ResourceInfo>,
  /// Values returned for operators, by operator name.
  pub outputs: HashMap<String, ArtifactValue>,
  /// Operators that fail, by name, with context and tip.
  pub failing: HashMap<String, (String, String)>,
  /// Saved objects whose deletion fails.
  pub undeletable: Vec<String>,
  pub previews: Vec<Dag>,
  pub registered: Vec<(Dag, bool)>,
  pub airflow_registered: Vec<Dag>,
  pub refreshed: Vec<(FlowId, BTreeMap<String, ParamSpec>)>,
  pub deleted: Vec<(FlowId, bool)>,
  pub workflows: BTreeMap<FlowId, GetWorkflowResponse>,
  pub runs: HashMap<RunId, StoredRun>,
}

/// Cloned handles share state, so tests keep one while the session owns another.
#[derive(Clone)]
pub struct MockServer {
  pub state: Rc<RefCell<ServerState>>,
}

fn resource(name: &str, service: ServiceType, connected: bool) -> ResourceInfo {
  ResourceInfo {
    id: Uuid::new_v4(),
    name: name.to_string(),
    service,
    created_at: Utc::now(),
    exec_state: if connected {
      ExecState::succeeded()
    } else {
      ExecState::failed("password authentication failed", "Update the credentials.")
    },
  }
}

pub fn reviews_table() -> Table {
  Table::new(
    vec!["id".to_string(), "review".to_string()],
    vec![
      vec![json!(1), json!("great stay")],
      vec![json!(2), json!("noisy")],
      vec![json!(3), json!("clean rooms")],
    ],
  )
}

/// max, min and mean over a numeric column; any other statistic is 1.0.
fn column_stat(stat: &str, column: &serde_json::Value, input: Option<&ArtifactValue>) -> ArtifactValue {
  let values: Vec<f64> = input
    .and_then(|v| v.as_table())
    .and_then(|table| {
      let idx = table.columns.iter().position(|c| Some(c.as_str()) == column.as_str())?;
      Some(table.rows.iter().filter_map(|row| row.get(idx)?.as_f64()).collect())
    })
    .unwrap_or_default();
  let result = match stat {
    "max" => values.iter().copied().fold(f64::MIN, f64::max),
    "min" => values.iter().copied().fold(f64::MAX, f64::min),
    "mean" if !values.is_empty() => values.iter().sum::<f64>() / values.len() as f64,
    _ => 1.0,
  };
  ArtifactValue::from(result)
}

impl MockServer {
  pub fn new() -> Self {
    let state = ServerState {
      version: SDK_VERSION.to_string(),
      resources: vec![
        resource("demo", ServiceType::Postgres, true),
        resource("warehouse", ServiceType::Snowflake, true),
        resource("lake", ServiceType::S3, true),
        resource("lambda", ServiceType::Lambda, true),
        resource("k8s", ServiceType::Kubernetes, true),
        resource("airflow", ServiceType::Airflow, true),
        resource("broken", ServiceType::Postgres, false),
      ],
      ..Default::default()
    };
    Self {
      state: Rc::new(RefCell::new(state)),
    }
  }

  pub fn session(&self) -> WorkflowBuilder {
    WorkflowBuilder::connect(Box::new(self.clone())).unwrap()
  }

  pub fn resource_id(&self, name: &str) -> ResourceId {
    self
      .state
      .borrow()
      .resources
      .iter()
      .find(|r| r.name == name)
      .map(|r| r.id)
      .unwrap()
  }

  pub fn set_output(&self, op_name: &str, value: ArtifactValue) {
    self.state.borrow_mut().outputs.insert(op_name.to_string(), value);
  }

  pub fn fail(&self, op_name: &str, context: &str, tip: &str) {
    self
      .state
      .borrow_mut()
      .failing
      .insert(op_name.to_string(), (context.to_string(), tip.to_string()));
  }

  pub fn preview_count(&self) -> usize {
    self.state.borrow().previews.len()
  }

  pub fn last_preview(&self) -> Dag {
    self.state.borrow().previews.last().cloned().unwrap()
  }

  pub fn last_registered(&self) -> Dag {
    self.state.borrow().registered.last().map(|(dag, _)| dag.clone()).unwrap()
  }

  pub fn add_flow(&self, name: &str, schedule: Schedule) -> FlowId {
    let id = Uuid::new_v4();
    let mut dag = Dag::new();
    dag.metadata.name = name.to_string();
    dag.metadata.schedule = schedule.clone();
    self.state.borrow_mut().workflows.insert(
      id,
      GetWorkflowResponse {
        id,
        name: name.to_string(),
        description: String::new(),
        schedule,
        runs: Vec::new(),
        dag,
      },
    );
    id
  }

  /// Record a run of a registered flow. `values` holds the artifacts it computed.
  pub fn add_run(
    &self,
    flow_id: FlowId,
    status: ExecutionStatus,
    values: HashMap<ArtifactId, ArtifactValue>,
  ) -> RunId {
    let mut state = self.state.borrow_mut();
    let flow = state.workflows.get_mut(&flow_id).unwrap();
    let run = WorkflowRun {
      id: Uuid::new_v4(),
      created_at: Utc::now(),
      status,
    };
    flow.runs.insert(0, run.clone());
    let artifact_statuses = flow
      .dag
      .artifacts()
      .map(|a| {
        let status = if values.contains_key(&a.id) {
          ExecutionStatus::Succeeded
        } else {
          ExecutionStatus::Canceled
        };
        (a.id, status)
      })
      .collect();
    let result = WorkflowDagResultResponse {
      id: run.id,
      status,
      created_at: run.created_at,
      dag: flow.dag.clone(),
      artifact_statuses,
    };
    state.runs.insert(
      run.id,
      StoredRun {
        flow_id,
        result,
        values,
      },
    );
    run.id
  }

  /// Compute every operator of `dag` whose inputs are available.
  fn evaluate(
    &self,
    dag: &Dag,
  ) -> (
    HashMap<OperatorId, OperatorResult>,
    HashMap<ArtifactId, ArtifactValue>,
  ) {
    let state = self.state.borrow();
    let mut results = HashMap::new();
    let mut values: HashMap<ArtifactId, ArtifactValue> = HashMap::new();
    let mut failed: HashSet<ArtifactId> = HashSet::new();
    let mut done: HashSet<OperatorId> = HashSet::new();

    let mut progress = true;
    while progress {
      progress = false;
      for op in dag.operators() {
        if done.contains(&op.id)
          || !op
            .inputs
            .iter()
            .all(|i| values.contains_key(i) || failed.contains(i))
        {
          continue;
        }
        done.insert(op.id);
        progress = true;

        if op.inputs.iter().any(|i| failed.contains(i)) {
          failed.extend(op.outputs.iter().copied());
          results.insert(
            op.id,
            OperatorResult {
              user_logs: None,
              exec_state: ExecState {
                status: ExecutionStatus::Canceled,
                error: None,
              },
            },
          );
          continue;
        }
        if let Some((context, tip)) = state.failing.get(&op.name) {
          failed.extend(op.outputs.iter().copied());
          results.insert(
            op.id,
            OperatorResult {
              user_logs: Some(Logs {
                stdout: String::new(),
                stderr: format!("Traceback: {}", context),
              }),
              exec_state: ExecState::failed(context.as_str(), tip.as_str()),
            },
          );
          continue;
        }

        let first_input = op.inputs.first().and_then(|i| values.get(i)).cloned();
        let value = match &op.spec {
          OperatorSpec::Param(spec) => {
            let artifact = dag.get_artifact(op.outputs[0]).unwrap();
            decode_param_spec(spec, artifact.artifact_type).unwrap()
          }
          OperatorSpec::Extract(_) => state
            .outputs
            .get(&op.name)
            .cloned()
            .unwrap_or_else(|| ArtifactValue::Table(reviews_table())),
          OperatorSpec::Function(_) => state
            .outputs
            .get(&op.name)
            .cloned()
            .or(first_input)
            .unwrap_or_else(|| ArtifactValue::Table(reviews_table())),
          OperatorSpec::Metric(function) => match state.outputs.get(&op.name) {
            Some(value) => value.clone(),
            None if function.builtin && function.entry_point == "number_of_rows" => {
              let rows = first_input
                .as_ref()
                .and_then(|v| v.as_table())
                .map(|t| t.num_rows())
                .unwrap_or(0);
              ArtifactValue::from(rows as i64)
            }
            None if function.builtin && function.args.contains_key("column") => {
              column_stat(&function.entry_point, &function.args["column"], first_input.as_ref())
            }
            None => ArtifactValue::from(1.0),
          },
          OperatorSpec::SystemMetric(_) => ArtifactValue::from(0.5),
          OperatorSpec::Check(_) => state
            .outputs
            .get(&op.name)
            .cloned()
            .unwrap_or(ArtifactValue::Bool(true)),
          OperatorSpec::Load(_) => ArtifactValue::Bool(true),
        };
        for output in &op.outputs {
          values.insert(*output, value.clone());
        }
        results.insert(
          op.id,
          OperatorResult {
            user_logs: None,
            exec_state: ExecState::succeeded(),
          },
        );
      }
    }
    (results, values)
  }

  fn register(&self, dag: &Dag) -> FlowId {
    let mut state = self.state.borrow_mut();
    let existing = state
      .workflows
      .values()
      .find(|w| w.name == dag.metadata.name)
      .map(|w| w.id);
    let id = existing.unwrap_or_else(Uuid::new_v4);
    state.workflows.insert(
      id,
      GetWorkflowResponse {
        id,
        name: dag.metadata.name.clone(),
        description: dag.metadata.description.clone(),
        schedule: dag.metadata.schedule.clone(),
        runs: Vec::new(),
        dag: dag.clone(),
      },
    );
    id
  }

  fn not_found(what: String) -> ClientError {
    ClientError::NotFound { message: what }
  }
}

impl ServerClient for MockServer {
  fn server_version(&self) -> Result<String, ClientError> {
    Ok(self.state.borrow().version.clone())
  }

  fn list_resources(&self) -> Result<Vec<ResourceInfo>, ClientError> {
    Ok(self.state.borrow().resources.clone())
  }

  fn list_tables(&self, resource_id: ResourceId) -> Result<Vec<String>, ClientError> {
    if !self.state.borrow().resources.iter().any(|r| r.id == resource_id) {
      return Err(Self::not_found(format!("resource {}", resource_id)));
    }
    Ok(vec!["hotel_reviews".to_string(), "customers".to_string()])
  }

  fn connect_resource(
    &self,
    name: &str,
    service: ServiceType,
    _config: &BTreeMap<String, String>,
  ) -> Result<(), ClientError> {
    self
      .state
      .borrow_mut()
      .resources
      .push(resource(name, service, true));
    Ok(())
  }

  fn delete_resource(&self, resource_id: ResourceId) -> Result<(), ClientError> {
    let mut state = self.state.borrow_mut();
    let before = state.resources.len();
    state.resources.retain(|r| r.id != resource_id);
    if state.resources.len() == before {
      return Err(Self::not_found(format!("resource {}", resource_id)));
    }
    Ok(())
  }

  fn preview(&self, dag: &Dag) -> Result<PreviewResponse, ClientError> {
    let (operator_results, values) = self.evaluate(dag);
    self.state.borrow_mut().previews.push(dag.clone());

    let failed = operator_results
      .values()
      .any(|r| r.exec_state.status == ExecutionStatus::Failed);
    let artifact_results = values
      .iter()
      .map(|(id, value)| {
        let serialized = serialize_value(value).unwrap();
        (
          *id,
          ArtifactResult::new(
            serialized.artifact_type,
            serialized.serialization_type,
            &serialized.bytes,
          ),
        )
      })
      .collect();
    Ok(PreviewResponse {
      status: if failed {
        ExecutionStatus::Failed
      } else {
        ExecutionStatus::Succeeded
      },
      operator_results,
      artifact_results,
    })
  }

  fn register_workflow(
    &self,
    dag: &Dag,
    run_now: bool,
  ) -> Result<RegisterWorkflowResponse, ClientError> {
    let id = self.register(dag);
    let mut state = self.state.borrow_mut();
    state.registered.push((dag.clone(), run_now));
    Ok(RegisterWorkflowResponse {
      id,
      python_version: state.python_version.clone(),
    })
  }

  fn register_airflow_workflow(
    &self,
    dag: &Dag,
  ) -> Result<RegisterAirflowWorkflowResponse, ClientError> {
    let id = self.register(dag);
    self.state.borrow_mut().airflow_registered.push(dag.clone());
    let file = format!("# airflow dag for {}\n", dag.metadata.name);
    Ok(RegisterAirflowWorkflowResponse {
      id,
      file: STANDARD.encode(file),
      is_update: false,
    })
  }

  fn refresh_workflow(
    &self,
    flow_id: FlowId,
    parameters: &BTreeMap<String, ParamSpec>,
  ) -> Result<(), ClientError> {
    let mut state = self.state.borrow_mut();
    if !state.workflows.contains_key(&flow_id) {
      return Err(Self::not_found(format!("flow {}", flow_id)));
    }
    state.refreshed.push((flow_id, parameters.clone()));
    Ok(())
  }

  fn delete_workflow(
    &self,
    flow_id: FlowId,
    saved_objects: &SavedObjectSelection,
    force: bool,
  ) -> Result<DeleteWorkflowResponse, ClientError> {
    let mut state = self.state.borrow_mut();
    if state.workflows.remove(&flow_id).is_none() {
      return Err(Self::not_found(format!("flow {}", flow_id)));
    }
    state.deleted.push((flow_id, force));

    let mut response = DeleteWorkflowResponse::default();
    for (resource_id, names) in saved_objects {
      let results = names
        .iter()
        .map(|name| SavedObjectDeletion {
          name: name.clone(),
          exec_state: if state.undeletable.contains(name) {
            ExecState::failed("table is locked", "")
          } else {
            ExecState::succeeded()
          },
        })
        .collect();
      response
        .saved_object_deletion_results
        .insert(*resource_id, results);
    }
    Ok(response)
  }

  fn list_workflows(&self) -> Result<Vec<WorkflowEntry>, ClientError> {
    Ok(
      self
        .state
        .borrow()
        .workflows
        .values()
        .map(|w| WorkflowEntry {
          id: w.id,
          name: w.name.clone(),
          description: w.description.clone(),
          created_at: Utc::now(),
          last_run_at: w.runs.first().map(|r| r.created_at),
          status: ExecutionStatus::Registered,
        })
        .collect(),
    )
  }

  fn get_workflow(&self, flow_id: FlowId) -> Result<GetWorkflowResponse, ClientError> {
    self
      .state
      .borrow()
      .workflows
      .get(&flow_id)
      .cloned()
      .ok_or_else(|| Self::not_found(format!("flow {}", flow_id)))
  }

  fn get_workflow_dag_result(
    &self,
    flow_id: FlowId,
    run_id: RunId,
  ) -> Result<WorkflowDagResultResponse, ClientError> {
    self
      .state
      .borrow()
      .runs
      .get(&run_id)
      .filter(|run| run.flow_id == flow_id)
      .map(|run| run.result.clone())
      .ok_or_else(|| Self::not_found(format!("run {}", run_id)))
  }

  fn get_artifact_result(
    &self,
    _flow_id: FlowId,
    run_id: RunId,
    artifact_id: ArtifactId,
  ) -> Result<ArtifactResultResponse, ClientError> {
    let state = self.state.borrow();
    let run = state
      .runs
      .get(&run_id)
      .ok_or_else(|| Self::not_found(format!("run {}", run_id)))?;
    Ok(match run.values.get(&artifact_id) {
      Some(value) => {
        let serialized = serialize_value(value).unwrap();
        ArtifactResultResponse {
          exec_state: ExecState::succeeded(),
          result: Some(ArtifactResult::new(
            serialized.artifact_type,
            serialized.serialization_type,
            &serialized.bytes,
          )),
        }
      }
      None => ArtifactResultResponse {
        exec_state: ExecState {
          status: ExecutionStatus::Canceled,
          error: None,
        },
        result: None,
      },
    })
  }
}

/// A plain function operator.
pub fn function(name: &str, params: &[&str]) -> OperatorFn {
  OperatorFn::function(
    name,
    params,
    FunctionSource::new(format!("{}:{}", name, name)).file(
      format!("{}.py", name),
      format!("def {}(*args):\n    return args[0]\n", name),
    ),
  )
}

/// The kind of error a call failed with. Panics if it succeeded.
pub fn error_kind<T>(result: Result<T, SdkError>) -> ErrorKind {
  match result {
    Ok(_) => panic!("expected an error"),
    Err(e) => e.kind(),
  }
}
