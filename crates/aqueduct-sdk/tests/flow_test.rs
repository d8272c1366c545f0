//! Published flows: listing, triggering, runs and deletion.

mod common;

use std::collections::{BTreeMap, HashMap};

use aqueduct_client::{ExecutionStatus, SavedObjectSelection};
use aqueduct_sdk::{
  Artifact, ArtifactValue, BaseArtifact, ErrorKind, Flow, PublishRequest, WorkflowBuilder,
};
use common::{MockServer, error_kind, function, reviews_table};

/// Publish `reviews_query -> clean` with the query table chosen by a parameter.
fn publish(server: &MockServer, builder: &WorkflowBuilder) -> Flow {
  builder
    .create_param("table_name", Some(ArtifactValue::from("hotel_reviews")), "")
    .unwrap();
  let reviews = builder
    .resource("demo")
    .unwrap()
    .as_relational()
    .unwrap()
    .sql("select * from {{ table_name }}", None, Some("reviews"))
    .unwrap();
  let clean = builder
    .call_single(
      &function("clean", &["df"]).outputs(["cleaned"]),
      vec![Artifact::from(reviews).into()],
    )
    .unwrap();
  let flow = builder
    .publish_flow(PublishRequest::new("hotel", vec![clean]))
    .unwrap();
  assert_eq!(server.state.borrow().registered.len(), 1);
  flow
}

#[test]
fn test_list_and_describe_flows() {
  let server = MockServer::new();
  let builder = server.session();
  let flow = publish(&server, &builder);

  let flows = builder.list_flows().unwrap();
  assert_eq!(flows.len(), 1);
  assert_eq!(flows[0].id, flow.id());

  let description = builder.flow(flow.id()).unwrap().describe().unwrap();
  assert!(description.contains("Flow: hotel"));
  assert!(description.contains("  clean ("));

  assert_eq!(
    error_kind(builder.flow(uuid::Uuid::new_v4())),
    ErrorKind::ResourceNotFound
  );
}

#[test]
fn test_trigger_with_parameters() {
  let server = MockServer::new();
  let builder = server.session();
  let flow = publish(&server, &builder);

  flow.trigger(BTreeMap::new()).unwrap();
  let mut parameters = BTreeMap::new();
  parameters.insert("table_name".to_string(), ArtifactValue::from("customers"));
  flow.trigger(parameters).unwrap();

  let state = server.state.borrow();
  assert_eq!(state.refreshed.len(), 2);
  assert!(state.refreshed[0].1.is_empty());
  assert!(state.refreshed[1].1.contains_key("table_name"));
}

#[test]
fn test_trigger_validates_parameters() {
  let server = MockServer::new();
  let builder = server.session();
  let flow = publish(&server, &builder);

  let mut parameters = BTreeMap::new();
  parameters.insert("table_name".to_string(), ArtifactValue::from(1234));
  assert_eq!(error_kind(flow.trigger(parameters)), ErrorKind::UserArgument);

  let mut parameters = BTreeMap::new();
  parameters.insert("unknown".to_string(), ArtifactValue::from("x"));
  assert_eq!(error_kind(flow.trigger(parameters)), ErrorKind::UserArgument);

  assert!(server.state.borrow().refreshed.is_empty());
  assert_eq!(
    error_kind(builder.trigger(uuid::Uuid::new_v4(), BTreeMap::new())),
    ErrorKind::ResourceNotFound
  );
}

#[test]
fn test_flow_run_artifacts() {
  let server = MockServer::new();
  let builder = server.session();
  let flow = publish(&server, &builder);
  assert!(flow.latest().unwrap().is_none());

  let dag = server.last_registered();
  let cleaned = dag.get_artifact_by_name("cleaned").unwrap().id;
  let mut values = HashMap::new();
  values.insert(cleaned, ArtifactValue::Table(reviews_table()));
  let run_id = server.add_run(flow.id(), ExecutionStatus::Succeeded, values);

  let run = flow.latest().unwrap().unwrap();
  assert_eq!(run.id(), run_id);
  assert_eq!(run.status(), ExecutionStatus::Succeeded);
  assert_eq!(flow.list_runs().unwrap().len(), 1);

  let artifact = run.artifact("cleaned").unwrap().unwrap();
  assert!(artifact.from_flow_run());
  assert_eq!(artifact.get().unwrap(), ArtifactValue::Table(reviews_table()));
  assert!(artifact.describe().unwrap().contains("Source: flow run"));
  assert!(run.artifact("missing").unwrap().is_none());

  // The extract output was never recorded for this run.
  let reviews = run.artifact("reviews").unwrap().unwrap();
  assert_eq!(error_kind(reviews.get()), ErrorKind::ArtifactNeverComputed);
}

#[test]
fn test_flow_run_artifacts_are_read_only() {
  let server = MockServer::new();
  let builder = server.session();
  let flow = publish(&server, &builder);
  let dag = server.last_registered();
  let cleaned = dag.get_artifact_by_name("cleaned").unwrap().id;
  let mut values = HashMap::new();
  values.insert(cleaned, ArtifactValue::Table(reviews_table()));
  let run_id = server.add_run(flow.id(), ExecutionStatus::Succeeded, values);

  let artifact = flow.fetch(run_id).unwrap().artifact("cleaned").unwrap().unwrap();

  let mut parameters = BTreeMap::new();
  parameters.insert("table_name".to_string(), ArtifactValue::from("customers"));
  assert_eq!(
    error_kind(artifact.get_with_parameters(parameters)),
    ErrorKind::UserArgument
  );
  assert_eq!(
    error_kind(builder.call_single(&function("again", &["df"]), vec![artifact.clone().into()])),
    ErrorKind::UserArgument
  );
  assert_eq!(error_kind(artifact.set_name("renamed")), ErrorKind::UserArgument);

  assert_eq!(
    error_kind(flow.fetch(uuid::Uuid::new_v4())),
    ErrorKind::ResourceNotFound
  );
}

#[test]
fn test_failed_run_has_no_values() {
  let server = MockServer::new();
  let builder = server.session();
  let flow = publish(&server, &builder);
  let dag = server.last_registered();
  let cleaned = dag.get_artifact_by_name("cleaned").unwrap().id;
  let mut values = HashMap::new();
  values.insert(cleaned, ArtifactValue::Table(reviews_table()));
  let run_id = server.add_run(flow.id(), ExecutionStatus::Failed, values);

  let run = flow.fetch(run_id).unwrap();
  assert!(run.describe().contains("Status: failed"));
  let artifact = run.artifact("cleaned").unwrap().unwrap();
  assert!(artifact.get().is_ok());

  let reviews = run.artifact("reviews").unwrap().unwrap();
  assert_eq!(error_kind(reviews.get()), ErrorKind::ArtifactNeverComputed);
}

#[test]
fn test_delete_flow() {
  let server = MockServer::new();
  let builder = server.session();
  let flow = publish(&server, &builder);
  let demo = server.resource_id("demo");
  server
    .state
    .borrow_mut()
    .undeletable
    .push("reviews_copy".to_string());

  let mut saved = SavedObjectSelection::new();
  saved.insert(demo, vec!["reviews_copy".to_string()]);
  let response = builder.delete_flow(flow.id(), &saved, true).unwrap();
  assert_eq!(response.saved_object_deletion_results[&demo].len(), 1);
  assert!(builder.list_flows().unwrap().is_empty());

  assert_eq!(
    error_kind(builder.delete_flow(flow.id(), &saved, true)),
    ErrorKind::ResourceNotFound
  );
}

#[test]
fn test_delete_flow_fails_on_saved_object_errors() {
  let server = MockServer::new();
  let builder = server.session();
  let flow = publish(&server, &builder);
  let demo = server.resource_id("demo");
  server
    .state
    .borrow_mut()
    .undeletable
    .push("reviews_copy".to_string());

  let mut saved = SavedObjectSelection::new();
  saved.insert(demo, vec!["reviews_copy".to_string()]);
  assert_eq!(
    error_kind(builder.delete_flow(flow.id(), &saved, false)),
    ErrorKind::Server
  );
  assert_eq!(server.state.borrow().deleted, vec![(flow.id(), false)]);
}
