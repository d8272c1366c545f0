//! Connected resources: extracting data from them and saving artifacts to them.

use std::collections::{BTreeMap, BTreeSet};

use aqueduct_client::ResourceInfo;
use aqueduct_config::{
  ArtifactId, ArtifactMetadata, ArtifactType, ExtractParams, ExtractSpec, LoadParams, LoadSpec,
  Operator, OperatorKind, OperatorSpec, ResourceId, S3Format, ServiceType, UpdateMode,
};
use aqueduct_workflow::naming::{default_artifact_name_from_op, new_id, sanitize_artifact_name};
use aqueduct_workflow::{AddOperatorDelta, AddOrReplaceOperatorDelta, Dag, placeholders};

use crate::artifact::{Artifact, BaseArtifact, TableArtifact};
use crate::context::WorkflowBuilder;
use crate::error::SdkError;
use crate::operator::ExecutionMode;

impl WorkflowBuilder {
  /// Connected resources by name.
  pub fn connected_resources(&self) -> Result<BTreeMap<String, ResourceInfo>, SdkError> {
    Ok(
      self
        .client()
        .list_resources()?
        .into_iter()
        .map(|r| (r.name.clone(), r))
        .collect(),
    )
  }

  /// A handle to a connected resource.
  pub fn resource(&self, name: &str) -> Result<Resource, SdkError> {
    Ok(Resource {
      builder: self.clone(),
      info: self.connected_resource(name)?,
      mode: ExecutionMode::Eager,
    })
  }

  pub fn connect_resource(
    &self,
    name: &str,
    service: ServiceType,
    config: &BTreeMap<String, String>,
  ) -> Result<(), SdkError> {
    if self.connected_resources()?.contains_key(name) {
      return Err(SdkError::user_argument(format!(
        "a resource named `{}` already exists",
        name
      )));
    }
    self.client().connect_resource(name, service, config)?;
    Ok(())
  }

  pub fn delete_resource(&self, name: &str) -> Result<(), SdkError> {
    let resource = self.find_resource(name)?;
    self.client().delete_resource(resource.id)?;
    Ok(())
  }

  fn find_resource(&self, name: &str) -> Result<ResourceInfo, SdkError> {
    self
      .connected_resources()?
      .remove(name)
      .ok_or_else(|| SdkError::ResourceNotFound {
        name: name.to_string(),
      })
  }

  /// A resource by name whose connection the server validated.
  pub(crate) fn connected_resource(&self, name: &str) -> Result<ResourceInfo, SdkError> {
    let resource = self.find_resource(name)?;
    if !resource.is_connected() {
      let message = resource
        .exec_state
        .error
        .as_ref()
        .map(|e| e.context.clone())
        .unwrap_or_else(|| format!("connection is {}", resource.exec_state.status));
      return Err(SdkError::ResourceNotConnected {
        name: name.to_string(),
        message,
      });
    }
    Ok(resource)
  }
}

/// Resolve the `{{ placeholders }}` of a template to parameter artifacts, in
/// name order.
fn placeholder_inputs(dag: &Dag, template: &str) -> Result<Vec<ArtifactId>, SdkError> {
  let names: BTreeSet<String> = placeholders(template)?;
  names
    .iter()
    .map(|name| {
      let op = dag
        .get_operator_by_name(name)
        .filter(|op| op.kind() == OperatorKind::Param)
        .ok_or_else(|| {
          SdkError::user_argument(format!(
            "`{{{{ {} }}}}` does not refer to a parameter; create it with create_param first",
            name
          ))
        })?;
      op.outputs
        .first()
        .copied()
        .ok_or_else(|| SdkError::internal(format!("parameter `{}` has no output", name)))
    })
    .collect()
}

/// A connected resource.
#[derive(Clone)]
pub struct Resource {
  builder: WorkflowBuilder,
  info: ResourceInfo,
  mode: ExecutionMode,
}

impl Resource {
  /// A handle whose extracts are added without being previewed.
  pub fn lazy(&self) -> Self {
    Self {
      mode: ExecutionMode::Lazy,
      ..self.clone()
    }
  }

  pub fn id(&self) -> ResourceId {
    self.info.id
  }

  pub fn name(&self) -> &str {
    &self.info.name
  }

  pub fn service(&self) -> ServiceType {
    self.info.service
  }

  pub fn info(&self) -> &ResourceInfo {
    &self.info
  }

  pub fn as_relational(&self) -> Result<RelationalResource, SdkError> {
    if !self.info.service.is_relational() {
      return Err(SdkError::user_argument(format!(
        "`{}` is a {} resource, not a relational database",
        self.info.name, self.info.service
      )));
    }
    Ok(RelationalResource(self.clone()))
  }

  pub fn as_s3(&self) -> Result<S3Resource, SdkError> {
    if self.info.service != ServiceType::S3 {
      return Err(SdkError::user_argument(format!(
        "`{}` is a {} resource, not S3",
        self.info.name, self.info.service
      )));
    }
    Ok(S3Resource(self.clone()))
  }

  /// Add an extract from this resource.
  ///
  /// The operator defaults to `"<resource> query"`; extracts with the same
  /// name are kept side by side.
  pub fn extract(
    &self,
    params: ExtractParams,
    op_name: Option<&str>,
    output: Option<&str>,
  ) -> Result<Artifact, SdkError> {
    let op_name = op_name
      .map(str::to_string)
      .unwrap_or_else(|| format!("{} query", self.info.name));
    let artifact_type = match &params {
      ExtractParams::S3 { artifact_type, .. } => *artifact_type,
      ExtractParams::Relational { .. } | ExtractParams::Generic { .. } => ArtifactType::Table,
    };
    let artifact = match output {
      Some(name) => {
        ArtifactMetadata::new(new_id(), sanitize_artifact_name(name)?, artifact_type)
          .explicitly_named(true)
      }
      None => ArtifactMetadata::new(new_id(), default_artifact_name_from_op(&op_name), artifact_type),
    };

    let inputs = match params.template() {
      Some(template) => placeholder_inputs(&self.builder.borrow_dag(), template)?,
      None => Vec::new(),
    };
    let mut op = Operator::new(
      new_id(),
      op_name,
      OperatorSpec::Extract(ExtractSpec {
        resource_id: self.info.id,
        service: self.info.service,
        params,
      }),
    );
    op.inputs = inputs;
    op.outputs.push(artifact.id);
    let output_id = artifact.id;

    let add = AddOperatorDelta::new(op, vec![artifact]);
    let mut artifacts =
      self
        .builder
        .add_and_preview(&[&add], &[output_id], self.mode)?;
    artifacts
      .pop()
      .ok_or_else(|| SdkError::internal("extract produced no artifact"))
  }

  /// Where and how to save an artifact in this resource.
  pub fn save_config(&self, params: LoadParams) -> SaveConfig {
    SaveConfig {
      resource: self.info.clone(),
      params,
    }
  }
}

/// A relational database resource.
#[derive(Clone)]
pub struct RelationalResource(Resource);

impl RelationalResource {
  pub fn resource(&self) -> &Resource {
    &self.0
  }

  pub fn lazy(&self) -> Self {
    Self(self.0.lazy())
  }

  /// Run a SQL query. `{{ name }}` placeholders refer to parameters.
  pub fn sql(
    &self,
    query: &str,
    op_name: Option<&str>,
    output: Option<&str>,
  ) -> Result<TableArtifact, SdkError> {
    let params = ExtractParams::Relational {
      query: query.to_string(),
    };
    self.0.extract(params, op_name, output)?.into_table()
  }

  /// Extract a whole table.
  pub fn table(&self, table: &str) -> Result<TableArtifact, SdkError> {
    self.sql(&format!("select * from {}", table), None, None)
  }

  pub fn list_tables(&self) -> Result<Vec<String>, SdkError> {
    Ok(self.0.builder.client().list_tables(self.0.info.id)?)
  }

  pub fn config(&self, table: &str, update_mode: UpdateMode) -> SaveConfig {
    self.0.save_config(LoadParams::Relational {
      table: table.to_string(),
      update_mode,
    })
  }
}

/// An S3 bucket resource.
#[derive(Clone)]
pub struct S3Resource(Resource);

impl S3Resource {
  pub fn resource(&self) -> &Resource {
    &self.0
  }

  pub fn lazy(&self) -> Self {
    Self(self.0.lazy())
  }

  /// Read a file, or every file under a prefix ending in `/`.
  pub fn file(
    &self,
    filepath: &str,
    artifact_type: ArtifactType,
    format: Option<S3Format>,
    op_name: Option<&str>,
  ) -> Result<Artifact, SdkError> {
    if artifact_type == ArtifactType::Table && format.is_none() {
      return Err(SdkError::user_argument(
        "a format is required to read a table from S3",
      ));
    }
    let params = ExtractParams::S3 {
      filepath: filepath.to_string(),
      artifact_type,
      format,
    };
    self.0.extract(params, op_name, None)
  }

  pub fn config(&self, filepath: &str, format: Option<S3Format>) -> SaveConfig {
    self.0.save_config(LoadParams::S3 {
      filepath: filepath.to_string(),
      format,
    })
  }
}

/// A destination an artifact can be saved to.
#[derive(Debug, Clone)]
pub struct SaveConfig {
  resource: ResourceInfo,
  params: LoadParams,
}

impl WorkflowBuilder {
  /// Add a load of `artifact` into the configured destination. Saving the
  /// same artifact to the same resource again replaces the earlier save.
  pub fn save(&self, artifact: &impl BaseArtifact, config: &SaveConfig) -> Result<(), SdkError> {
    let handle = artifact.handle();
    handle.ensure_in_session(self)?;
    let metadata = handle.metadata()?;

    if config.resource.service.is_relational()
      && !matches!(
        metadata.artifact_type,
        ArtifactType::Table | ArtifactType::Untyped
      )
    {
      return Err(SdkError::user_action(format!(
        "`{}` is a {} artifact; only tables can be saved to {} resource `{}`",
        metadata.name, metadata.artifact_type, config.resource.service, config.resource.name
      )));
    }

    let mut inputs = match config.params.destination() {
      Some(destination) => placeholder_inputs(&self.borrow_dag(), destination)?,
      None => Vec::new(),
    };
    // The saved artifact is always the last input.
    inputs.push(metadata.id);

    let mut op = Operator::new(
      new_id(),
      format!("save {} to {}", metadata.name, config.resource.name),
      OperatorSpec::Load(LoadSpec {
        resource_id: config.resource.id,
        service: config.resource.service,
        params: config.params.clone(),
      }),
    );
    op.inputs = inputs;
    self.apply(&[&AddOrReplaceOperatorDelta::for_load(op)])
  }
}
