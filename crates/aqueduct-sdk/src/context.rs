use std::cell::{Ref, RefCell};
use std::rc::Rc;

use aqueduct_client::{ClientConfig, HttpServerClient, ServerClient};
use aqueduct_config::EngineConfig;
use aqueduct_workflow::{Dag, DagDelta, DefaultValueCodec, ValueCodec, apply_deltas};
use tracing::info;

use crate::error::SdkError;
use crate::operator::ExecutionMode;
use crate::packager::{FunctionPackager, ZipPackager};

/// Version of this SDK. The server must advertise the same version.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the engine built into the server.
pub const AQUEDUCT_ENGINE: &str = "aqueduct";

/// Process-wide defaults for a workflow session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalConfig {
  /// Skip previews on every call.
  pub lazy: bool,
  /// Engine used by `publish_flow` when none is given.
  pub engine: Option<String>,
}

/// Pluggable pieces of a session.
pub struct SessionOptions {
  pub codec: Box<dyn ValueCodec>,
  pub packager: Box<dyn FunctionPackager>,
  /// Runtime version flows are authored against; compared at publish.
  pub runtime_version: Option<String>,
}

impl Default for SessionOptions {
  fn default() -> Self {
    Self {
      codec: Box::new(DefaultValueCodec),
      packager: Box::new(ZipPackager),
      runtime_version: None,
    }
  }
}

pub(crate) struct Inner {
  pub(crate) dag: RefCell<Dag>,
  pub(crate) client: Box<dyn ServerClient>,
  pub(crate) codec: Box<dyn ValueCodec>,
  pub(crate) packager: Box<dyn FunctionPackager>,
  pub(crate) config: RefCell<GlobalConfig>,
  pub(crate) runtime_version: Option<String>,
}

/// A workflow authoring session.
///
/// Owns the session DAG and the connection to the server. Clones share the
/// same session; artifact handles keep a clone to resolve themselves.
#[derive(Clone)]
pub struct WorkflowBuilder {
  pub(crate) inner: Rc<Inner>,
}

impl WorkflowBuilder {
  /// Connect over HTTP.
  pub fn from_config(config: ClientConfig) -> Result<Self, SdkError> {
    let options = SessionOptions {
      runtime_version: config.runtime_version.clone(),
      ..Default::default()
    };
    let client = HttpServerClient::new(config)?;
    Self::connect_with(Box::new(client), options)
  }

  pub fn connect(client: Box<dyn ServerClient>) -> Result<Self, SdkError> {
    Self::connect_with(client, SessionOptions::default())
  }

  /// Start a session after checking the server runs a matching version.
  pub fn connect_with(
    client: Box<dyn ServerClient>,
    options: SessionOptions,
  ) -> Result<Self, SdkError> {
    let server = client.server_version()?;
    if server != SDK_VERSION {
      return Err(SdkError::VersionMismatch {
        server,
        sdk: SDK_VERSION.to_string(),
      });
    }
    info!(version = %server, "connected to aqueduct server");

    Ok(Self {
      inner: Rc::new(Inner {
        dag: RefCell::new(Dag::new()),
        client,
        codec: options.codec,
        packager: options.packager,
        config: RefCell::new(GlobalConfig::default()),
        runtime_version: options.runtime_version,
      }),
    })
  }

  pub fn global_config(&self) -> GlobalConfig {
    self.inner.config.borrow().clone()
  }

  pub fn set_global_config(&self, config: GlobalConfig) {
    *self.inner.config.borrow_mut() = config;
  }

  /// A copy of the session DAG.
  pub fn dag(&self) -> Dag {
    self.inner.dag.borrow().clone()
  }

  pub(crate) fn borrow_dag(&self) -> Ref<'_, Dag> {
    self.inner.dag.borrow()
  }

  pub(crate) fn client(&self) -> &dyn ServerClient {
    self.inner.client.as_ref()
  }

  /// Apply deltas to the session DAG; nothing changes on error.
  pub(crate) fn apply(&self, deltas: &[&dyn DagDelta]) -> Result<(), SdkError> {
    let mut dag = self.inner.dag.borrow_mut();
    apply_deltas(&mut dag, deltas)?;
    Ok(())
  }

  pub(crate) fn restore(&self, dag: Dag) {
    *self.inner.dag.borrow_mut() = dag;
  }

  pub(crate) fn is_eager(&self, mode: ExecutionMode) -> bool {
    mode == ExecutionMode::Eager && !self.inner.config.borrow().lazy
  }

  pub(crate) fn same_session(&self, other: &WorkflowBuilder) -> bool {
    Rc::ptr_eq(&self.inner, &other.inner)
  }

  /// Resolve an engine name to its config. The built-in engine needs no
  /// resource; any other must be a connected compute resource.
  pub(crate) fn resolve_engine(&self, name: &str) -> Result<EngineConfig, SdkError> {
    if name.eq_ignore_ascii_case(AQUEDUCT_ENGINE) {
      return Ok(EngineConfig::Aqueduct);
    }
    let resource = self.connected_resource(name)?;
    resource
      .service
      .engine_config(resource.id)
      .ok_or_else(|| {
        SdkError::user_argument(format!(
          "resource `{}` is a {} resource, not a compute engine",
          name, resource.service
        ))
      })
  }
}
