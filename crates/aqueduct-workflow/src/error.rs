use aqueduct_config::{ArtifactId, ArtifactType, OperatorId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
  /// The caller supplied an invalid value (bad name, unknown parameter, forbidden resource field).
  #[error("invalid argument: {message}")]
  UserArgument { message: String },

  /// The requested rewrite is illegal given the current DAG.
  #[error("invalid action: {message}")]
  UserAction { message: String },

  #[error("operator not found: {0}")]
  OperatorNotFound(OperatorId),

  #[error("artifact not found: {0}")]
  ArtifactNotFound(ArtifactId),

  /// Bytes could not be decoded into a value of the expected type.
  #[error("failed to decode {artifact_type} value: {message}")]
  Decode {
    artifact_type: ArtifactType,
    message: String,
  },

  /// The DAG reached a state that no sequence of legal operations produces.
  #[error("internal error: {message}")]
  Internal { message: String },
}

impl WorkflowError {
  pub fn user_argument(message: impl Into<String>) -> Self {
    WorkflowError::UserArgument {
      message: message.into(),
    }
  }

  pub fn user_action(message: impl Into<String>) -> Self {
    WorkflowError::UserAction {
      message: message.into(),
    }
  }

  pub fn internal(message: impl Into<String>) -> Self {
    WorkflowError::Internal {
      message: message.into(),
    }
  }
}
