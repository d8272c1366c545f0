use std::fmt;

use aqueduct_client::ClientError;
use aqueduct_config::ArtifactId;
use aqueduct_workflow::WorkflowError;
use thiserror::Error;

/// One operator that failed during a preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorFailure {
  pub operator: String,
  pub context: String,
  pub tip: String,
  pub stderr: String,
}

impl fmt::Display for OperatorFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "operator `{}` failed", self.operator)?;
    if !self.stderr.is_empty() {
      write!(f, "\nstderr:\n{}", self.stderr)?;
    }
    if !self.context.is_empty() {
      write!(f, "\ncontext: {}", self.context)?;
    }
    if !self.tip.is_empty() {
      write!(f, "\ntip: {}", self.tip)?;
    }
    Ok(())
  }
}

fn format_failures(failures: &[OperatorFailure]) -> String {
  failures
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join("\n\n")
}

/// The tag of an [`SdkError`], independent of which layer raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  UserArgument,
  UserAction,
  ResourceNotFound,
  ResourceNotConnected,
  PreviewExecution,
  ArtifactNotFound,
  ArtifactNeverComputed,
  ArtifactOverwritten,
  Server,
  Internal,
  VersionMismatch,
}

/// Errors surfaced to SDK users.
#[derive(Debug, Error)]
pub enum SdkError {
  /// The caller passed an invalid argument.
  #[error("{message}")]
  UserArgument { message: String },

  /// The action is not allowed in the current state of the workflow.
  #[error("{message}")]
  UserAction { message: String },

  #[error("resource not found: {name}")]
  ResourceNotFound { name: String },

  #[error("resource `{name}` is not connected: {message}")]
  ResourceNotConnected { name: String, message: String },

  /// Failed operators, in breadth-first order from the roots.
  #[error("preview failed\n\n{}", format_failures(.failures))]
  PreviewExecution { failures: Vec<OperatorFailure> },

  #[error("artifact {id} no longer exists in the workflow")]
  ArtifactNotFound { id: ArtifactId },

  #[error("artifact `{name}` has no computed value: {reason}")]
  ArtifactNeverComputed { name: String, reason: String },

  /// A later call replaced the operator that produced this artifact.
  #[error("artifact `{name}` was overwritten by a later call; use the artifact returned by that call")]
  ArtifactOverwritten { name: String },

  #[error("server error: {message}")]
  Server { message: String },

  #[error("internal error: {message}. Please file a bug report")]
  Internal { message: String },

  #[error("the server runs version {server} but this sdk is version {sdk}; install the matching sdk")]
  VersionMismatch { server: String, sdk: String },

  #[error(transparent)]
  Workflow(#[from] WorkflowError),

  #[error(transparent)]
  Client(#[from] ClientError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("packaging error: {0}")]
  Package(#[from] zip::result::ZipError),
}

impl SdkError {
  pub(crate) fn user_argument(message: impl Into<String>) -> Self {
    Self::UserArgument {
      message: message.into(),
    }
  }

  pub(crate) fn user_action(message: impl Into<String>) -> Self {
    Self::UserAction {
      message: message.into(),
    }
  }

  pub(crate) fn internal(message: impl Into<String>) -> Self {
    Self::Internal {
      message: message.into(),
    }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      SdkError::UserArgument { .. } => ErrorKind::UserArgument,
      SdkError::UserAction { .. } => ErrorKind::UserAction,
      SdkError::ResourceNotFound { .. } => ErrorKind::ResourceNotFound,
      SdkError::ResourceNotConnected { .. } => ErrorKind::ResourceNotConnected,
      SdkError::PreviewExecution { .. } => ErrorKind::PreviewExecution,
      SdkError::ArtifactNotFound { .. } => ErrorKind::ArtifactNotFound,
      SdkError::ArtifactNeverComputed { .. } => ErrorKind::ArtifactNeverComputed,
      SdkError::ArtifactOverwritten { .. } => ErrorKind::ArtifactOverwritten,
      SdkError::Server { .. } => ErrorKind::Server,
      SdkError::Internal { .. } => ErrorKind::Internal,
      SdkError::VersionMismatch { .. } => ErrorKind::VersionMismatch,
      SdkError::Workflow(e) => match e {
        WorkflowError::UserArgument { .. } => ErrorKind::UserArgument,
        WorkflowError::UserAction { .. } => ErrorKind::UserAction,
        WorkflowError::ArtifactNotFound(_) => ErrorKind::ArtifactNotFound,
        WorkflowError::OperatorNotFound(_)
        | WorkflowError::Decode { .. }
        | WorkflowError::Internal { .. } => ErrorKind::Internal,
      },
      SdkError::Client(e) => match e {
        ClientError::NotFound { .. } => ErrorKind::ResourceNotFound,
        ClientError::Request { .. } | ClientError::Config { .. } => ErrorKind::UserArgument,
        ClientError::PayloadTooLarge { .. } => ErrorKind::UserAction,
        ClientError::Http(_) | ClientError::Server { .. } => ErrorKind::Server,
        ClientError::Json(_) | ClientError::Decode { .. } | ClientError::Io(_) => {
          ErrorKind::Internal
        }
      },
      SdkError::Io(_) | SdkError::Package(_) => ErrorKind::Internal,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_kind_crosses_layers() {
    let err: SdkError = WorkflowError::user_action("No check with name chk_a").into();
    assert_eq!(err.kind(), ErrorKind::UserAction);
    assert!(err.to_string().ends_with("No check with name chk_a"));

    let err: SdkError = ClientError::PayloadTooLarge { size: 2, limit: 1 }.into();
    assert_eq!(err.kind(), ErrorKind::UserAction);

    let err: SdkError = ClientError::Server {
      status: 502,
      message: "bad gateway".to_string(),
    }
    .into();
    assert_eq!(err.kind(), ErrorKind::Server);
  }

  #[test]
  fn test_preview_failure_message() {
    let err = SdkError::PreviewExecution {
      failures: vec![OperatorFailure {
        operator: "clean".to_string(),
        context: "KeyError: 'churn'".to_string(),
        tip: "Check the column name.".to_string(),
        stderr: String::new(),
      }],
    };
    let message = err.to_string();
    assert!(message.contains("operator `clean` failed"));
    assert!(message.contains("tip: Check the column name."));
    assert!(!message.contains("stderr"));
  }
}
