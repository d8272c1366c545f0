use thiserror::Error;

/// Errors returned by a [`ServerClient`](crate::ServerClient).
#[derive(Debug, Error)]
pub enum ClientError {
  /// The request could not be sent or the response could not be read.
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  /// The server failed to handle the request (5xx).
  #[error("server error ({status}): {message}")]
  Server { status: u16, message: String },

  /// The server rejected the request (4xx other than 404).
  #[error("request rejected ({status}): {message}")]
  Request { status: u16, message: String },

  /// The requested object does not exist on the server.
  #[error("not found: {message}")]
  NotFound { message: String },

  /// A request or response body was not valid JSON for the expected type.
  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// Uploads carrying local data are capped in size.
  #[error(
    "the DAG is {size} bytes, over the {limit} byte limit for flows that use local data; \
     upload the data to a connected resource instead"
  )]
  PayloadTooLarge { size: usize, limit: usize },

  /// A base64 field in a response could not be decoded.
  #[error("invalid base64 in field '{field}': {message}")]
  Decode { field: String, message: String },

  /// Client configuration is missing or invalid.
  #[error("invalid client config: {message}")]
  Config { message: String },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

impl ClientError {
  pub(crate) fn config(message: impl Into<String>) -> Self {
    Self::Config {
      message: message.into(),
    }
  }

  /// Whether the server reported a failure on its side.
  pub fn is_server_error(&self) -> bool {
    matches!(self, ClientError::Server { .. })
  }
}
