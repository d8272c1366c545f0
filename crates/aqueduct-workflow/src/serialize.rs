//! Wire serialization of artifact values and parameters.
//!
//! Lists and tuples share the JSON array encoding; the artifact type recorded
//! alongside the bytes tells them apart on the way back.

use aqueduct_config::{ArtifactType, ParamSpec, SerializationType};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

use crate::error::WorkflowError;
use crate::value::{ArtifactValue, Table};

/// A value encoded for the server.
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedValue {
  pub artifact_type: ArtifactType,
  pub serialization_type: SerializationType,
  pub bytes: Vec<u8>,
}

pub fn serialize_value(value: &ArtifactValue) -> Result<SerializedValue, WorkflowError> {
  let artifact_type = value.artifact_type();
  let (serialization_type, bytes) = match value {
    ArtifactValue::String(s) => (SerializationType::String, s.as_bytes().to_vec()),
    ArtifactValue::Bytes(b) => (SerializationType::Bytes, b.clone()),
    ArtifactValue::Image(b) => (SerializationType::Image, b.clone()),
    ArtifactValue::Bool(b) => (SerializationType::Json, to_json(artifact_type, b)?),
    ArtifactValue::Numeric(n) => (SerializationType::Json, to_json(artifact_type, n)?),
    ArtifactValue::List(items) | ArtifactValue::Tuple(items) => {
      (SerializationType::Json, to_json(artifact_type, items)?)
    }
    ArtifactValue::Dict(map) => (SerializationType::Json, to_json(artifact_type, map)?),
    ArtifactValue::Json(v) => (SerializationType::Json, to_json(artifact_type, v)?),
    ArtifactValue::Table(t) => (SerializationType::Table, to_json(artifact_type, t)?),
  };
  Ok(SerializedValue {
    artifact_type,
    serialization_type,
    bytes,
  })
}

fn to_json<T: serde::Serialize>(
  artifact_type: ArtifactType,
  value: &T,
) -> Result<Vec<u8>, WorkflowError> {
  serde_json::to_vec(value).map_err(|e| WorkflowError::Decode {
    artifact_type,
    message: e.to_string(),
  })
}

pub fn deserialize_value(
  artifact_type: ArtifactType,
  serialization_type: SerializationType,
  bytes: &[u8],
) -> Result<ArtifactValue, WorkflowError> {
  let decode_err = |message: String| WorkflowError::Decode {
    artifact_type,
    message,
  };
  let text = || String::from_utf8(bytes.to_vec()).map_err(|e| decode_err(e.to_string()));
  let json = || serde_json::from_slice::<Value>(bytes).map_err(|e| decode_err(e.to_string()));

  match (artifact_type, serialization_type) {
    (_, SerializationType::Bytes) if artifact_type != ArtifactType::Image => {
      Ok(ArtifactValue::Bytes(bytes.to_vec()))
    }
    (ArtifactType::Image, _) | (_, SerializationType::Image) => {
      Ok(ArtifactValue::Image(bytes.to_vec()))
    }
    (ArtifactType::Table, _) | (_, SerializationType::Table) => {
      let table: Table = serde_json::from_slice(bytes).map_err(|e| decode_err(e.to_string()))?;
      Ok(ArtifactValue::Table(table))
    }
    (ArtifactType::String, _) => Ok(ArtifactValue::String(text()?)),
    (ArtifactType::Json, SerializationType::String) => {
      let parsed = serde_json::from_str(&text()?).map_err(|e| decode_err(e.to_string()))?;
      Ok(ArtifactValue::Json(parsed))
    }
    (ArtifactType::Json, _) => Ok(ArtifactValue::Json(json()?)),
    (ArtifactType::Bool, _) => match json()? {
      Value::Bool(b) => Ok(ArtifactValue::Bool(b)),
      other => Err(decode_err(format!("expected a boolean, got {}", other))),
    },
    (ArtifactType::Numeric, _) => match json()? {
      Value::Number(n) => Ok(ArtifactValue::Numeric(n)),
      other => Err(decode_err(format!("expected a number, got {}", other))),
    },
    (ArtifactType::List, _) | (ArtifactType::Tuple, _) => match json()? {
      Value::Array(items) if artifact_type == ArtifactType::Tuple => Ok(ArtifactValue::Tuple(items)),
      Value::Array(items) => Ok(ArtifactValue::List(items)),
      other => Err(decode_err(format!("expected an array, got {}", other))),
    },
    (ArtifactType::Dict, _) => match json()? {
      Value::Object(map) => Ok(ArtifactValue::Dict(map)),
      other => Err(decode_err(format!("expected an object, got {}", other))),
    },
    (ArtifactType::Untyped, SerializationType::String) => Ok(ArtifactValue::String(text()?)),
    (ArtifactType::Untyped, SerializationType::Json) => Ok(ArtifactValue::from_json(json()?)),
    (ArtifactType::Bytes, _) | (ArtifactType::Picklable, _) | (ArtifactType::TfKeras, _) => {
      Ok(ArtifactValue::Bytes(bytes.to_vec()))
    }
    (ArtifactType::Untyped, _) => Err(decode_err(format!(
      "unsupported serialization {:?}",
      serialization_type
    ))),
  }
}

/// Serialize a parameter value into a [`ParamSpec`] plus the artifact type to record.
pub fn param_spec(
  value: &ArtifactValue,
  implicitly_created: bool,
) -> Result<(ParamSpec, ArtifactType), WorkflowError> {
  let serialized = serialize_value(value)?;
  Ok((
    ParamSpec {
      val: STANDARD.encode(&serialized.bytes),
      serialization_type: serialized.serialization_type,
      implicitly_created,
    },
    serialized.artifact_type,
  ))
}

/// Decode the value held by a parameter spec.
pub fn decode_param_spec(
  spec: &ParamSpec,
  artifact_type: ArtifactType,
) -> Result<ArtifactValue, WorkflowError> {
  let bytes = STANDARD
    .decode(spec.val.as_bytes())
    .map_err(|e| WorkflowError::Decode {
      artifact_type,
      message: format!("parameter value is not valid base64: {}", e),
    })?;
  deserialize_value(artifact_type, spec.serialization_type, &bytes)
}

/// Decodes artifact content returned by the server.
pub trait ValueCodec {
  fn decode(
    &self,
    artifact_type: ArtifactType,
    serialization_type: SerializationType,
    bytes: &[u8],
  ) -> Result<ArtifactValue, WorkflowError>;
}

/// Codec for the serialization formats of [`serialize_value`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValueCodec;

impl ValueCodec for DefaultValueCodec {
  fn decode(
    &self,
    artifact_type: ArtifactType,
    serialization_type: SerializationType,
    bytes: &[u8],
  ) -> Result<ArtifactValue, WorkflowError> {
    deserialize_value(artifact_type, serialization_type, bytes)
  }
}
