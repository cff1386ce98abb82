//! JSON task body serializer.

use super::{ProtocolVersion, TaskBody, TaskSerializer};
use crate::error::{CeleryError, CeleryResult};
use crate::task::Task;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Serializer for `application/json` bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

/// Workflow options embedded in a protocol 2 body.
#[derive(Serialize, Default)]
struct Embed {
    callbacks: Option<Value>,
    errbacks: Option<Value>,
    chain: Option<Value>,
    chord: Option<Value>,
}

#[derive(Serialize)]
struct OutboundV1Body<'a> {
    id: &'a str,
    task: &'a str,
    args: &'a [Value],
    kwargs: &'a Map<String, Value>,
    expires: Option<String>,
    eta: Option<String>,
    retries: u32,
    utc: bool,
}

#[derive(Deserialize)]
struct InboundV1Body {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    task: Option<String>,
    #[serde(default)]
    args: Option<Vec<Value>>,
    #[serde(default)]
    kwargs: Option<Map<String, Value>>,
    #[serde(default)]
    expires: Option<String>,
}

impl TaskSerializer for JsonSerializer {
    fn encode(&self, protocol: ProtocolVersion, task: &Task) -> CeleryResult<Vec<u8>> {
        let body = match protocol {
            ProtocolVersion::V1 => serde_json::to_vec(&OutboundV1Body {
                id: &task.id,
                task: &task.name,
                args: &task.args,
                kwargs: &task.kwargs,
                expires: task.expires.map(|at| at.to_rfc3339()),
                eta: None,
                retries: 0,
                utc: true,
            }),
            ProtocolVersion::V2 => {
                serde_json::to_vec(&(&task.args, &task.kwargs, Embed::default()))
            }
        };

        body.map_err(|e| CeleryError::encode("failed to serialize task body", e))
    }

    fn decode(&self, protocol: ProtocolVersion, body: &[u8]) -> CeleryResult<TaskBody> {
        match protocol {
            ProtocolVersion::V1 => {
                let body: InboundV1Body = serde_json::from_slice(body)
                    .map_err(|e| CeleryError::decode("malformed protocol 1 body", e))?;

                Ok(TaskBody {
                    id: body.id,
                    name: body.task,
                    args: body.args.unwrap_or_default(),
                    kwargs: body.kwargs.unwrap_or_default(),
                    expires: body.expires,
                })
            }
            ProtocolVersion::V2 => {
                let parts: Vec<Value> = serde_json::from_slice(body)
                    .map_err(|e| CeleryError::decode("malformed protocol 2 body", e))?;

                let mut parts = parts.into_iter();
                let args = match parts.next() {
                    Some(Value::Array(args)) => args,
                    None | Some(Value::Null) => Vec::new(),
                    Some(other) => {
                        return Err(CeleryError::malformed(format!(
                            "positional arguments must be an array, got {}",
                            other
                        )));
                    }
                };
                let kwargs = match parts.next() {
                    Some(Value::Object(kwargs)) => kwargs,
                    None | Some(Value::Null) => Map::new(),
                    Some(other) => {
                        return Err(CeleryError::malformed(format!(
                            "keyword arguments must be an object, got {}",
                            other
                        )));
                    }
                };

                Ok(TaskBody {
                    args,
                    kwargs,
                    ..Default::default()
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_v2_body_layout() {
        let task = Task::new("tasks.add").with_args(vec![json!(2), json!(3)]);
        let body = JsonSerializer.encode(ProtocolVersion::V2, &task).unwrap();

        assert_eq!(
            String::from_utf8(body).unwrap(),
            r#"[[2,3],{},{"callbacks":null,"errbacks":null,"chain":null,"chord":null}]"#
        );
    }

    #[test]
    fn test_v2_body_tolerates_missing_parts() {
        let body = JsonSerializer
            .decode(ProtocolVersion::V2, br#"[null]"#)
            .unwrap();
        assert!(body.args.is_empty());
        assert!(body.kwargs.is_empty());
    }

    #[test]
    fn test_v2_body_rejects_wrong_shapes() {
        assert!(
            JsonSerializer
                .decode(ProtocolVersion::V2, br#"[{"a": 1}, {}, {}]"#)
                .is_err()
        );
        assert!(
            JsonSerializer
                .decode(ProtocolVersion::V2, br#"[[], [1], {}]"#)
                .is_err()
        );
        assert!(
            JsonSerializer
                .decode(ProtocolVersion::V2, br#"{"args": []}"#)
                .is_err()
        );
    }

    #[test]
    fn test_v1_body() {
        let task = Task::new("tasks.add").with_args(vec![json!("x")]);
        let body = JsonSerializer.encode(ProtocolVersion::V1, &task).unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(value["id"], json!(task.id));
        assert_eq!(value["task"], "tasks.add");
        assert_eq!(value["utc"], true);

        let decoded = JsonSerializer.decode(ProtocolVersion::V1, &body).unwrap();
        assert_eq!(decoded.id.as_deref(), Some(task.id.as_str()));
        assert_eq!(decoded.name.as_deref(), Some("tasks.add"));
        assert_eq!(decoded.args, vec![json!("x")]);
    }
}
