//! Celery message protocol codec.
//!
//! Messages are Kombu JSON envelopes, the layout Celery's Redis transport stores
//! in its lists:
//!
//! ```text
//! {
//!   "body": "<base64 of the serialized body>",
//!   "content-encoding": "utf-8",
//!   "content-type": "application/json",
//!   "headers": { "task": ..., "id": ..., ... },   // empty for protocol v1
//!   "properties": { "body_encoding": "base64", "delivery_info": {...}, ... }
//! }
//! ```
//!
//! With protocol v2 the task id and name travel in the headers and the body is
//! `[args, kwargs, embed]`. With protocol v1 the headers are empty and the body
//! is a single object carrying `id`, `task`, `args` and `kwargs`. Decoding
//! detects the version from the presence of the `task` header.
//!
//! The body serializer is picked by `content-type`; JSON is always available
//! and further serializers can be registered with [`Codec::with_serializer`].

use crate::error::{CeleryError, CeleryResult};
use crate::task::Task;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

mod finite;
pub mod json;
pub(crate) use finite::ensure_finite;
pub use json::JsonSerializer;

/// MIME type of the built-in JSON serializer.
pub const JSON_MIME: &str = "application/json";

/// Celery task message protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProtocolVersion {
    /// Protocol 1: everything in the body, no task headers
    V1,
    /// Protocol 2: id and name in headers, body is `[args, kwargs, embed]`
    #[default]
    V2,
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::V1 => f.write_str("1"),
            ProtocolVersion::V2 => f.write_str("2"),
        }
    }
}

/// Fields recovered from a message body.
///
/// For protocol v2 only the arguments are populated; id, name and expiry come
/// from the headers instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskBody {
    /// Task id (protocol v1 only)
    pub id: Option<String>,
    /// Task name (protocol v1 only)
    pub name: Option<String>,
    /// Positional arguments
    pub args: Vec<Value>,
    /// Keyword arguments
    pub kwargs: Map<String, Value>,
    /// Raw expiry timestamp (protocol v1 only)
    pub expires: Option<String>,
}

/// Serializes task bodies for one content type.
pub trait TaskSerializer: Send + Sync {
    /// Serialize the body of `task` for the given protocol version.
    fn encode(&self, protocol: ProtocolVersion, task: &Task) -> CeleryResult<Vec<u8>>;

    /// Parse a body previously produced for the given protocol version.
    fn decode(&self, protocol: ProtocolVersion, body: &[u8]) -> CeleryResult<TaskBody>;
}

/// Stateless encoder/decoder for Celery task messages.
#[derive(Clone)]
pub struct Codec {
    protocol: ProtocolVersion,
    mime: String,
    serializers: HashMap<String, Arc<dyn TaskSerializer>>,
    origin: String,
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut mimes: Vec<&String> = self.serializers.keys().collect();
        mimes.sort();
        f.debug_struct("Codec")
            .field("protocol", &self.protocol)
            .field("mime", &self.mime)
            .field("serializers", &mimes)
            .field("origin", &self.origin)
            .finish()
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(ProtocolVersion::default())
    }
}

impl Codec {
    /// Create a codec producing messages of the given protocol version as JSON.
    pub fn new(protocol: ProtocolVersion) -> Self {
        let mut serializers: HashMap<String, Arc<dyn TaskSerializer>> = HashMap::new();
        serializers.insert(JSON_MIME.to_string(), Arc::new(JsonSerializer));

        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string());

        Self {
            protocol,
            mime: JSON_MIME.to_string(),
            serializers,
            origin: format!("gen{}@{}", std::process::id(), host),
        }
    }

    /// Register a serializer for a content type.
    pub fn with_serializer(
        mut self,
        mime: impl Into<String>,
        serializer: impl TaskSerializer + 'static,
    ) -> Self {
        self.serializers.insert(mime.into(), Arc::new(serializer));
        self
    }

    /// Select the content type used for outgoing messages.
    ///
    /// Fails if no serializer is registered for it.
    pub fn with_mime(mut self, mime: impl Into<String>) -> CeleryResult<Self> {
        let mime = mime.into();
        if !self.serializers.contains_key(&mime) {
            return Err(CeleryError::config(format!(
                "no serializer registered for content type '{}'",
                mime
            )));
        }
        self.mime = mime;
        Ok(self)
    }

    /// Protocol version used for outgoing messages.
    pub fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    /// Content type used for outgoing messages.
    pub fn mime(&self) -> &str {
        &self.mime
    }

    fn serializer(&self, mime: &str) -> Option<&Arc<dyn TaskSerializer>> {
        self.serializers.get(mime)
    }

    /// Encode a task destined for `queue` into wire bytes.
    pub fn encode(&self, queue: &str, task: &Task) -> CeleryResult<Vec<u8>> {
        let serializer = self.serializer(&self.mime).ok_or_else(|| CeleryError::Encode {
            message: format!("no serializer registered for content type '{}'", self.mime),
            source: None,
        })?;

        let body = serializer.encode(self.protocol, task)?;
        let expires = task.expires.map(|at| at.to_rfc3339());

        let headers = match self.protocol {
            ProtocolVersion::V1 => OutboundHeaders::Empty(Map::new()),
            ProtocolVersion::V2 => OutboundHeaders::V2(Box::new(HeadersV2 {
                lang: "rust",
                task: &task.name,
                id: &task.id,
                shadow: None,
                eta: None,
                expires,
                group: None,
                group_index: None,
                retries: 0,
                timelimit: (None, None),
                root_id: &task.id,
                parent_id: None,
                argsrepr: args_repr(&task.args),
                kwargsrepr: Value::Object(task.kwargs.clone()).to_string(),
                origin: &self.origin,
                ignore_result: false,
            })),
        };

        let message = OutboundMessage {
            body: BASE64.encode(body),
            content_encoding: "utf-8",
            content_type: &self.mime,
            headers,
            properties: OutboundProperties {
                correlation_id: &task.id,
                reply_to: uuid::Uuid::new_v4().to_string(),
                delivery_mode: 2,
                delivery_info: DeliveryInfo {
                    exchange: "",
                    routing_key: queue,
                },
                priority: 0,
                body_encoding: "base64",
                delivery_tag: uuid::Uuid::new_v4().to_string(),
            },
        };

        serde_json::to_vec(&message)
            .map_err(|e| CeleryError::encode("failed to serialize message envelope", e))
    }

    /// Decode wire bytes into a task.
    pub fn decode(&self, raw: &[u8]) -> CeleryResult<Task> {
        let message: InboundMessage = serde_json::from_slice(raw)
            .map_err(|e| CeleryError::decode("malformed message envelope", e))?;

        let mime = message.content_type.as_deref().unwrap_or(JSON_MIME);
        let serializer = self
            .serializer(mime)
            .ok_or_else(|| CeleryError::malformed(format!("unsupported content type '{}'", mime)))?;

        let properties = message.properties.unwrap_or_default();
        let body = match properties.body_encoding.as_deref() {
            Some("base64") => BASE64
                .decode(message.body.as_bytes())
                .map_err(|e| CeleryError::decode("body is not valid base64", e))?,
            _ => message.body.into_bytes(),
        };

        let headers = message.headers.unwrap_or_default();
        let protocol = if headers.task.is_some() {
            ProtocolVersion::V2
        } else {
            ProtocolVersion::V1
        };

        let decoded = serializer.decode(protocol, &body)?;

        let (id, name, expires) = match protocol {
            ProtocolVersion::V2 => (headers.id, headers.task, headers.expires),
            ProtocolVersion::V1 => (decoded.id, decoded.name, decoded.expires),
        };
        let id = id.ok_or_else(|| CeleryError::malformed("message has no task id"))?;
        let name = name.ok_or_else(|| CeleryError::malformed("message has no task name"))?;
        let expires = expires.as_deref().map(parse_timestamp).transpose()?;

        Ok(Task {
            id,
            name,
            args: decoded.args,
            kwargs: decoded.kwargs,
            expires,
        })
    }
}

/// Python-style tuple rendering of positional args, for the `argsrepr` header.
fn args_repr(args: &[Value]) -> String {
    let items: Vec<String> = args.iter().map(Value::to_string).collect();
    if items.len() == 1 {
        format!("({},)", items[0])
    } else {
        format!("({})", items.join(", "))
    }
}

/// Parse a Celery timestamp; naive ISO-8601 values are taken as UTC.
fn parse_timestamp(raw: &str) -> CeleryResult<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| CeleryError::decode(format!("invalid timestamp '{}'", raw), e))
}

#[derive(Serialize)]
struct OutboundMessage<'a> {
    body: String,
    #[serde(rename = "content-encoding")]
    content_encoding: &'a str,
    #[serde(rename = "content-type")]
    content_type: &'a str,
    headers: OutboundHeaders<'a>,
    properties: OutboundProperties<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum OutboundHeaders<'a> {
    Empty(Map<String, Value>),
    V2(Box<HeadersV2<'a>>),
}

#[derive(Serialize)]
struct HeadersV2<'a> {
    lang: &'a str,
    task: &'a str,
    id: &'a str,
    shadow: Option<&'a str>,
    eta: Option<String>,
    expires: Option<String>,
    group: Option<&'a str>,
    group_index: Option<u32>,
    retries: u32,
    timelimit: (Option<u64>, Option<u64>),
    root_id: &'a str,
    parent_id: Option<&'a str>,
    argsrepr: String,
    kwargsrepr: String,
    origin: &'a str,
    ignore_result: bool,
}

#[derive(Serialize)]
struct OutboundProperties<'a> {
    correlation_id: &'a str,
    reply_to: String,
    delivery_mode: u8,
    delivery_info: DeliveryInfo<'a>,
    priority: u8,
    body_encoding: &'a str,
    delivery_tag: String,
}

#[derive(Serialize)]
struct DeliveryInfo<'a> {
    exchange: &'a str,
    routing_key: &'a str,
}

#[derive(Deserialize)]
struct InboundMessage {
    body: String,
    #[serde(rename = "content-type", default)]
    content_type: Option<String>,
    #[serde(default)]
    headers: Option<InboundHeaders>,
    #[serde(default)]
    properties: Option<InboundProperties>,
}

#[derive(Deserialize, Default)]
struct InboundHeaders {
    #[serde(default)]
    task: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    expires: Option<String>,
}

#[derive(Deserialize, Default)]
struct InboundProperties {
    #[serde(default)]
    body_encoding: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    const TASK_ID: &str = "0ad73c66-f4c9-4600-bd20-96746e720eed";
    const TASK_NAME: &str = "myproject.apps.myapp.tasks.mytask";

    // A protocol 2 message as sent by Celery 5 (Python), with a few extra
    // headers this crate does not know about.
    fn python_v2_message() -> String {
        json!({
            "body": "W1syLCAzLjUsICJmaXp6Il0sIHsiYiI6ICJiYXp6IiwgIm4iOiA3fSwgeyJjYWxsYmFja3MiOiBudWxsLCAiZXJyYmFja3MiOiBudWxsLCAiY2hhaW4iOiBudWxsLCAiY2hvcmQiOiBudWxsfV0=",
            "content-encoding": "utf-8",
            "content-type": "application/json",
            "headers": {
                "lang": "py",
                "task": TASK_NAME,
                "id": TASK_ID,
                "shadow": null,
                "eta": null,
                "expires": null,
                "group": null,
                "group_index": null,
                "retries": 0,
                "timelimit": [null, null],
                "root_id": TASK_ID,
                "parent_id": null,
                "argsrepr": "(2, 3.5, 'fizz')",
                "kwargsrepr": "{'b': 'bazz', 'n': 7}",
                "origin": "gen1234@worker-1",
                "ignore_result": false,
                "replaced_task_nesting": 0,
                "stamped_headers": null,
                "stamps": {}
            },
            "properties": {
                "correlation_id": TASK_ID,
                "reply_to": "7e4bd5bb-0a2a-3a5f-9a0e-6a9bb8d1f8c2",
                "delivery_mode": 2,
                "delivery_info": {"exchange": "", "routing_key": "important"},
                "priority": 0,
                "body_encoding": "base64",
                "delivery_tag": "3c2f9f2e-bc5b-4d57-a0a5-f0bd8e1a7b61"
            }
        })
        .to_string()
    }

    fn python_v1_message() -> String {
        json!({
            "body": "eyJ0YXNrIjogIm15cHJvamVjdC5hcHBzLm15YXBwLnRhc2tzLm15dGFzayIsICJpZCI6ICIwYWQ3M2M2Ni1mNGM5LTQ2MDAtYmQyMC05Njc0NmU3MjBlZWQiLCAiYXJncyI6IFsyLCAzXSwgImt3YXJncyI6IHsiYyI6ICJ4In0sICJyZXRyaWVzIjogMCwgImV0YSI6IG51bGwsICJleHBpcmVzIjogbnVsbCwgInV0YyI6IHRydWV9",
            "content-encoding": "utf-8",
            "content-type": "application/json",
            "headers": {},
            "properties": {
                "delivery_info": {"exchange": "important", "routing_key": "important"},
                "delivery_mode": 2,
                "delivery_tag": "3c2f9f2e-bc5b-4d57-a0a5-f0bd8e1a7b61",
                "body_encoding": "base64"
            }
        })
        .to_string()
    }

    fn sample_task() -> Task {
        let mut kwargs = Map::new();
        kwargs.insert("b".to_string(), json!("bazz"));
        kwargs.insert("nested".to_string(), json!({"list": [1, 2.5, null, true]}));

        Task {
            id: TASK_ID.to_string(),
            name: TASK_NAME.to_string(),
            args: vec![json!("fizz"), json!(2), json!(2.0), json!("2")],
            kwargs,
            expires: None,
        }
    }

    #[test]
    fn test_decode_python_v2_message() {
        let codec = Codec::default();
        let task = codec.decode(python_v2_message().as_bytes()).unwrap();

        assert_eq!(task.id, TASK_ID);
        assert_eq!(task.name, TASK_NAME);
        assert_eq!(task.args, vec![json!(2), json!(3.5), json!("fizz")]);
        assert_eq!(task.kwargs.get("b"), Some(&json!("bazz")));
        assert_eq!(task.kwargs.get("n"), Some(&json!(7)));
        assert_eq!(task.expires, None);
    }

    #[test]
    fn test_decode_python_v1_message() {
        let codec = Codec::default();
        let task = codec.decode(python_v1_message().as_bytes()).unwrap();

        assert_eq!(task.id, TASK_ID);
        assert_eq!(task.name, TASK_NAME);
        assert_eq!(task.args, vec![json!(2), json!(3)]);
        assert_eq!(task.kwargs.get("c"), Some(&json!("x")));
    }

    #[test]
    fn test_round_trip_v2() {
        let codec = Codec::new(ProtocolVersion::V2);
        let task = sample_task();

        let raw = codec.encode("important", &task).unwrap();
        let decoded = codec.decode(&raw).unwrap();

        assert_eq!(decoded, task);
    }

    #[test]
    fn test_round_trip_v1() {
        let codec = Codec::new(ProtocolVersion::V1);
        let task = sample_task();

        let raw = codec.encode("important", &task).unwrap();
        let decoded = codec.decode(&raw).unwrap();

        assert_eq!(decoded, task);
    }

    #[test]
    fn test_round_trip_preserves_expiry() {
        let codec = Codec::default();
        let expires = Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap();
        let task = sample_task().with_expires(expires);

        let decoded = codec.decode(&codec.encode("q", &task).unwrap()).unwrap();
        assert_eq!(decoded.expires, Some(expires));
    }

    #[test]
    fn test_numeric_and_string_scalars_are_preserved() {
        let codec = Codec::default();
        let raw = codec.encode("q", &sample_task()).unwrap();
        let decoded = codec.decode(&raw).unwrap();

        assert!(decoded.args[1].is_i64());
        assert!(decoded.args[2].is_f64());
        assert!(decoded.args[3].is_string());
    }

    #[test]
    fn test_encoded_v2_envelope_layout() {
        let codec = Codec::new(ProtocolVersion::V2);
        let raw = codec.encode("important", &sample_task()).unwrap();
        let envelope: Value = serde_json::from_slice(&raw).unwrap();

        assert_eq!(envelope["content-type"], "application/json");
        assert_eq!(envelope["content-encoding"], "utf-8");
        assert_eq!(envelope["headers"]["task"], TASK_NAME);
        assert_eq!(envelope["headers"]["id"], TASK_ID);
        assert_eq!(envelope["headers"]["root_id"], TASK_ID);
        assert_eq!(envelope["headers"]["lang"], "rust");
        assert_eq!(envelope["headers"]["timelimit"], json!([null, null]));
        assert_eq!(envelope["properties"]["body_encoding"], "base64");
        assert_eq!(envelope["properties"]["correlation_id"], TASK_ID);
        assert_eq!(
            envelope["properties"]["delivery_info"]["routing_key"],
            "important"
        );

        let body = BASE64
            .decode(envelope["body"].as_str().unwrap())
            .unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            body[2],
            json!({"callbacks": null, "errbacks": null, "chain": null, "chord": null})
        );
    }

    #[test]
    fn test_encoded_v1_envelope_has_empty_headers() {
        let codec = Codec::new(ProtocolVersion::V1);
        let raw = codec.encode("important", &sample_task()).unwrap();
        let envelope: Value = serde_json::from_slice(&raw).unwrap();

        assert_eq!(envelope["headers"], json!({}));
    }

    #[test]
    fn test_decode_rejects_missing_id() {
        let mut message: Value = serde_json::from_str(&python_v2_message()).unwrap();
        message["headers"].as_object_mut().unwrap().remove("id");

        let err = Codec::default()
            .decode(message.to_string().as_bytes())
            .unwrap_err();
        assert!(matches!(err, CeleryError::Decode { .. }));
    }

    #[test]
    fn test_decode_rejects_missing_task_name() {
        // without a task header the message is read as protocol 1, whose body
        // has no task field either
        let mut message: Value = serde_json::from_str(&python_v2_message()).unwrap();
        message["headers"].as_object_mut().unwrap().remove("task");

        let err = Codec::default()
            .decode(message.to_string().as_bytes())
            .unwrap_err();
        assert!(matches!(err, CeleryError::Decode { .. }));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let codec = Codec::default();

        assert!(matches!(
            codec.decode(b"not json at all"),
            Err(CeleryError::Decode { .. })
        ));
        assert!(matches!(
            codec.decode(br#"{"body": "%%%", "properties": {"body_encoding": "base64"}}"#),
            Err(CeleryError::Decode { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_content_type() {
        let mut message: Value = serde_json::from_str(&python_v2_message()).unwrap();
        message["content-type"] = json!("application/x-python-serialize");

        let err = Codec::default()
            .decode(message.to_string().as_bytes())
            .unwrap_err();
        assert!(err.to_string().contains("unsupported content type"));
    }

    #[test]
    fn test_decode_plain_body_without_base64() {
        let message = json!({
            "body": r#"[[1], {}, {}]"#,
            "content-type": "application/json",
            "headers": {"task": TASK_NAME, "id": TASK_ID},
            "properties": {}
        });

        let task = Codec::default()
            .decode(message.to_string().as_bytes())
            .unwrap();
        assert_eq!(task.args, vec![json!(1)]);
    }

    #[test]
    fn test_decode_null_headers_and_properties() {
        let message = json!({
            "body": r#"{"id": "abc", "task": "tasks.add", "args": [1, 2], "kwargs": {}}"#,
            "content-type": "application/json",
            "headers": null,
            "properties": null
        });

        let task = Codec::default()
            .decode(message.to_string().as_bytes())
            .unwrap();
        assert_eq!(task.id, "abc");
        assert_eq!(task.args, vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_decode_naive_expiry_as_utc() {
        let mut message: Value = serde_json::from_str(&python_v2_message()).unwrap();
        message["headers"]["expires"] = json!("2030-01-02T03:04:05.000000");

        let task = Codec::default()
            .decode(message.to_string().as_bytes())
            .unwrap();
        assert_eq!(
            task.expires,
            Some(Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap())
        );
    }

    #[test]
    fn test_with_mime_requires_registered_serializer() {
        assert!(Codec::default().with_mime("application/yaml").is_err());
        assert!(Codec::default().with_mime(JSON_MIME).is_ok());
    }

    #[test]
    fn test_custom_serializer() {
        // Reuses the JSON body layout under a vendor content type.
        struct VendorJson;

        impl TaskSerializer for VendorJson {
            fn encode(&self, protocol: ProtocolVersion, task: &Task) -> CeleryResult<Vec<u8>> {
                JsonSerializer.encode(protocol, task)
            }

            fn decode(&self, protocol: ProtocolVersion, body: &[u8]) -> CeleryResult<TaskBody> {
                JsonSerializer.decode(protocol, body)
            }
        }

        let codec = Codec::default()
            .with_serializer("application/vnd.example+json", VendorJson)
            .with_mime("application/vnd.example+json")
            .unwrap();

        let raw = codec.encode("q", &sample_task()).unwrap();
        let envelope: Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(envelope["content-type"], "application/vnd.example+json");
        assert_eq!(codec.decode(&raw).unwrap(), sample_task());

        // a codec without the vendor serializer cannot read it
        assert!(Codec::default().decode(&raw).is_err());
    }

    #[test]
    fn test_args_repr() {
        assert_eq!(args_repr(&[]), "()");
        assert_eq!(args_repr(&[json!(2)]), "(2,)");
        assert_eq!(args_repr(&[json!(2), json!("a")]), "(2, \"a\")");
    }
}
