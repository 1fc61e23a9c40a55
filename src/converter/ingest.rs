//! Bridge from bus messages to the dispatcher.

use ffqueue_common::{JobRequest, Result};
use serde::de::Error as _;
use serde_json::{Map, Value};

use super::Dispatcher;
use crate::bus::Handler;

/// Name the converter registers its bus handler under.
pub const HANDLER_NAME: &str = "converter";

/// Decode a JSON job payload, best effort.
///
/// The payload must be a JSON object. Each known field that holds a string
/// is taken; unknown fields are ignored and missing or mistyped ones are
/// left empty, so one bad field does not drop the rest of the request.
pub fn decode_job(payload: &[u8]) -> Result<JobRequest> {
    let fields = match serde_json::from_slice::<Value>(payload)? {
        Value::Object(fields) => fields,
        other => {
            return Err(serde_json::Error::custom(format!(
                "expected a JSON object, got {}",
                kind_of(&other)
            ))
            .into())
        }
    };

    let text = |key: &str| string_field(&fields, key).unwrap_or_default();
    Ok(JobRequest {
        name: text("Name"),
        input_file: text("InputFile").into(),
        output_file: text("OutputFile").into(),
    })
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(value) => Some(value.clone()),
        other => {
            tracing::warn!(field = key, "Ignoring {} where a string was expected", kind_of(other));
            None
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Build the bus handler that queues every decodable payload on `dispatcher`.
///
/// Payloads that fail to decode are logged and dropped.
pub fn ingest_handler(dispatcher: Dispatcher) -> Handler {
    Handler::new(HANDLER_NAME, move |payload: &[u8]| match decode_job(payload) {
        Ok(request) => {
            let id = dispatcher.add_task(request);
            tracing::debug!(job_id = %id, "Accepted task from bus");
        }
        Err(e) => tracing::warn!(bytes = payload.len(), "Dropping undecodable task: {}", e),
    })
}
