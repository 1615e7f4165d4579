// Device API envelope types
//
// Every device response wraps its payload in the same envelope:
// `{ "status": "success", "http_status": 200, "results": ..., "mkey": ..., "version": "v7.0.1" }`.
// Only the envelope is typed; `results` stays dynamic because its shape is
// described by the schema descriptors, not by this crate.

use serde::Deserialize;
use serde_json::{Map, Value};

/// The common response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceResponse {
    /// `"success"` or `"error"`.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub http_status: Option<u16>,
    /// Object payload: an array of objects for reads, absent for writes.
    #[serde(default)]
    pub results: Option<Value>,
    /// Primary key of the object a write touched.
    #[serde(default)]
    pub mkey: Option<Value>,
    /// Firmware/API version reported by the device, e.g. `"v6.2.3"`.
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub build: Option<u64>,
    /// Device-specific error code on failures.
    #[serde(default)]
    pub error: Option<i64>,
    #[serde(default)]
    pub cli_error: Option<String>,
    /// Any other fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeviceResponse {
    /// `true` unless the envelope explicitly reports `status: "error"`.
    pub fn is_success(&self) -> bool {
        self.status.as_deref() != Some("error")
    }

    /// Best-effort human message for a failed envelope.
    pub fn error_message(&self) -> String {
        if let Some(cli) = self.cli_error.as_deref().filter(|m| !m.trim().is_empty()) {
            return cli.trim().to_owned();
        }
        match self.error {
            Some(code) => format!("device returned error code {code}"),
            None => "device reported an error".into(),
        }
    }

    /// Take the first object out of `results`, which may be an array or a
    /// single object depending on the endpoint.
    pub fn into_first_object(self) -> Option<Map<String, Value>> {
        match self.results? {
            Value::Array(items) => items.into_iter().find_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            }),
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// The write acknowledgement as a flat object: `mkey` plus status fields.
    pub fn into_ack(self) -> Map<String, Value> {
        let mut ack = Map::new();
        if let Some(status) = self.status {
            ack.insert("status".into(), Value::String(status));
        }
        if let Some(http_status) = self.http_status {
            ack.insert("http_status".into(), Value::from(http_status));
        }
        if let Some(mkey) = self.mkey {
            ack.insert("mkey".into(), mkey);
        }
        ack
    }
}
