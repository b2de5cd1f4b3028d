//! Command envelopes received on the shared channel.
//!
//! ```json
//! { "cmd": "routing.set-deployment", "region": "europe/france" }
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

/// A decoded command: a dotted `service.action` tag plus payload fields.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandEnvelope {
    pub cmd: String,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl CommandEnvelope {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params
            .insert(name.to_string(), Value::String(value.into()));
        self
    }

    /// Decode a raw channel payload.
    pub fn decode(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Service part of the tag (`routing` in `routing.set-deployment`).
    pub fn service(&self) -> Option<&str> {
        self.cmd.split_once('.').map(|(service, _)| service)
    }

    /// Whether the command is addressed to `service`.
    pub fn is_for(&self, service: &str) -> bool {
        self.service() == Some(service)
    }

    /// A string payload field.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }
}

/// Decode a payload, logging and dropping anything malformed.
pub(crate) fn decode_logged(payload: &str) -> Option<CommandEnvelope> {
    info!(command = %payload, "received command");
    match CommandEnvelope::decode(payload) {
        Ok(cmd) => Some(cmd),
        Err(e) => {
            warn!(payload = %payload, error = %e, "expected JSON command payload, dropping");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_set_deployment() {
        let cmd =
            CommandEnvelope::decode(r#"{"cmd":"routing.set-deployment","region":"europe/france"}"#)
                .unwrap();
        assert_eq!(cmd.service(), Some("routing"));
        assert!(cmd.is_for("routing"));
        assert!(!cmd.is_for("tiling"));
        assert_eq!(cmd.param("region"), Some("europe/france"));
        assert_eq!(cmd.param("country"), None);
    }

    #[test]
    fn non_string_params_are_not_strings() {
        let cmd = CommandEnvelope::decode(r#"{"cmd":"tiling.set-deployment","bbox":[1,2,3,4]}"#)
            .unwrap();
        assert_eq!(cmd.param("bbox"), None);
    }

    #[test]
    fn malformed_payloads_are_dropped() {
        assert!(decode_logged("not json").is_none());
        assert!(decode_logged(r#"{"region":"FR"}"#).is_none());
        assert!(decode_logged(r#"["routing.set-deployment"]"#).is_none());
        assert!(decode_logged(r#"{"cmd":"geocoding.set-deployment","country":"de"}"#).is_some());
    }

    #[test]
    fn untagged_cmd_has_no_service() {
        let cmd = CommandEnvelope::new("reload");
        assert_eq!(cmd.service(), None);
        assert!(!cmd.is_for("reload"));
    }
}
