//! The wire message envelope (spec §6): every frame is either a command
//! (request, may produce a reply) or a one-way data push.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One message frame, in either of the two shapes the protocol allows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    /// `{ "command": "<name>", "data": <payload> }`
    Command {
        /// Command name, e.g. `"addTransaction"`.
        command: String,
        /// Command payload.
        #[serde(default)]
        data: Value,
    },
    /// `{ "dataName": "<name>", "data": <payload> }`
    Push {
        /// Push name, e.g. `"block"`.
        #[serde(rename = "dataName")]
        data_name: String,
        /// Push payload.
        #[serde(default)]
        data: Value,
    },
}

impl Envelope {
    /// Build a command envelope.
    pub fn command(name: impl Into<String>, data: Value) -> Self {
        Envelope::Command {
            command: name.into(),
            data,
        }
    }

    /// Build a data-push envelope.
    pub fn push(name: impl Into<String>, data: Value) -> Self {
        Envelope::Push {
            data_name: name.into(),
            data,
        }
    }

    /// The command or push name, for dispatch and logging.
    pub fn name(&self) -> &str {
        match self {
            Envelope::Command { command, .. } => command,
            Envelope::Push { data_name, .. } => data_name,
        }
    }

    /// The payload, regardless of envelope shape.
    pub fn data(&self) -> &Value {
        match self {
            Envelope::Command { data, .. } => data,
            Envelope::Push { data, .. } => data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_shape_roundtrip() {
        let env = Envelope::command("addTransaction", json!({"transactionId": "tx-1"}));
        let s = serde_json::to_string(&env).unwrap();
        assert!(s.contains("\"command\":\"addTransaction\""));
        let back: Envelope = serde_json::from_str(&s).unwrap();
        assert_eq!(env, back);
    }

    #[test]
    fn test_push_shape_roundtrip() {
        let env = Envelope::push("block", json!({"index": 1}));
        let s = serde_json::to_string(&env).unwrap();
        assert!(s.contains("\"dataName\":\"block\""));
        let back: Envelope = serde_json::from_str(&s).unwrap();
        assert_eq!(env, back);
    }

    #[test]
    fn test_parse_command_from_raw_json() {
        let env: Envelope = serde_json::from_str(r#"{"command":"getNodes","data":null}"#).unwrap();
        assert_eq!(env.name(), "getNodes");
    }

    #[test]
    fn test_parse_push_from_raw_json() {
        let env: Envelope =
            serde_json::from_str(r#"{"dataName":"voted","data":{"granted":true}}"#).unwrap();
        assert_eq!(env.name(), "voted");
        assert_eq!(env.data()["granted"], json!(true));
    }
}
