//! Wire commands exchanged between ring members.
//!
//! Every command is one JSON object per line, tagged by its `"Type"` field.
//! Large integers travel as decimal strings.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::chat::error::ChatError;

/// One ring member as listed in a peer roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PeerInfo {
    /// Ring position.
    pub index: usize,
    /// Listen address, `host:port`.
    pub ip_address: String,
}

impl PeerInfo {
    /// Create a roster entry.
    pub fn new(index: usize, ip_address: impl Into<String>) -> Self {
        Self {
            index,
            ip_address: ip_address.into(),
        }
    }
}

/// One step of the ring key agreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RingStep {
    /// Prime modulus of the round.
    #[serde(with = "decimal")]
    pub p: BigUint,
    /// Generator of the round.
    #[serde(with = "decimal")]
    pub g: BigUint,
    /// Value to be raised by the receiver.
    #[serde(with = "decimal")]
    pub base: BigUint,
    /// Ring index whose final group value this chain produces.
    pub shared_for: usize,
    /// Number of members that have received their final value so far.
    pub peers_finished_count: usize,
}

/// Commands exchanged over a peer link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Type")]
pub enum Command {
    /// Ask an existing member for the ring roster.
    #[serde(rename = "list peers")]
    ListPeers,

    /// Roster reply with the joiner's proposed index.
    #[serde(rename = "here are the peers", rename_all = "PascalCase")]
    HereAreThePeers {
        /// Every known member, responder included, ordered by index.
        peers: Vec<PeerInfo>,
        /// Index proposed for the joiner.
        your_index: usize,
        /// Responder's own index.
        my_index: usize,
    },

    /// Joiner announces itself to an existing member.
    #[serde(rename = "add to me to peers list", rename_all = "PascalCase")]
    JoinRequest {
        /// Index claimed by the joiner.
        my_index: usize,
        /// Joiner's listen address.
        my_ip_address: String,
    },

    /// Member accepts a joiner and tells it the member's own index.
    #[serde(rename = "ok you're in", rename_all = "PascalCase")]
    JoinAccepted {
        /// Accepting member's index.
        my_index: usize,
    },

    /// Ring key agreement step.
    #[serde(rename = "calculate dh")]
    RingStep(RingStep),

    /// Encrypted chat line.
    #[serde(rename = "chat message", rename_all = "PascalCase")]
    ChatPayload {
        /// Base64 of `nonce || ciphertext || tag`.
        base64_message: String,
    },
}

impl Command {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::ListPeers => "list peers",
            Command::HereAreThePeers { .. } => "here are the peers",
            Command::JoinRequest { .. } => "add to me to peers list",
            Command::JoinAccepted { .. } => "ok you're in",
            Command::RingStep(_) => "calculate dh",
            Command::ChatPayload { .. } => "chat message",
        }
    }

    /// Encode to a single JSON line (without the terminating newline).
    pub fn encode(&self) -> Result<String, ChatError> {
        serde_json::to_string(self)
            .map_err(|e| ChatError::protocol(format!("cannot encode {}: {}", self.name(), e)))
    }

    /// Decode one line into a command.
    pub fn decode(line: &str) -> Result<Self, ChatError> {
        serde_json::from_str(line.trim_end_matches('\r'))
            .map_err(|e| ChatError::protocol(format!("unparsable record: {}", e)))
    }
}

/// Serde adapter carrying a [`BigUint`] as a decimal string.
mod decimal {
    use num_bigint::BigUint;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let text = String::deserialize(deserializer)?;
        BigUint::parse_bytes(text.as_bytes(), 10)
            .ok_or_else(|| D::Error::custom(format!("invalid decimal integer: {:?}", text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discriminants_match_wire_names() {
        let cases = [
            (Command::ListPeers, "list peers"),
            (
                Command::JoinAccepted { my_index: 2 },
                "ok you're in",
            ),
            (
                Command::ChatPayload {
                    base64_message: "AA==".to_string(),
                },
                "chat message",
            ),
        ];
        for (command, name) in cases {
            let line = command.encode().unwrap();
            let value: serde_json::Value = serde_json::from_str(&line).unwrap();
            assert_eq!(value["Type"], name);
            assert_eq!(command.name(), name);
        }
    }

    #[test]
    fn test_ring_step_carries_decimal_strings() {
        let p = BigUint::parse_bytes(b"340282366920938463463374607431768211297", 10).unwrap();
        let step = Command::RingStep(RingStep {
            p: p.clone(),
            g: BigUint::from(3u32),
            base: BigUint::from(12345u32),
            shared_for: 1,
            peers_finished_count: 1,
        });

        let line = step.encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["Type"], "calculate dh");
        assert_eq!(value["P"], "340282366920938463463374607431768211297");
        assert_eq!(value["G"], "3");
        assert_eq!(value["SharedFor"], 1);
        assert_eq!(value["PeersFinishedCount"], 1);

        assert_eq!(Command::decode(&line).unwrap(), step);
    }

    #[test]
    fn test_decode_record_from_other_implementation() {
        let line = r#"{"Type":"here are the peers","Peers":[{"Index":0,"IpAddress":"127.0.0.1:8090"},{"Index":1,"IpAddress":"127.0.0.1:8091"}],"YourIndex":2,"MyIndex":0}"#;
        let command = Command::decode(line).unwrap();

        assert_eq!(
            command,
            Command::HereAreThePeers {
                peers: vec![
                    PeerInfo::new(0, "127.0.0.1:8090"),
                    PeerInfo::new(1, "127.0.0.1:8091"),
                ],
                your_index: 2,
                my_index: 0,
            }
        );
    }

    #[test]
    fn test_join_request_field_names() {
        let line = Command::JoinRequest {
            my_index: 3,
            my_ip_address: "10.0.0.1:9000".to_string(),
        }
        .encode()
        .unwrap();
        assert!(line.contains(r#""Type":"add to me to peers list""#));
        assert!(line.contains(r#""MyIndex":3"#));
        assert!(line.contains(r#""MyIpAddress":"10.0.0.1:9000""#));
    }

    #[test]
    fn test_unknown_discriminant_is_protocol_error() {
        let result = Command::decode(r#"{"Type":"self destruct"}"#);
        assert!(matches!(result, Err(ChatError::Protocol(_))));
    }

    #[test]
    fn test_garbage_is_protocol_error() {
        assert!(matches!(
            Command::decode("not json at all"),
            Err(ChatError::Protocol(_))
        ));
        assert!(matches!(
            Command::decode(r#"{"Type":"calculate dh","P":"12x","G":"2","Base":"1","SharedFor":0,"PeersFinishedCount":1}"#),
            Err(ChatError::Protocol(_))
        ));
    }

    #[test]
    fn test_trailing_carriage_return_is_ignored() {
        let command = Command::decode("{\"Type\":\"list peers\"}\r").unwrap();
        assert_eq!(command, Command::ListPeers);
    }
}
