//! Pure encoding and parsing of MiniMQ protocol lines
//!
//! Every function here is free of I/O. Encoders always append the `\n`
//! terminator because the broker reads commands line by line.

use crate::error::{MiniMqError, MiniMqResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Broker reply when the polled topic has nothing pending.
pub const NO_MESSAGE: &str = "NO_MSG";

/// Separator between the three envelope segments.
pub const ENVELOPE_DELIMITER: &str = ":::";

pub const PRODUCE_COMMAND: &str = "PRODUCE";
pub const CONSUME_COMMAND: &str = "CONSUME";
pub const ACK_COMMAND: &str = "ACK";

/// One pending message as delivered by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Broker-assigned identifier, echoed back in `ACK`
    pub message_id: String,
    /// Positional placeholder; carried through untouched
    pub reserved: String,
    /// Raw JSON text of the message
    pub payload: String,
}

/// Parsed reply to a `CONSUME` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResponse {
    /// Queue was empty (`NO_MSG`)
    Empty,
    /// A message is pending acknowledgement
    Message(Envelope),
}

/// Serialize a message to its JSON text.
pub fn encode_payload<T: Serialize + ?Sized>(message: &T) -> MiniMqResult<String> {
    serde_json::to_string(message).map_err(MiniMqError::Serialization)
}

/// Build `PRODUCE:<topic>:<json>\n`.
pub fn encode_publish<T: Serialize + ?Sized>(topic: &str, message: &T) -> MiniMqResult<String> {
    let payload = encode_payload(message)?;
    Ok(format!("{PRODUCE_COMMAND}:{topic}:{payload}\n"))
}

/// Build `CONSUME:<topic>\n`.
pub fn encode_poll(topic: &str) -> String {
    format!("{CONSUME_COMMAND}:{topic}\n")
}

/// Build `ACK:<message_id>\n`.
pub fn encode_ack(message_id: &str) -> String {
    format!("{ACK_COMMAND}:{message_id}\n")
}

/// Parse one broker reply line (terminator already stripped).
///
/// The line is split on [`ENVELOPE_DELIMITER`] at most twice, so a payload
/// containing `:::` survives intact. Fewer than three segments yields
/// [`MiniMqError::MalformedResponse`].
pub fn parse_poll_response(line: &str) -> MiniMqResult<PollResponse> {
    if line == NO_MESSAGE {
        return Ok(PollResponse::Empty);
    }

    let mut parts = line.splitn(3, ENVELOPE_DELIMITER);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(message_id), Some(reserved), Some(payload)) => {
            Ok(PollResponse::Message(Envelope {
                message_id: message_id.to_string(),
                reserved: reserved.to_string(),
                payload: payload.to_string(),
            }))
        }
        _ => Err(MiniMqError::MalformedResponse(line.to_string())),
    }
}

/// Decode envelope payload text into any deserializable type.
pub fn decode_payload_as<T: DeserializeOwned>(text: &str) -> MiniMqResult<T> {
    serde_json::from_str(text).map_err(MiniMqError::Deserialization)
}

/// Decode envelope payload text into a JSON value.
pub fn decode_payload(text: &str) -> MiniMqResult<Value> {
    decode_payload_as(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_encode_publish_format() {
        let line = encode_publish("T", &json!({"a": 1})).unwrap();
        assert_eq!(line, "PRODUCE:T:{\"a\":1}\n");
    }

    #[test]
    fn test_encode_publish_scalar_and_list() {
        assert_eq!(encode_publish("T", &42).unwrap(), "PRODUCE:T:42\n");
        assert_eq!(
            encode_publish("T", &vec!["x", "y"]).unwrap(),
            "PRODUCE:T:[\"x\",\"y\"]\n"
        );
        assert_eq!(encode_publish("T", "hi").unwrap(), "PRODUCE:T:\"hi\"\n");
    }

    #[test]
    fn test_encode_publish_unrepresentable_value() {
        // Maps with non-string keys cannot become JSON objects
        let mut map = std::collections::HashMap::new();
        map.insert(vec![1u8], "value");

        let result = encode_publish("T", &map);
        assert!(matches!(result, Err(MiniMqError::Serialization(_))));
    }

    #[test]
    fn test_encode_poll_and_ack() {
        assert_eq!(encode_poll("USER_EVENTS"), "CONSUME:USER_EVENTS\n");
        assert_eq!(encode_ack("id1"), "ACK:id1\n");
    }

    #[test]
    fn test_parse_no_message() {
        assert_eq!(parse_poll_response("NO_MSG").unwrap(), PollResponse::Empty);
    }

    #[test]
    fn test_parse_no_message_is_exact_match() {
        // Anything other than the exact token goes through envelope parsing
        assert!(matches!(
            parse_poll_response("NO_MSG "),
            Err(MiniMqError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_poll_response("no_msg"),
            Err(MiniMqError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_parse_envelope() {
        let response = parse_poll_response("id1:::x:::{\"a\":1}").unwrap();
        assert_eq!(
            response,
            PollResponse::Message(Envelope {
                message_id: "id1".to_string(),
                reserved: "x".to_string(),
                payload: "{\"a\":1}".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_envelope_with_empty_segments() {
        let response = parse_poll_response("id1::::::{}").unwrap();
        match response {
            PollResponse::Message(envelope) => {
                assert_eq!(envelope.message_id, "id1");
                assert_eq!(envelope.reserved, "");
                assert_eq!(envelope.payload, "{}");
            }
            PollResponse::Empty => panic!("expected envelope"),
        }
    }

    #[test]
    fn test_parse_payload_keeps_delimiter() {
        let response = parse_poll_response("id9:::r:::{\"note\":\"a:::b\"}").unwrap();
        match response {
            PollResponse::Message(envelope) => {
                assert_eq!(envelope.payload, "{\"note\":\"a:::b\"}");
            }
            PollResponse::Empty => panic!("expected envelope"),
        }
    }

    #[test]
    fn test_parse_malformed() {
        let err = parse_poll_response("onlytwo:::parts").unwrap_err();
        assert!(matches!(err, MiniMqError::MalformedResponse(ref line) if line == "onlytwo:::parts"));

        assert!(parse_poll_response("garbage").is_err());
        assert!(parse_poll_response("").is_err());
    }

    #[test]
    fn test_decode_payload_failure() {
        let result = decode_payload("{not json");
        assert!(matches!(result, Err(MiniMqError::Deserialization(_))));
    }

    #[test]
    fn test_decode_payload_as_typed() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Login {
            username: String,
        }

        let login: Login = decode_payload_as("{\"username\":\"user_0\"}").unwrap();
        assert_eq!(login.username, "user_0");

        let mismatch: MiniMqResult<Login> = decode_payload_as("{\"user\":1}");
        assert!(matches!(mismatch, Err(MiniMqError::Deserialization(_))));
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            ".*".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::hash_map(".*", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn payload_round_trips(message in arb_json()) {
            let encoded = encode_payload(&message).unwrap();
            prop_assert_eq!(decode_payload(&encoded).unwrap(), message);
        }

        #[test]
        fn published_line_is_single_terminated_line(topic in "[A-Za-z0-9_.]{1,16}", message in arb_json()) {
            let line = encode_publish(&topic, &message).unwrap();
            prop_assert!(line.ends_with('\n'));
            // serde_json escapes control characters, so the body never breaks the framing
            prop_assert_eq!(line.matches('\n').count(), 1);
        }

        #[test]
        fn envelope_payload_survives_parsing(id in "[a-z0-9-]{1,12}", reserved in "[a-z]{0,4}", message in arb_json()) {
            let payload = encode_payload(&message).unwrap();
            let line = format!("{id}:::{reserved}:::{payload}");
            match parse_poll_response(&line).unwrap() {
                PollResponse::Message(envelope) => {
                    prop_assert_eq!(envelope.message_id, id);
                    prop_assert_eq!(envelope.reserved, reserved);
                    prop_assert_eq!(decode_payload(&envelope.payload).unwrap(), message);
                }
                PollResponse::Empty => prop_assert!(false, "expected envelope"),
            }
        }
    }
}
