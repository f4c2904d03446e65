use serde::{
    Deserialize,
    Serialize,
};

use crate::filter::FilterDefinition;

/// Envelope carried between the transport and the core, one JSON object per
/// line on the wire. Pooled on the fanout path; `reset` keeps the name's
/// allocation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub timestamp: i64,
}

impl Message {
    pub fn reset(&mut self) {
        self.name.clear();
        self.value = serde_json::Value::Null;
        self.timestamp = 0;
    }
}

/// First line sent by a connecting peer: whether it publishes or subscribes,
/// whether its writes are replicated copies, and the filter it wants applied
/// to its outbound stream.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionMessage {
    #[serde(default)]
    pub publisher: bool,
    #[serde(default)]
    pub replication: bool,
    #[serde(default)]
    pub filter_definition: FilterDefinition,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{
        Message,
        SubscriptionMessage,
    };

    #[test]
    fn test_message_roundtrips() {
        let message: Message =
            serde_json::from_str(r#"{"name":"temp","value":42.5,"timestamp":1000}"#).unwrap();
        assert_eq!(message.name, "temp");
        assert_eq!(message.value, serde_json::json!(42.5));
        assert_eq!(message.timestamp, 1000);

        let encoded = serde_json::to_string(&message).unwrap();
        assert_eq!(serde_json::from_str::<Message>(&encoded).unwrap(), message);
    }

    #[test]
    fn test_subscription_message_decodes_wire_form() {
        let subscription: SubscriptionMessage = serde_json::from_str(
            r#"{"publisher":false,"replication":false,"filterDefinition":{"granularity":2000000,"names":["bla","blup"]}}"#,
        )
        .unwrap();
        assert!(!subscription.publisher);
        assert_eq!(
            subscription.filter_definition.granularity,
            Duration::from_millis(2)
        );
        assert!(subscription.filter_definition.names.contains("bla"));
    }

    #[test]
    fn test_subscription_message_defaults() {
        let subscription: SubscriptionMessage = serde_json::from_str(r#"{"publisher":true}"#).unwrap();
        assert!(subscription.publisher);
        assert!(!subscription.replication);
        assert!(subscription.filter_definition.names.is_empty());
        assert!(subscription.filter_definition.granularity.is_zero());
    }

    #[test]
    fn test_reset_clears_fields() {
        let mut message = Message {
            name: "power".to_owned(),
            value: serde_json::json!("on"),
            timestamp: 123,
        };
        message.reset();
        assert_eq!(message, Message::default());
    }
}
