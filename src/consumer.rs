//! NATS subscriber for raw transactions

use crate::types::transaction::RawTransactionInput;
use anyhow::Result;
use async_nats::{Client, Message, Subscriber};
use tracing::info;

/// Consumer for receiving raw transactions from NATS
pub struct TransactionConsumer {
    client: Client,
    subject: String,
}

impl TransactionConsumer {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Subscribe to the transaction subject
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self.client.subscribe(self.subject.clone()).await?;
        info!(subject = %self.subject, "Subscribed to transaction subject");
        Ok(subscriber)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Decode a message payload as a flat JSON object of field values.
pub fn decode(message: &Message) -> serde_json::Result<RawTransactionInput> {
    decode_payload(&message.payload)
}

pub fn decode_payload(payload: &[u8]) -> serde_json::Result<RawTransactionInput> {
    serde_json::from_slice(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::transaction::RawValue;

    #[test]
    fn test_decode_payload() {
        let payload = br#"{"transaction_id": "tx_1", "amount": 42.5, "category": "misc_net", "zip": null}"#;
        let raw = decode_payload(payload).unwrap();

        assert_eq!(raw.transaction_id().as_deref(), Some("tx_1"));
        assert_eq!(raw.get("amount"), Some(&RawValue::Number(42.5)));
        assert_eq!(raw.get("zip"), None);
    }

    #[test]
    fn test_decode_keeps_nested_extra_fields() {
        let payload = br#"{"amount": 10.0, "category": "grocery_pos", "meta": {"source": "web"}}"#;
        let raw = decode_payload(payload).unwrap();

        assert_eq!(raw.len(), 3);
        assert_eq!(raw.get("category"), Some(&RawValue::from("grocery_pos")));
        assert!(matches!(raw.get("meta"), Some(RawValue::Other(_))));
    }

    #[test]
    fn test_decode_rejects_non_object() {
        assert!(decode_payload(b"[1, 2, 3]").is_err());
        assert!(decode_payload(b"not json").is_err());
    }
}
