//! Frame parsing.
//!
//! Incoming frames follow the consensus JSON-RPC convention: the useful
//! payload sits under `result.data.value.TxResult`, with `height`, the raw
//! transaction (base64), and `result.events[]` carrying key/value
//! attributes. Unknown event types are dropped silently.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;
use shared_crypto::sha256_hex;
use shared_types::{ChainEvent, Timestamp};

use super::mapping::canonical_for;

/// Stable event id: `hex(sha256(tx_hash || raw_type || attribute_index))`.
pub fn event_id(tx_hash: &str, raw_type: &str, attribute_index: u32) -> String {
    sha256_hex(format!("{tx_hash}{raw_type}{attribute_index}").as_bytes())
}

/// Parse one frame into canonical events. Frames that are not transaction
/// results (subscription acks, status replies) yield nothing.
pub fn parse_frame(raw: &str, now: Timestamp) -> Vec<ChainEvent> {
    let Ok(frame) = serde_json::from_str::<Value>(raw) else {
        return Vec::new();
    };
    let Some(tx_result) = frame.pointer("/result/data/value/TxResult") else {
        return Vec::new();
    };

    let block_height = tx_result
        .get("height")
        .map(height_value)
        .unwrap_or_default();
    let tx_hash = tx_hash_of(tx_result);

    let Some(events) = tx_result
        .pointer("/result/events")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    let mut parsed = Vec::new();
    for (index, event) in events.iter().enumerate() {
        let index = index as u32;
        let Some(raw_type) = event.get("type").and_then(Value::as_str) else {
            continue;
        };
        let attributes = attributes_of(event);

        // A `message` event is identified by its action attribute; anything
        // else may map by its own type. Unknown types drop silently.
        let raw_key = if raw_type == "message" {
            match attributes.get("action") {
                Some(action) => action.clone(),
                None => continue,
            }
        } else {
            raw_type.to_string()
        };
        let Some(canonical) = canonical_for(&raw_key) else {
            continue;
        };

        parsed.push(ChainEvent {
            event_id: event_id(&tx_hash, &raw_key, index),
            event_type: canonical.to_string(),
            block_height,
            timestamp: now,
            tx_hash: tx_hash.clone(),
            tx_index: index,
            attributes,
        });
    }
    parsed
}

/// Heights arrive as strings in the JSON-RPC encoding.
fn height_value(value: &Value) -> u64 {
    match value {
        Value::String(s) => s.parse().unwrap_or_default(),
        Value::Number(n) => n.as_u64().unwrap_or_default(),
        _ => 0,
    }
}

/// The transaction hash: taken from the frame when present, otherwise
/// derived as `sha256` of the raw transaction bytes.
fn tx_hash_of(tx_result: &Value) -> String {
    if let Some(hash) = tx_result.get("hash").and_then(Value::as_str) {
        return hash.to_uppercase();
    }
    let tx_b64 = tx_result.get("tx").and_then(Value::as_str).unwrap_or("");
    let tx_bytes = BASE64.decode(tx_b64).unwrap_or_default();
    sha256_hex(&tx_bytes).to_uppercase()
}

fn attributes_of(event: &Value) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    if let Some(attrs) = event.get("attributes").and_then(Value::as_array) {
        for attr in attrs {
            let (Some(key), Some(value)) = (
                attr.get("key").and_then(Value::as_str),
                attr.get("value").and_then(Value::as_str),
            ) else {
                continue;
            };
            map.insert(key.to_string(), value.to_string());
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(events: serde_json::Value) -> String {
        serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "data": {
                    "type": "tendermint/event/Tx",
                    "value": {
                        "TxResult": {
                            "height": "4242",
                            "tx": "dGVzdC10eA==",
                            "result": { "events": events }
                        }
                    }
                }
            }
        })
        .to_string()
    }

    fn now() -> Timestamp {
        Timestamp::from_secs(1_000)
    }

    #[test]
    fn test_parses_known_message_action() {
        let raw = frame(serde_json::json!([
            {
                "type": "message",
                "attributes": [
                    { "key": "action", "value": "CreateOrder" },
                    { "key": "order_id", "value": "o-1" }
                ]
            }
        ]));
        let events = parse_frame(&raw, now());
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.event_type, "order.created");
        assert_eq!(event.block_height, 4242);
        assert_eq!(event.attributes["order_id"], "o-1");
        assert_eq!(event.tx_index, 0);
        assert!(!event.tx_hash.is_empty());
    }

    #[test]
    fn test_unknown_types_dropped_silently() {
        let raw = frame(serde_json::json!([
            { "type": "message", "attributes": [{ "key": "action", "value": "MintNft" }] },
            { "type": "coin_spent", "attributes": [] },
            { "type": "message", "attributes": [{ "key": "action", "value": "CreateBid" }] }
        ]));
        let events = parse_frame(&raw, now());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "bid.created");
        assert_eq!(events[0].tx_index, 2); // position preserved for ordering
    }

    #[test]
    fn test_event_id_stable_and_distinct() {
        let raw = frame(serde_json::json!([
            { "type": "message", "attributes": [{ "key": "action", "value": "CreateOrder" }] },
            { "type": "message", "attributes": [{ "key": "action", "value": "CreateOrder" }] }
        ]));
        let first = parse_frame(&raw, now());
        let second = parse_frame(&raw, now());
        // Reproducible across parses...
        assert_eq!(first[0].event_id, second[0].event_id);
        // ...and distinct across positions in the same tx.
        assert_ne!(first[0].event_id, first[1].event_id);
    }

    #[test]
    fn test_non_tx_frames_ignored() {
        assert!(parse_frame("{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}", now()).is_empty());
        assert!(parse_frame("not json at all", now()).is_empty());
    }
}
