//! Upstream feed events and the state-delta wire codec.

use addressing::Address;
use serde::{Deserialize, Serialize};

use crate::error::{ProjectionError, Result};

/// Event type carrying the `(block_num, block_id)` commit notification.
pub const BLOCK_COMMIT_EVENT: &str = "ledger/block-commit";

/// Event type whose data payload is the length-prefixed state-change list.
pub const STATE_DELTA_EVENT: &str = "ledger/state-delta";

/// A key/value attribute attached to a feed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    pub value: String,
}

/// One event in an upstream batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
    #[serde(default)]
    pub data: Vec<u8>,
}

impl Event {
    /// Looks up an attribute value by key.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }

    /// Builds a block-commit notification.
    pub fn block_commit(block_num: i64, block_id: &str) -> Self {
        Self {
            event_type: BLOCK_COMMIT_EVENT.to_string(),
            attributes: vec![
                EventAttribute {
                    key: "block_num".to_string(),
                    value: block_num.to_string(),
                },
                EventAttribute {
                    key: "block_id".to_string(),
                    value: block_id.to_string(),
                },
            ],
            data: Vec::new(),
        }
    }

    /// Builds a state-delta notification from a change list.
    pub fn state_delta(changes: &[StateChange]) -> Self {
        Self {
            event_type: STATE_DELTA_EVENT.to_string(),
            attributes: Vec::new(),
            data: encode_state_changes(changes),
        }
    }
}

/// One changed `(address, value)` pair from a state-delta payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub address: Address,
    pub value: Vec<u8>,
}

/// Encodes a state-change list into the length-prefixed wire form:
/// a u32-BE entry count, then per entry a u32-BE address length, the address
/// bytes, a u32-BE value length, and the value bytes.
pub fn encode_state_changes(changes: &[StateChange]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(changes.len() as u32).to_be_bytes());
    for change in changes {
        let addr = change.address.as_str().as_bytes();
        out.extend_from_slice(&(addr.len() as u32).to_be_bytes());
        out.extend_from_slice(addr);
        out.extend_from_slice(&(change.value.len() as u32).to_be_bytes());
        out.extend_from_slice(&change.value);
    }
    out
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn read_u32(&mut self) -> Result<u32> {
        let end = self.pos + 4;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| ProjectionError::MalformedDelta("truncated length prefix".into()))?;
        self.pos = end;
        Ok(u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos + len;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| ProjectionError::MalformedDelta("truncated entry".into()))?;
        self.pos = end;
        Ok(slice)
    }
}

/// Decodes a state-delta payload into its change list.
pub fn decode_state_changes(bytes: &[u8]) -> Result<Vec<StateChange>> {
    let mut cursor = Cursor { bytes, pos: 0 };
    let count = cursor.read_u32()?;
    // The count is untrusted; each entry takes at least its two length
    // prefixes, so cap the pre-allocation at what the payload could hold.
    let mut changes = Vec::with_capacity((count as usize).min(bytes.len() / 8));
    for _ in 0..count {
        let addr_len = cursor.read_u32()? as usize;
        let addr = std::str::from_utf8(cursor.read_bytes(addr_len)?)
            .map_err(|_| ProjectionError::MalformedDelta("address is not utf-8".into()))?;
        let value_len = cursor.read_u32()? as usize;
        let value = cursor.read_bytes(value_len)?.to_vec();
        changes.push(StateChange {
            address: Address::new(addr),
            value,
        });
    }
    if cursor.pos != bytes.len() {
        return Err(ProjectionError::MalformedDelta(
            "trailing bytes after change list".into(),
        ));
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(addr: &str, value: &[u8]) -> StateChange {
        StateChange {
            address: Address::new(addr),
            value: value.to_vec(),
        }
    }

    #[test]
    fn round_trips_change_list() {
        let changes = vec![
            change(&"a".repeat(70), b"{\"actors\":[]}"),
            change(&"b".repeat(70), b""),
        ];
        let encoded = encode_state_changes(&changes);
        let decoded = decode_state_changes(&encoded).unwrap();
        assert_eq!(decoded, changes);
    }

    #[test]
    fn empty_list_round_trips() {
        let encoded = encode_state_changes(&[]);
        assert_eq!(decode_state_changes(&encoded).unwrap(), vec![]);
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let encoded = encode_state_changes(&[change(&"a".repeat(70), b"payload")]);
        let err = decode_state_changes(&encoded[..encoded.len() - 3]).unwrap_err();
        assert!(matches!(err, ProjectionError::MalformedDelta(_)));
    }

    #[test]
    fn huge_count_prefix_fails_without_allocating() {
        // A count with no entries behind it must surface as a malformed
        // payload, not a giant up-front allocation.
        let payload = u32::MAX.to_be_bytes();
        let err = decode_state_changes(&payload).unwrap_err();
        assert!(matches!(err, ProjectionError::MalformedDelta(_)));
    }

    #[test]
    fn count_exceeding_payload_is_rejected() {
        // Two entries announced, one present.
        let mut encoded = encode_state_changes(&[change(&"a".repeat(70), b"x")]);
        encoded[..4].copy_from_slice(&2u32.to_be_bytes());
        let err = decode_state_changes(&encoded).unwrap_err();
        assert!(matches!(err, ProjectionError::MalformedDelta(_)));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let mut encoded = encode_state_changes(&[]);
        encoded.push(0);
        let err = decode_state_changes(&encoded).unwrap_err();
        assert!(matches!(err, ProjectionError::MalformedDelta(_)));
    }

    #[test]
    fn attribute_lookup() {
        let event = Event::block_commit(100, "abc");
        assert_eq!(event.attribute("block_num"), Some("100"));
        assert_eq!(event.attribute("block_id"), Some("abc"));
        assert_eq!(event.attribute("missing"), None);
    }
}
