//! Event classification: turns a [`RawEvent`] (selector + opaque bytes) into
//! a typed [`ChainEvent`], per spec §6 — the event payload layout must match
//! the on-chain contract's schema exactly; a mismatch is a protocol error
//! that skips the one event without failing the batch (spec §7.2).

use crate::core::error::IndexerError;
use crate::core::types::{
    AgentRegistered, ChainEvent, EventKind, EventPayload, PromptConsumed, PromptPaid, RawEvent,
    Selector, TeeUnencumbered, TokenAdded, TokenRemoved, Transfer,
};
use alloy_primitives::B256;
use sha2::{Digest, Sha256};

/// Selector for an event kind: a hash of its canonical name, the same way a
/// real chain derives a log's `topic0` from the event signature. The exact
/// hash function is part of the ABI boundary CHAIN owns; the core only
/// needs a stable table to classify against.
pub fn selector_for(kind: EventKind) -> Selector {
    let mut hasher = Sha256::new();
    hasher.update(kind.to_string().as_bytes());
    B256::from_slice(&hasher.finalize())
}

fn kind_for_selector(selector: Selector) -> Option<EventKind> {
    EventKind::ALL.into_iter().find(|k| selector_for(*k) == selector)
}

/// Decode a raw event. Returns `Err` for an unknown selector or a payload
/// that fails to deserialize against the expected schema — both are
/// protocol-mismatch errors the caller should log and skip, not propagate.
pub fn decode(raw: &RawEvent) -> Result<ChainEvent, IndexerError> {
    let kind = kind_for_selector(raw.selector)
        .ok_or_else(|| IndexerError::Protocol(format!("unknown event selector {:#x}", raw.selector)))?;

    let payload = match kind {
        EventKind::AgentRegistered => {
            EventPayload::AgentRegistered(serde_json::from_slice::<AgentRegistered>(&raw.data)?)
        }
        EventKind::PromptPaid => EventPayload::PromptPaid(serde_json::from_slice::<PromptPaid>(&raw.data)?),
        EventKind::PromptConsumed => {
            EventPayload::PromptConsumed(serde_json::from_slice::<PromptConsumed>(&raw.data)?)
        }
        EventKind::TokenAdded => EventPayload::TokenAdded(serde_json::from_slice::<TokenAdded>(&raw.data)?),
        EventKind::TokenRemoved => EventPayload::TokenRemoved(serde_json::from_slice::<TokenRemoved>(&raw.data)?),
        EventKind::Transfer => EventPayload::Transfer(serde_json::from_slice::<Transfer>(&raw.data)?),
        EventKind::TeeUnencumbered => {
            EventPayload::TeeUnencumbered(serde_json::from_slice::<TeeUnencumbered>(&raw.data)?)
        }
    };

    Ok(ChainEvent {
        block: raw.block,
        log_index: raw.log_index,
        emitter: raw.emitter,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Address;

    #[test]
    fn selector_roundtrips_through_the_table() {
        for kind in EventKind::ALL {
            assert_eq!(kind_for_selector(selector_for(kind)), Some(kind));
        }
    }

    #[test]
    fn decode_rejects_unknown_selector() {
        let raw = RawEvent {
            block: 1,
            log_index: 0,
            emitter: Address::ZERO,
            selector: B256::repeat_byte(0xAB),
            data: vec![],
        };
        assert!(decode(&raw).is_err());
    }

    #[test]
    fn decode_rejects_malformed_payload() {
        let raw = RawEvent {
            block: 1,
            log_index: 0,
            emitter: Address::ZERO,
            selector: selector_for(EventKind::AgentRegistered),
            data: b"not json".to_vec(),
        };
        assert!(decode(&raw).is_err());
    }
}
