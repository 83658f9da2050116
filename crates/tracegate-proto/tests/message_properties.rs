//! Property tests for the line codec.
//!
//! Values must survive encode/decode unchanged, and arbitrary input must
//! never make the decoder panic.

use proptest::prelude::*;
use tracegate_proto::{
    Action, Interaction, ProtocolError, Request, ResourceState, decode_request, encode_line,
};

fn agent_id() -> impl Strategy<Value = String> {
    (1u8..16).prop_map(|i| format!("a{i}"))
}

fn resource_id() -> impl Strategy<Value = String> {
    (1u8..8).prop_map(|i| format!("r{i}"))
}

fn interaction() -> impl Strategy<Value = Interaction> {
    (agent_id(), resource_id(), any::<bool>(), any::<u64>()).prop_map(
        |(agent, resource, acquire, time)| {
            let action = if acquire { Action::Acquire } else { Action::Release };
            Interaction::new(agent, resource, action, time)
        },
    )
}

fn resource_state() -> impl Strategy<Value = ResourceState> {
    (
        resource_id(),
        prop::collection::btree_set(agent_id(), 0..4),
        prop::collection::btree_map(agent_id(), any::<bool>(), 0..8),
    )
        .prop_map(|(resource_id, locks, permissions)| ResourceState {
            resource_id,
            locks,
            permissions,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: Interaction survives JSON encoding
    #[test]
    fn prop_interaction_round_trip(original in interaction()) {
        let line = encode_line(&original)?;
        let decoded: Interaction = serde_json::from_slice(&line)?;
        prop_assert_eq!(decoded, original);
    }

    /// Property: ResourceState survives JSON encoding
    #[test]
    fn prop_resource_state_round_trip(original in resource_state()) {
        let line = encode_line(&original)?;
        let decoded: ResourceState = serde_json::from_slice(&line)?;
        prop_assert_eq!(decoded, original);
    }

    /// Property: interaction-carrying requests decode to what was encoded
    #[test]
    fn prop_request_round_trip(
        interaction in interaction(),
        snapshot in prop::option::of(resource_state()),
        admitted in any::<bool>(),
    ) {
        let requests = [
            Request::ProcessMp { interaction: interaction.clone() },
            Request::ProcessMl { interaction: interaction.clone(), snapshot: snapshot.clone() },
            Request::Commit { interaction: interaction.clone(), admitted, state_snapshot: snapshot },
            Request::ProcessMd { interaction },
        ];

        for request in requests {
            let line = encode_line(&request)?;
            prop_assert_eq!(decode_request(&line)?, request);
        }
    }

    /// Property: arbitrary bytes never panic the decoder
    #[test]
    fn prop_decoder_total_on_garbage(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = decode_request(&bytes);
    }

    /// Property: unknown type names are reported by name
    #[test]
    fn prop_unknown_type_reported(kind in "[A-Z_]{1,12}") {
        prop_assume!(!Request::KINDS.contains(&kind.as_str()));
        let line = format!("{{\"type\":\"{kind}\"}}");
        prop_assert_eq!(decode_request(line.as_bytes()), Err(ProtocolError::UnknownType(kind)));
    }
}
