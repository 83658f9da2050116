//! Fuzz target for directed admission
//!
//! Arbitrary acquire/release sequences run through the directed mechanism
//! over an in-process state.
//!
//! # Invariants
//!
//! - No resource ever has more than one holder
//! - Distinct holders across the monitored subset never exceed `K_max`
//! - Unauthorized agents are never admitted
//! - Every admission is recorded, every rejection counted

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tracegate_core::{
    constraints::distinct_holders, default_subset, ConstraintSet, Directed, Mechanism,
    SystemState, DEFAULT_K_MAX,
};
use tracegate_proto::Interaction;
use tracegate_server::SystemEnv;

#[derive(Debug, Clone, Arbitrary)]
struct Attempt {
    agent: u8,
    resource: u8,
    acquire: bool,
}

fuzz_target!(|attempts: Vec<Attempt>| {
    let mut mechanism = Directed::new(SystemEnv::new(), ConstraintSet::standard());
    let mut state = SystemState::new(5, 3);
    let subset = default_subset();

    for (time, attempt) in attempts.iter().enumerate() {
        // a6 and r4 exist in no permission table.
        let agent = format!("a{}", attempt.agent % 6 + 1);
        let resource = format!("r{}", attempt.resource % 4 + 1);
        let interaction = if attempt.acquire {
            Interaction::acquire(agent.as_str(), resource.as_str(), time as u64)
        } else {
            Interaction::release(agent.as_str(), resource.as_str(), time as u64)
        };

        let (next, admitted) = mechanism.process(&state, &interaction);
        if agent == "a6" || resource == "r4" {
            assert!(!admitted, "unauthorized admission: {interaction}");
        }
        state = next;

        for r in state.resources() {
            assert!(state.resource_state(r).locks.len() <= 1, "double holder on {r}");
        }
        assert!(distinct_holders(&state, &subset) <= DEFAULT_K_MAX);
    }

    let stats = mechanism.stats();
    assert_eq!(stats.attempts, attempts.len() as u64);
    assert_eq!(mechanism.trace().len() as u64, stats.admitted());
});
