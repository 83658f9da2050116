//! Fuzz target for the resource node state machine
//!
//! # Strategy
//!
//! - Mixed requests: descriptive, live and snapshotted local checks,
//!   coordinator commits, resets
//! - Targets: the node's own resource and a foreign one
//! - Agents: authorized, unknown
//!
//! # Invariants
//!
//! - Requests for a foreign resource are refused and leave no trace
//! - Every accepted processing request appends exactly one trace entry
//! - Live local checks alone never let two agents hold the resource
//! - Reset empties both locks and trace

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tracegate_proto::{Interaction, Request};
use tracegate_server::ResourceNode;

const AGENTS: [&str; 3] = ["a1", "a2", "a3"];

#[derive(Debug, Clone, Arbitrary)]
enum NodeOp {
    Descriptive { target: Target },
    LiveLocal { target: Target },
    SnapshotLocal { target: Target },
    Commit { target: Target, admitted: bool },
    Reset,
}

#[derive(Debug, Clone, Arbitrary)]
struct Target {
    agent: u8,
    acquire: bool,
    foreign: bool,
}

impl Target {
    fn interaction(&self, time: u64) -> Interaction {
        let agent = if self.agent as usize >= AGENTS.len() { "intruder" } else { AGENTS[self.agent as usize] };
        let resource = if self.foreign { "r9" } else { "r1" };
        if self.acquire {
            Interaction::acquire(agent, resource, time)
        } else {
            Interaction::release(agent, resource, time)
        }
    }
}

fuzz_target!(|ops: Vec<NodeOp>| {
    let mut node = ResourceNode::new("r1", AGENTS);
    let mut only_live_local = true;

    for (time, op) in ops.into_iter().enumerate() {
        let time = time as u64;
        let before = node.trace().len();
        let (request, foreign) = match &op {
            NodeOp::Descriptive { target } => {
                only_live_local = false;
                (Request::ProcessMp { interaction: target.interaction(time) }, target.foreign)
            }
            NodeOp::LiveLocal { target } => (
                Request::ProcessMl { interaction: target.interaction(time), snapshot: None },
                target.foreign,
            ),
            NodeOp::SnapshotLocal { target } => {
                only_live_local = false;
                let snapshot = Some(node.state().clone());
                (Request::ProcessMl { interaction: target.interaction(time), snapshot }, target.foreign)
            }
            NodeOp::Commit { target, admitted } => {
                only_live_local = false;
                let request = Request::Commit {
                    interaction: target.interaction(time),
                    admitted: *admitted,
                    state_snapshot: None,
                };
                (request, target.foreign)
            }
            NodeOp::Reset => {
                only_live_local = true;
                (Request::Reset { agents: AGENTS.iter().map(|a| a.to_string()).collect() }, false)
            }
        };

        let result = node.handle(request);
        match op {
            NodeOp::Reset => {
                assert!(result.is_ok());
                assert!(node.trace().is_empty());
                assert!(node.state().locks.is_empty());
            }
            _ if foreign => {
                assert!(result.is_err(), "foreign resource accepted: {op:?}");
                assert_eq!(node.trace().len(), before);
            }
            _ => {
                assert!(result.is_ok(), "own resource refused: {op:?}");
                assert_eq!(node.trace().len(), before + 1);
            }
        }

        if only_live_local {
            assert!(node.state().locks.len() <= 1, "double holder: {:?}", node.state().locks);
        }
    }
});
