//! Fuzz target for the [`Ledger`] operation set
//!
//! Every externally exposed operation must commit fully or not at all, and
//! agree with the reference model.
//!
//! # Strategy
//!
//! - Operation sequences: Arbitrary registrations, room creations,
//!   membership changes, posts, reads, and clock advances
//! - Boundary texts: Empty, short, at-limit, and one-over-limit fields
//! - Identity probing: Null members, non-owners, owners removing themselves
//!
//! # Invariants
//!
//! - Model and real ledger return the same result for every operation
//! - Message ids are dense and strictly increasing
//! - Every room index agrees with the room's `message_count`
//! - NEVER panic on any operation sequence

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use roomledger_harness::{LedgerDriver, ModelWorld, Operation, OperationResult, SIM_EPOCH};

#[derive(Debug, Arbitrary)]
struct Scenario {
    cooldown: u8,
    ops: Vec<Operation>,
}

const NUM_CLIENTS: u8 = 4;

fuzz_target!(|scenario: Scenario| {
    let cooldown = u64::from(scenario.cooldown);
    let clients = usize::from(NUM_CLIENTS);
    let mut model = ModelWorld::with_cooldown(clients, SIM_EPOCH, cooldown);
    let mut real = LedgerDriver::with_cooldown(clients, SIM_EPOCH, cooldown);
    let mut next_message = 0u64;

    for op in scenario.ops.into_iter().take(256) {
        let op = &op.clamped(NUM_CLIENTS);
        let model_result = model.apply(op);
        let real_result = real.apply(op);
        assert_eq!(model_result, real_result, "divergence on {op:?}");

        if let (Operation::Post { .. }, OperationResult::Id(id)) = (op, &real_result) {
            assert_eq!(*id, next_message, "message ids must be dense");
            next_message += 1;
        }
    }

    let state = real.observable_state();
    assert_eq!(state, model.observable_state());
    assert_eq!(state.total_messages, next_message);

    for (room_id, (_, _, ids)) in state.rooms.iter().enumerate() {
        let room = real.ledger().get_room(room_id as u64).expect("listed room exists");
        assert_eq!(ids.len() as u64, room.message_count);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }
});
