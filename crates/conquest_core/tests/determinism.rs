//! Replaying identical inputs must reach identical states.

use conquest_core::command::{BuildKind, Command};
use conquest_core::state::MatchState;
use conquest_test_utils::determinism::{
    find_first_divergence, verify_determinism, verify_match_determinism, TickCommands,
};
use conquest_test_utils::fixtures::{duel, seeded_match};

fn opening_script() -> Vec<TickCommands> {
    let mut script: Vec<TickCommands> = vec![Vec::new(); 12];
    script.push(vec![
        (0, Command::Attack { from: 0, to: 1, half: false }),
        (1, Command::Attack { from: 99, to: 98, half: true }),
    ]);
    script.push(vec![
        (0, Command::Attack { from: 1, to: 3, half: false }),
        (0, Command::Build { kind: BuildKind::Collect, tile: 0 }),
    ]);
    script.extend(vec![Vec::new(); 10]);
    script
}

#[test]
fn seeded_setup_is_reproducible() {
    let result = verify_determinism(4, 0, || seeded_match(5, 99), |_, _| {}, MatchState::state_hash);
    result.assert_deterministic();
}

#[test]
fn different_seeds_place_differently() {
    assert_ne!(seeded_match(5, 1).state_hash(), seeded_match(5, 2).state_hash());
}

#[test]
fn scripted_duel_replays_identically() {
    let script = opening_script();
    let result = verify_match_determinism(|| duel(10, 10), &script, 3);
    result.assert_deterministic();
    assert_eq!(result.ticks, script.len() as u64);
    assert_eq!(find_first_divergence(|| duel(10, 10), &script), None);
}

#[test]
fn long_growth_run_is_stable() {
    let result = verify_determinism(
        3,
        500,
        || seeded_match(5, 7),
        |state, _| state.advance_turn(),
        MatchState::state_hash,
    );
    result.assert_deterministic();
}
