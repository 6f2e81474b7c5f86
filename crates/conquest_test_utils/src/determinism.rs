//! Determinism testing utilities.
//!
//! The server's tick loop is the only writer of a match, so replaying the
//! same commands on the same setup must always reach the same state. This
//! harness replays scripts and compares [`MatchState::state_hash`] values.
//!
//! Sources of non-determinism guarded against:
//!
//! - **Hash-ordered iteration**: structure and loser sets are `BTreeSet`s.
//! - **System randomness**: capital placement uses the seed in
//!   [`MatchConfig`](conquest_core::state::MatchConfig).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use conquest_core::command::Command;
use conquest_core::state::{MatchState, PlayerIndex};

/// Commands applied during one tick, in order.
pub type TickCommands = Vec<(PlayerIndex, Command)>;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic run).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that every run matched, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Match replay is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `ticks` - Number of steps per run
/// * `setup` - Creates the initial state
/// * `step` - Advances the state by one step
/// * `hash` - Computes the state hash
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S, u64),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for tick in 0..ticks {
            step(&mut state, tick);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Applies one tick of commands, then advances the turn when `grow` is set.
/// Returns how many commands took effect.
pub fn apply_tick(state: &mut MatchState, commands: &[(PlayerIndex, Command)], grow: bool) -> usize {
    let applied = commands
        .iter()
        .filter(|(player, command)| state.apply(*player, command))
        .count();
    if grow {
        state.advance_turn();
    }
    applied
}

/// Replays a command script `runs` times and compares final hashes.
///
/// Growth runs after every second tick, like the server's default cadence.
pub fn verify_match_determinism<F>(setup: F, script: &[TickCommands], runs: usize) -> DeterminismResult
where
    F: Fn() -> MatchState,
{
    verify_determinism(
        runs,
        script.len() as u64,
        setup,
        |state, tick| {
            let commands = usize::try_from(tick).ok().and_then(|t| script.get(t));
            apply_tick(state, commands.map_or(&[][..], Vec::as_slice), tick % 2 == 0);
        },
        MatchState::state_hash,
    )
}

/// Replays a script on two fresh states and reports the first tick whose
/// hashes differ.
///
/// # Returns
///
/// `None` if the runs never diverge, `Some(tick)` otherwise. Tick 0 is the
/// initial state.
pub fn find_first_divergence<F>(setup: F, script: &[TickCommands]) -> Option<u64>
where
    F: Fn() -> MatchState,
{
    let mut a = setup();
    let mut b = setup();

    if a.state_hash() != b.state_hash() {
        return Some(0);
    }

    for (tick, commands) in (1..).zip(script) {
        let grow = tick % 2 == 1;
        apply_tick(&mut a, commands, grow);
        apply_tick(&mut b, commands, grow);

        if a.state_hash() != b.state_hash() {
            return Some(tick);
        }
    }

    None
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for rules and codec testing.
pub mod strategies {
    use conquest_core::command::{BuildKind, Command};
    use conquest_core::state::PlayerIndex;
    use proptest::prelude::*;

    use super::TickCommands;

    /// Any construction kind.
    pub fn arb_build_kind() -> impl Strategy<Value = BuildKind> {
        prop::sample::select(BuildKind::DRAIN_ORDER.to_vec())
    }

    /// A command targeting tiles below `tiles`. Mostly attacks between
    /// neighbouring indices so that a useful share of them are legal.
    pub fn arb_command(width: usize, tiles: usize) -> impl Strategy<Value = Command> {
        let steps = vec![1, width, 0, 2];
        prop_oneof![
            4 => (0..tiles, prop::sample::select(steps), any::<bool>(), any::<bool>()).prop_map(
                move |(from, step, backwards, half)| {
                    let to = if backwards {
                        from.saturating_sub(step)
                    } else {
                        (from + step).min(tiles - 1)
                    };
                    Command::Attack { from, to, half }
                }
            ),
            1 => (arb_build_kind(), 0..tiles).prop_map(|(kind, tile)| Command::Build { kind, tile }),
        ]
    }

    /// A command issued by one of `players`.
    pub fn arb_player_command(
        players: usize,
        width: usize,
        tiles: usize,
    ) -> impl Strategy<Value = (PlayerIndex, Command)> {
        (0..players, arb_command(width, tiles))
    }

    /// A script of up to `max_ticks` ticks, each with up to four commands.
    pub fn arb_script(
        players: usize,
        width: usize,
        tiles: usize,
        max_ticks: usize,
    ) -> impl Strategy<Value = Vec<TickCommands>> {
        prop::collection::vec(
            prop::collection::vec(arb_player_command(players, width, tiles), 0..4),
            1..max_ticks,
        )
    }

    /// Wire-like integer arrays: small values including the `-1` and `-2`
    /// terrain sentinels.
    pub fn arb_wire_array(max_len: usize) -> impl Strategy<Value = Vec<i64>> {
        prop::collection::vec(-2i64..8, 0..max_len)
    }

    /// Two arrays of equal length that differ in a sparse set of positions.
    pub fn arb_similar_arrays(max_len: usize) -> impl Strategy<Value = (Vec<i64>, Vec<i64>)> {
        arb_wire_array(max_len).prop_flat_map(|old| {
            let len = old.len();
            (
                Just(old),
                prop::collection::vec(prop::option::weighted(0.2, -2i64..8), len),
            )
                .prop_map(|(old, edits)| {
                    let new = old
                        .iter()
                        .zip(edits)
                        .map(|(&value, edit)| edit.unwrap_or(value))
                        .collect();
                    (old, new)
                })
        })
    }
}
