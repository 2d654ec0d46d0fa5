// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::time::Duration;

/// Returns the next round to come at the given time, together with the unix
/// timestamp at which it is scheduled.
///
/// Round 1 is scheduled exactly at genesis time and round `r` at
/// `genesis + (r-1) * period`. Before genesis the next round is always round
/// 1. At an exact period boundary the round scheduled at that instant is
/// considered current, so the *next* round is the following one.
pub fn next_round(now: i64, period: Duration, genesis: i64) -> (u64, i64) {
    let period = period.as_secs() as i64;
    debug_assert!(period > 0, "round period must be non-zero");
    if now < genesis {
        return (1, genesis);
    }
    let from_genesis = now - genesis;
    // We compute the number of elapsed periods since genesis, then add +1 to
    // get to the next one and +1 again because round 1 starts at genesis.
    let next = (from_genesis / period) as u64 + 2;
    let time = genesis + (next as i64 - 1) * period;
    (next, time)
}

/// Returns the round in progress at the given time: the highest round whose
/// scheduled time is not in the future. Returns 0 before genesis.
pub fn current_round(now: i64, period: Duration, genesis: i64) -> u64 {
    let (next, _) = next_round(now, period, genesis);
    next - 1
}

/// Unix timestamp at which the given round (>= 1) is scheduled.
pub fn time_of_round(period: Duration, genesis: i64, round: u64) -> i64 {
    genesis + (round as i64 - 1) * period.as_secs() as i64
}
