//! Backpressure from downstream queue fill

use std::time::Duration;

const MAX_DELAY_MS: u128 = 10_000;
const MIN_EFFECTIVE_DELAY_MS: u128 = 1_000;

/// Pause before the next receive given the downstream fill
///
/// With threshold `T`, throttling starts at `0.9 * T`; the delay grows
/// linearly with the excess and is capped at 10s. Delays of 1s or less are
/// not worth taking and come back as zero. `T = 0` disables throttling.
pub fn throttle_delay(target_fill: u64, threshold: u64) -> Duration {
    if threshold == 0 {
        return Duration::ZERO;
    }
    // tenths, to keep 0.9 * T exact
    let fill = target_fill as u128 * 10;
    let start = threshold as u128 * 9;
    if fill <= start {
        return Duration::ZERO;
    }
    let delay_ms = ((fill - start) * 10_000 / threshold as u128).min(MAX_DELAY_MS);
    if delay_ms > MIN_EFFECTIVE_DELAY_MS {
        Duration::from_millis(delay_ms as u64)
    } else {
        Duration::ZERO
    }
}
