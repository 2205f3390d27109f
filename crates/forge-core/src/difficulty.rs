//! Difficulty adjustment algorithm.
//!
//! Each block's difficulty is derived from its parent alone:
//!
//! ```text
//! sigma  = 2 if the parent includes uncles, else 1
//! adj    = max(sigma - (time - parent.time) / duration_step, -max_downward_steps)
//! diff   = parent.diff + parent.diff / bound_divisor * adj
//! diff   = max(diff, minimum)
//! diff  += 2^(period_count - 2)        when the scheduled term is active
//! ```
//!
//! Blocks arriving faster than `duration_step` raise the difficulty by one
//! step, slower blocks lower it by up to `max_downward_steps` steps. The
//! scheduled term grows exponentially with block height and is independent
//! of observed timing.
//!
//! # Determinism
//!
//! Everything is integer arithmetic on [`U256`]; identical inputs always
//! produce the identical output. Overflow saturates at `U256::MAX`.

use crate::config::{BombSchedule, DifficultyConfig};
use crate::types::{Header, U256};

/// Compute the difficulty a block created at `time` on top of `parent` must carry.
pub fn calc_difficulty(config: &DifficultyConfig, time: u64, parent: &Header) -> U256 {
    let sigma: u64 = if parent.has_uncles() { 2 } else { 1 };
    let elapsed_steps = time.saturating_sub(parent.timestamp) / config.duration_step.max(1);

    let step = parent.difficulty / U256::from(config.bound_divisor.max(1));
    let mut difficulty = if elapsed_steps < sigma {
        // Faster than the step window: raise.
        let up = sigma - elapsed_steps;
        parent
            .difficulty
            .saturating_add(step.saturating_mul(U256::from(up)))
    } else {
        let down = (elapsed_steps - sigma).min(config.max_downward_steps);
        parent
            .difficulty
            .saturating_sub(step.saturating_mul(U256::from(down)))
    };

    if difficulty < config.minimum {
        difficulty = config.minimum;
    }

    if let Some(bomb) = &config.bomb {
        difficulty = difficulty.saturating_add(bomb_term(bomb, parent.number.saturating_add(1)));
    }

    difficulty
}

/// The scheduled exponential term for a block at `number`.
///
/// Zero until `(number - delay) / period` exceeds 1, then `2^(period_count - 2)`.
pub fn bomb_term(bomb: &BombSchedule, number: u64) -> U256 {
    let fake_number = number.saturating_sub(bomb.delay);
    let period_count = fake_number / bomb.period.max(1);
    if period_count <= 1 {
        return U256::zero();
    }
    let exponent = period_count - 2;
    if exponent >= 256 {
        return U256::MAX;
    }
    U256::one() << (exponent as usize)
}
