//! Exponential backoff between pull attempts

use std::time::Duration;

/// Longest delay ever returned by [`delay`]
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Delay to wait after failed attempt number `attempt` (1-based)
///
/// Attempt 1 waits `base`, attempt k waits `base * 2^(k-1)`, never more than
/// [`MAX_BACKOFF`]. No jitter is applied. Attempt 0 is treated as attempt 1 and
/// arithmetic overflow saturates to the cap.
pub fn delay(attempt: u32, base: Duration) -> Duration {
    let exponent = attempt.max(1) - 1;

    2u32.checked_pow(exponent)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}
