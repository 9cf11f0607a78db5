use std::ops::RangeInclusive;
use std::time::Duration;
use std::thread;
use rand::Rng;
use log::{debug, info};

/// Polite pause between two result pages. A `0..=0` range disables it.
pub fn random_page_delay(range_ms: &RangeInclusive<u64>) {
    if range_ms.is_empty() || *range_ms.end() == 0 {
        return;
    }
    let mut rng = rand::thread_rng();
    let delay_ms = rng.gen_range(range_ms.clone());
    debug!("Waiting for {} ms (Page Delay)...", delay_ms);
    thread::sleep(Duration::from_millis(delay_ms));
}

/// Exponential backoff: `base * 2^(attempt - 1)`, attempt being 1-based.
pub fn backoff(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent)
}

pub fn rate_limit_delay(base: Duration, attempt: u32) {
    let wait = backoff(base, attempt);
    if wait.is_zero() {
        return;
    }
    info!("Waiting for {:?} (Rate Limit Backoff)...", wait);
    thread::sleep(wait);
}
