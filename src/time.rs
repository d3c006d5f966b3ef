//! Deadline arithmetic shared by everything that schedules on `tokio::time`.

use std::time::Duration;
use tokio::time::Instant;

/// Longest delay a deadline is allowed to carry. About thirty years, which is
/// still far beyond any timer that will actually be waited out.
pub(crate) const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `from + delay`, with `delay` capped at [`FAR_FUTURE`] so huge configured
/// durations never overflow `Instant`.
pub(crate) fn deadline_after(from: Instant, delay: Duration) -> Instant {
    from.checked_add(delay.min(FAR_FUTURE)).unwrap_or(from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn short_delays_are_exact() {
        let now = Instant::now();
        let delay = Duration::from_millis(250);
        assert_eq!(deadline_after(now, delay), now + delay);
        assert_eq!(deadline_after(now, Duration::ZERO), now);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_delays_are_capped() {
        let now = Instant::now();
        let deadline = deadline_after(now, Duration::MAX);
        assert_eq!(deadline, now + FAR_FUTURE);
        assert!(deadline > now);
    }
}
