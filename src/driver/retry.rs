//! 재시도 타이머
//!
//! 최소 `at_least` 번은 시도하고, 그 뒤로는 시간 예산이 남아 있는 동안
//! 계속 시도합니다.

use std::time::Duration;

use tokio::time::Instant;

/// 시도 사이 대기 시간의 상한
pub const MAX_SNOOZE: Duration = Duration::from_secs(5);

/// 재시도 타이머
#[derive(Debug, Clone)]
pub struct RetryTimer {
    at_least: usize,
    started: Instant,
    deadline: Instant,
    attempts: usize,
    snooze: Duration,
}

impl RetryTimer {
    /// 최소 `at_least` 번, 이후 `timeout` 이 지날 때까지
    pub fn repeat(at_least: usize, timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            at_least,
            started,
            deadline: started + timeout,
            attempts: 0,
            snooze: Duration::ZERO,
        }
    }

    /// 두 번째 시도부터 `snooze * 시도 횟수` 만큼 쉼 ([`MAX_SNOOZE`] 상한)
    pub fn with_snooze(mut self, snooze: Duration) -> Self {
        self.snooze = snooze;
        self
    }

    /// 지금까지의 시도 횟수
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// 남은 시간 예산
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// 한 번 더 시도해도 되는지
    pub fn has_next(&self) -> bool {
        self.attempts < self.at_least || !self.remaining().is_zero()
    }

    /// 다음 시도 차례가 되면 `true`. 필요하면 먼저 쉽니다.
    pub async fn next_attempt(&mut self) -> bool {
        if !self.has_next() {
            return false;
        }
        if self.attempts > 0 && !self.snooze.is_zero() {
            let factor = u32::try_from(self.attempts).unwrap_or(u32::MAX);
            let delay = self.snooze.saturating_mul(factor).min(MAX_SNOOZE);
            tokio::time::sleep(delay).await;
        }
        self.attempts += 1;
        true
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_at_least_even_without_budget() {
        let mut timer = RetryTimer::repeat(3, Duration::ZERO);
        let mut n = 0;
        while timer.next_attempt().await {
            n += 1;
        }
        assert_eq!(n, 3);
        assert_eq!(timer.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_continues_until_budget_spent() {
        let mut timer = RetryTimer::repeat(1, Duration::from_secs(10)).with_snooze(Duration::from_secs(1));
        let mut n = 0;
        while timer.next_attempt().await {
            n += 1;
        }
        // 1, 2, 3, 4초를 쉬며 다섯 번 시도한 뒤 예산 소진
        assert_eq!(n, 5);
        assert!(timer.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snooze_is_capped() {
        let mut timer = RetryTimer::repeat(3, Duration::ZERO).with_snooze(Duration::from_secs(4));
        while timer.next_attempt().await {}
        // 4초 + 5초(상한)
        assert!(timer.elapsed() >= Duration::from_secs(9));
        assert!(timer.elapsed() < Duration::from_secs(10));
    }
}
