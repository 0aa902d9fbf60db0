//! 投递重试策略：最多 N 次，指数退避（每次翻倍，封顶）

use std::time::Duration;

/// 单个动作投递次数的上限
pub const MAX_ATTEMPTS_LIMIT: u32 = 5;
/// 退避间隔的上限
pub const MAX_DELAY_LIMIT: Duration = Duration::from_secs(5);

/// 重试策略
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 单个动作的最大投递次数（含首次）
    pub max_attempts: u32,
    /// 第一次重试前的等待
    pub base_delay: Duration,
    /// 退避上限
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// 收敛到允许范围：1..=MAX_ATTEMPTS_LIMIT 次、退避不超过 MAX_DELAY_LIMIT
    pub fn bounded(self) -> Self {
        let max_delay = self.max_delay.min(MAX_DELAY_LIMIT);
        Self {
            max_attempts: self.max_attempts.clamp(1, MAX_ATTEMPTS_LIMIT),
            base_delay: self.base_delay.min(max_delay),
            max_delay,
        }
    }

    /// 第 attempt 次（从 1 开始）失败后、下一次投递前的等待：base * 2^(attempt-1)，不超过 max_delay
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exp;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// 全部退避序列（max_attempts - 1 个间隔）
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|a| self.delay_for(a)).collect()
    }
}
