//! 传输层：把动作请求送达承载页面的执行上下文
//!
//! 每次投递与固定超时赛跑；投递失败按 TransportError::recovery() 分类：
//! - Reinject：上下文过期 / 监听器不存在 -> 重新注入自动化脚本，再退避重试；
//! - Backoff：瞬时失败 -> 退避重试；
//! - Fatal：上下文不存在 -> 直接返回错误（任务失败）。
//! 超时不重试（请求可能已被执行，重发会重复点击），以 timed_out 结果交给 OBSERVE；
//! 重试耗尽返回失败的 ActionResult。

pub mod host;
pub mod retry;

#[cfg(feature = "browser")]
pub mod chrome;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::tools::{ActionRequest, ActionResult};

pub use host::{ContextHost, ContextId, LocalContextHost, Recovery, TransportError};
pub use retry::{RetryPolicy, MAX_ATTEMPTS_LIMIT, MAX_DELAY_LIMIT};

#[cfg(feature = "browser")]
pub use chrome::ChromeHost;

/// 带重试与恢复的传输层
pub struct Transport {
    host: Arc<dyn ContextHost>,
    policy: RetryPolicy,
    response_timeout: Duration,
}

impl Transport {
    pub fn new(host: Arc<dyn ContextHost>, policy: RetryPolicy, response_timeout: Duration) -> Self {
        Self {
            host,
            policy,
            response_timeout,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 投递一个请求；只有不可恢复的错误返回 Err
    pub async fn send(
        &self,
        context: &ContextId,
        request: &ActionRequest,
    ) -> Result<ActionResult, TransportError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error: Option<TransportError> = None;

        for attempt in 1..=max_attempts {
            let outcome = timeout(self.response_timeout, self.host.deliver(context, request)).await;
            let err = match outcome {
                Ok(Ok(result)) => return Ok(result),
                Err(_) => {
                    tracing::warn!(
                        context = %context,
                        action = %request.kind(),
                        attempt,
                        "no response before timeout"
                    );
                    return Ok(ActionResult::timeout(
                        request.kind(),
                        self.response_timeout.as_secs(),
                    ));
                }
                Ok(Err(e)) => e,
            };

            match err.recovery() {
                Recovery::Fatal => return Err(err),
                Recovery::Reinject => {
                    tracing::warn!(context = %context, attempt, error = %err, "context lost, re-injecting");
                    if let Err(inject_err) = self.host.inject(context).await {
                        if inject_err.recovery() == Recovery::Fatal {
                            return Err(inject_err);
                        }
                        tracing::warn!(context = %context, attempt, error = %inject_err, "re-injection failed");
                    }
                }
                Recovery::Backoff => {
                    tracing::warn!(context = %context, attempt, error = %err, "delivery failed");
                }
            }
            last_error = Some(err);

            if attempt < max_attempts {
                tokio::time::sleep(self.policy.delay_for(attempt)).await;
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        Ok(ActionResult::failure(format!(
            "Could not reach the page after {} attempts: {}",
            max_attempts, reason
        )))
    }
}
