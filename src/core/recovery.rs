//! 失败升级引擎（OBSERVE 阶段）
//!
//! 根据本步决策与执行结果更新连续失败计数，并给出写回对话的纠正提示：
//! - 成功：计数清零；提交类点击成功后提示「页面可能已跳转，先读内容」；
//! - 提交类点击超时：视为可能成功，计数减一并要求下一步用 read_text 验证；
//! - 第 1 次失败：按动作类型给出针对性建议；
//! - 连续 ≥2 次失败：要求调用 finish 并说明未完成的部分。

use crate::tools::{ActionKind, ActionResult, Decision, WHOLE_DOCUMENT};

/// 连续失败达到此值时强制收尾
pub const FORCE_FINISH_AFTER: u32 = 2;

/// OBSERVE 的升级结论
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Escalation {
    /// 成功且无需额外提示
    None,
    /// 提交类点击成功：页面大概率已跳转
    PageTransition(String),
    /// 提交类点击超时：按可能成功处理，下一步验证
    VerifyAfterTimeout(String),
    /// 首次失败的针对性建议
    Suggest(String),
    /// 连续失败，要求 finish
    ForceFinish(String),
}

impl Escalation {
    /// 需要写入对话的 system 提示
    pub fn note(&self) -> Option<&str> {
        match self {
            Escalation::None => None,
            Escalation::PageTransition(s)
            | Escalation::VerifyAfterTimeout(s)
            | Escalation::Suggest(s)
            | Escalation::ForceFinish(s) => Some(s),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Escalation::None => "none",
            Escalation::PageTransition(_) => "page_transition",
            Escalation::VerifyAfterTimeout(_) => "verify_after_timeout",
            Escalation::Suggest(_) => "suggest",
            Escalation::ForceFinish(_) => "force_finish",
        }
    }
}

/// 失败升级策略（确定性，不调用 LLM）
#[derive(Clone, Debug)]
pub struct RecoveryEngine {
    submit_keywords: Vec<String>,
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(vec!["submit".to_string(), "search".to_string()])
    }
}

impl RecoveryEngine {
    pub fn new(submit_keywords: Vec<String>) -> Self {
        Self { submit_keywords }
    }

    pub fn submit_keywords(&self) -> &[String] {
        &self.submit_keywords
    }

    /// 更新 failures 并返回升级结论
    pub fn assess(&self, failures: &mut u32, decision: &Decision, result: &ActionResult) -> Escalation {
        let submit_like = decision.is_submit_like(&self.submit_keywords);

        if result.success {
            *failures = 0;
            if submit_like {
                return Escalation::PageTransition(format!(
                    "The click on {} likely submitted a form and triggered a page transition. \
                     Inspect the new page with read_text on \"{}\" before acting again.",
                    decision.target.as_deref().unwrap_or_default(),
                    WHOLE_DOCUMENT
                ));
            }
            return Escalation::None;
        }

        if result.timed_out && submit_like {
            *failures = failures.saturating_sub(1);
            return Escalation::VerifyAfterTimeout(format!(
                "The click on {} timed out, which usually means the page navigated and the action worked. \
                 Do not repeat the click. Verify the outcome with read_text on \"{}\".",
                decision.target.as_deref().unwrap_or_default(),
                WHOLE_DOCUMENT
            ));
        }

        *failures += 1;
        if *failures >= FORCE_FINISH_AFTER {
            return Escalation::ForceFinish(format!(
                "{} consecutive actions have failed (last: {} - {}). \
                 Stop retrying. Call finish now and explain what could not be completed.",
                failures,
                decision.describe(),
                result.error_text()
            ));
        }

        Escalation::Suggest(suggestion_for(decision.action, result.error_text()))
    }
}

fn suggestion_for(kind: ActionKind, error: &str) -> String {
    let advice = match kind {
        ActionKind::Click => {
            "Use read_text to re-examine the page, or try a different locator \
             (for example button:contains(\"visible text\"))."
        }
        ActionKind::Type => {
            "Verify that the input field exists first with read_text, then retry with a locator \
             taken from the page summary's inputs."
        }
        ActionKind::ReadText => "Try a broader target such as \"body\" or a selector from the page summary.",
        ActionKind::Navigate => "Check the URL and make sure it is absolute (https://...).",
        ActionKind::Finish => "Call finish with a summary.",
    };
    format!("The last {} failed: {}. {}", kind, error, advice)
}
