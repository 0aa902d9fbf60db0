//! Loop Guard：执行前拦截不产生进展的重复决策
//!
//! 与最近两条已执行决策比较（动作 + 目标相同即视为重复），确定性改写：
//! navigate / click / type -> read_text(body)；read_text -> finish。finish 原样放行。

use crate::tools::{ActionKind, Decision};

/// 比较窗口
pub const GUARD_WINDOW: usize = 2;

/// Guard 的结论
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardVerdict {
    Pass(Decision),
    Rewritten { original: Decision, decision: Decision },
}

impl GuardVerdict {
    pub fn decision(&self) -> &Decision {
        match self {
            GuardVerdict::Pass(d) => d,
            GuardVerdict::Rewritten { decision, .. } => decision,
        }
    }

    pub fn into_decision(self) -> Decision {
        match self {
            GuardVerdict::Pass(d) => d,
            GuardVerdict::Rewritten { decision, .. } => decision,
        }
    }

    pub fn is_rewritten(&self) -> bool {
        matches!(self, GuardVerdict::Rewritten { .. })
    }
}

#[derive(Clone, Debug)]
pub struct LoopGuard {
    window: usize,
}

impl Default for LoopGuard {
    fn default() -> Self {
        Self {
            window: GUARD_WINDOW,
        }
    }
}

impl LoopGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// history 为旧 -> 新
    pub fn review<'a, I>(&self, proposed: Decision, history: I) -> GuardVerdict
    where
        I: IntoIterator<Item = &'a Decision>,
        I::IntoIter: DoubleEndedIterator,
    {
        if proposed.action == ActionKind::Finish {
            return GuardVerdict::Pass(proposed);
        }
        let repeated = history
            .into_iter()
            .rev()
            .take(self.window)
            .any(|prev| prev.same_step(&proposed));
        if !repeated {
            return GuardVerdict::Pass(proposed);
        }

        let decision = match proposed.action {
            ActionKind::Navigate => {
                Decision::read_page("already navigated, extracting content to proceed")
            }
            ActionKind::Click => Decision::read_page("previous click failed, re-examining page"),
            ActionKind::Type => {
                Decision::read_page("text was already entered, re-examining page")
            }
            ActionKind::ReadText => Decision::finish(
                "task appears complete based on previous actions",
                "content was already read, finishing to avoid a loop",
            ),
            ActionKind::Finish => return GuardVerdict::Pass(proposed),
        };
        GuardVerdict::Rewritten {
            original: proposed,
            decision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::WHOLE_DOCUMENT;

    #[test]
    fn test_repeated_navigate_becomes_read_text() {
        let history = vec![Decision::navigate("https://x.test", "open")];
        let verdict = LoopGuard::new().review(Decision::navigate("https://x.test", "again"), &history);
        assert!(verdict.is_rewritten());
        let d = verdict.decision();
        assert_eq!(d.action, ActionKind::ReadText);
        assert_eq!(d.target.as_deref(), Some(WHOLE_DOCUMENT));
        assert!(d.rationale.contains("already navigated"));
    }

    #[test]
    fn test_repeated_click_becomes_read_text() {
        let history = vec![Decision::click(".missing", "try")];
        let verdict = LoopGuard::new().review(Decision::click(".missing", "retry"), &history);
        assert_eq!(verdict.decision().action, ActionKind::ReadText);
        assert!(verdict.decision().rationale.contains("previous click failed"));
    }

    #[test]
    fn test_repeated_read_text_becomes_finish() {
        let history = vec![Decision::read_page("look")];
        let verdict = LoopGuard::new().review(Decision::read_page("look again"), &history);
        let d = verdict.decision();
        assert_eq!(d.action, ActionKind::Finish);
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_rewrite_always_changes_kind() {
        for proposed in [
            Decision::navigate("u", "r"),
            Decision::click("c", "r"),
            Decision::type_text("t", "x", "r"),
            Decision::read_text("h1", "r"),
        ] {
            let history = vec![proposed.clone()];
            let verdict = LoopGuard::new().review(proposed.clone(), &history);
            assert_ne!(verdict.decision().action, proposed.action);
        }
    }

    #[test]
    fn test_window_is_two() {
        let history = vec![
            Decision::click("#a", "r"),
            Decision::read_text("h1", "r"),
            Decision::navigate("u", "r"),
        ];
        let guard = LoopGuard::new();
        // #a 已超出最近两条
        assert!(!guard.review(Decision::click("#a", "r"), &history).is_rewritten());
        assert!(guard.review(Decision::read_text("h1", "r"), &history).is_rewritten());
    }

    #[test]
    fn test_different_target_passes() {
        let history = vec![Decision::click("#a", "r")];
        assert!(!LoopGuard::new()
            .review(Decision::click("#b", "r"), &history)
            .is_rewritten());
    }

    #[test]
    fn test_finish_passes() {
        let history = vec![Decision::finish("done", "r")];
        assert!(!LoopGuard::new()
            .review(Decision::finish("done", "r"), &history)
            .is_rewritten());
    }
}
