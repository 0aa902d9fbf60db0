//! Agent 阶段状态机
//!
//! idle -> thinking -> acting -> observing -> thinking ...；completed / failed / aborted 为终态，之后总是回到 idle。
//! 终态之间、终态到运行态都不允许（单调性）。

use serde::Serialize;

use crate::core::AgentError;

/// Agent 阶段
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPhase {
    #[default]
    Idle,
    Thinking,
    Acting,
    Observing,
    Completed,
    Failed,
    Aborted,
}

impl AgentPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentPhase::Completed | AgentPhase::Failed | AgentPhase::Aborted
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self,
            AgentPhase::Thinking | AgentPhase::Acting | AgentPhase::Observing
        )
    }

    /// 合法的阶段转移
    pub fn can_advance_to(&self, next: AgentPhase) -> bool {
        use AgentPhase::*;
        match (self, next) {
            (Idle, Thinking) => true,
            (Thinking, Acting) | (Acting, Observing) | (Observing, Thinking) => true,
            // 任何运行态都可以直接进入终态（finish / 错误 / 中止 / 步数耗尽）
            (from, to) if from.is_running() && to.is_terminal() => true,
            // 启动后、第一步之前中止
            (Idle, Aborted) => true,
            (from, Idle) if from.is_terminal() => true,
            _ => false,
        }
    }

    /// 校验后转移
    pub fn advance(&mut self, next: AgentPhase) -> Result<(), AgentError> {
        if !self.can_advance_to(next) {
            return Err(AgentError::InvalidTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_and_terminal_reset() {
        let mut phase = AgentPhase::Idle;
        for next in [
            AgentPhase::Thinking,
            AgentPhase::Acting,
            AgentPhase::Observing,
            AgentPhase::Thinking,
            AgentPhase::Completed,
            AgentPhase::Idle,
        ] {
            phase.advance(next).unwrap();
        }
        assert_eq!(phase, AgentPhase::Idle);
    }

    #[test]
    fn test_terminal_states_never_reverse() {
        for terminal in [AgentPhase::Completed, AgentPhase::Failed, AgentPhase::Aborted] {
            for next in [
                AgentPhase::Thinking,
                AgentPhase::Acting,
                AgentPhase::Observing,
                AgentPhase::Completed,
                AgentPhase::Failed,
            ] {
                let mut phase = terminal;
                assert!(phase.advance(next).is_err(), "{terminal:?} -> {next:?}");
                assert_eq!(phase, terminal);
            }
        }
    }

    #[test]
    fn test_cannot_skip_think() {
        let mut phase = AgentPhase::Idle;
        assert!(phase.advance(AgentPhase::Acting).is_err());
        let mut phase = AgentPhase::Thinking;
        assert!(phase.advance(AgentPhase::Observing).is_err());
    }
}
