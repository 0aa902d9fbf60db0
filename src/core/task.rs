//! Task：一次用户目标的完整运行状态
//!
//! 只由主循环持有并修改；对外只暴露结束后的 TaskReport。

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::core::{AgentError, AgentPhase};
use crate::memory::{Message, Transcript};
use crate::tools::Decision;
use crate::transport::ContextId;

/// 单个任务
#[derive(Debug)]
pub struct Task {
    pub id: Uuid,
    pub goal: String,
    pub context: ContextId,
    pub created_at: DateTime<Utc>,
    step: usize,
    max_steps: usize,
    phase: AgentPhase,
    consecutive_failures: u32,
    transcript: Transcript,
    history: VecDeque<Decision>,
    history_capacity: usize,
}

impl Task {
    pub fn new(
        id: Uuid,
        goal: impl Into<String>,
        context: ContextId,
        max_steps: usize,
        history_capacity: usize,
    ) -> Self {
        Self {
            id,
            goal: goal.into(),
            context,
            created_at: Utc::now(),
            step: 0,
            max_steps,
            phase: AgentPhase::Idle,
            consecutive_failures: 0,
            transcript: Transcript::new(),
            history: VecDeque::new(),
            history_capacity: history_capacity.max(1),
        }
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn phase(&self) -> AgentPhase {
        self.phase
    }

    pub fn advance(&mut self, next: AgentPhase) -> Result<(), AgentError> {
        self.phase.advance(next)
    }

    /// 步数预算内则计数加一并返回 true；step 永远不超过 max_steps
    pub fn begin_step(&mut self) -> bool {
        if self.step >= self.max_steps {
            return false;
        }
        self.step += 1;
        true
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn failures_mut(&mut self) -> &mut u32 {
        &mut self.consecutive_failures
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn messages(&self) -> &[Message] {
        self.transcript.messages()
    }

    pub fn push_message(&mut self, msg: Message) {
        self.transcript.push(msg);
    }

    /// 追加已执行的决策；超出容量丢弃最旧的
    pub fn record(&mut self, decision: Decision) {
        self.history.push_back(decision);
        while self.history.len() > self.history_capacity {
            self.history.pop_front();
        }
    }

    /// 旧 -> 新
    pub fn history(&self) -> &VecDeque<Decision> {
        &self.history
    }

    /// 结束时的快照
    pub fn into_report(self, outcome: TaskOutcome) -> TaskReport {
        TaskReport {
            task_id: self.id,
            goal: self.goal,
            steps: self.step,
            outcome,
            transcript: self.transcript.messages().to_vec(),
            history: self.history.into_iter().collect(),
        }
    }
}

/// 任务结束方式
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskOutcome {
    Completed { summary: String },
    /// 步数耗尽：失败类结局，但不是错误
    StepLimitReached { steps: usize },
    Failed { reason: String },
    Aborted,
}

impl TaskOutcome {
    pub fn phase(&self) -> AgentPhase {
        match self {
            TaskOutcome::Completed { .. } => AgentPhase::Completed,
            TaskOutcome::StepLimitReached { .. } | TaskOutcome::Failed { .. } => AgentPhase::Failed,
            TaskOutcome::Aborted => AgentPhase::Aborted,
        }
    }

    /// 展示给用户的终态消息
    pub fn message(&self) -> String {
        match self {
            TaskOutcome::Completed { summary } => format!("Task completed: {}", summary),
            TaskOutcome::StepLimitReached { steps } => {
                format!("Task reached maximum steps ({}) without finishing", steps)
            }
            TaskOutcome::Failed { reason } => format!("Task failed: {}", reason),
            TaskOutcome::Aborted => "Task aborted by user".to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Completed { .. })
    }
}

/// 任务结束后的报告（由 TaskHandle 返回）
#[derive(Clone, Debug, Serialize)]
pub struct TaskReport {
    pub task_id: Uuid,
    pub goal: String,
    pub steps: usize,
    pub outcome: TaskOutcome,
    pub transcript: Vec<Message>,
    pub history: Vec<Decision>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(max_steps: usize) -> Task {
        Task::new(Uuid::new_v4(), "find shoes", ContextId::from("tab"), max_steps, 3)
    }

    #[test]
    fn test_step_never_exceeds_budget() {
        let mut t = task(2);
        assert!(t.begin_step());
        assert!(t.begin_step());
        assert!(!t.begin_step());
        assert_eq!(t.step(), 2);
    }

    #[test]
    fn test_history_is_bounded_oldest_dropped() {
        let mut t = task(10);
        for i in 0..5 {
            t.record(Decision::click(format!("#b{i}"), "r"));
        }
        let targets: Vec<_> = t
            .history()
            .iter()
            .map(|d| d.target.clone().unwrap_or_default())
            .collect();
        assert_eq!(targets, vec!["#b2", "#b3", "#b4"]);
    }

    #[test]
    fn test_outcome_messages_are_distinct() {
        let limit = TaskOutcome::StepLimitReached { steps: 10 };
        let failed = TaskOutcome::Failed {
            reason: "boom".into(),
        };
        assert_eq!(limit.phase(), AgentPhase::Failed);
        assert_eq!(failed.phase(), AgentPhase::Failed);
        assert!(limit.message().contains("maximum steps"));
        assert!(!failed.message().contains("maximum steps"));
    }
}
