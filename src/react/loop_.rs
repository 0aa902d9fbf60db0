//! 主循环：THINK -> ACT -> OBSERVE -> 重复
//!
//! - THINK：Planner 给出决策，Loop Guard 在执行前改写重复决策；finish 直接完成任务；
//! - ACT：经 Transport 投递到执行上下文；
//! - OBSERVE：结果写回对话，RecoveryEngine 更新连续失败计数并注入纠正提示。
//!
//! THINK / ACT 的错误终止任务（failed）；OBSERVE 的错误折叠为 system 提示。
//! 每个阶段开始前经 SessionSupervisor 确认任务仍然有效，中止后不再修改任务或发出事件。

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, AgentPhase, Escalation, RecoveryEngine, SessionSupervisor, Task, TaskOutcome, TaskReport};
use crate::memory::Message;
use crate::react::{EventKind, GuardVerdict, LoopGuard, Planner};
use crate::tools::{ActionKind, ActionResult, Decision};
use crate::transport::Transport;

/// 观察事件中结果文本的预览长度
const OBSERVATION_PREVIEW_CHARS: usize = 200;

pub struct AgentLoop {
    planner: Planner,
    guard: LoopGuard,
    recovery: RecoveryEngine,
    transport: Transport,
    step_delay: Duration,
}

/// 中止检查：任务不再有效时立刻以 Aborted 结束
macro_rules! live {
    ($cond:expr) => {
        if !$cond {
            return Ok(TaskOutcome::Aborted);
        }
    };
}

impl AgentLoop {
    pub fn new(
        planner: Planner,
        guard: LoopGuard,
        recovery: RecoveryEngine,
        transport: Transport,
        step_delay: Duration,
    ) -> Self {
        Self {
            planner,
            guard,
            recovery,
            transport,
            step_delay,
        }
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    /// 驱动任务直到终态
    pub async fn run(
        &self,
        mut task: Task,
        supervisor: &SessionSupervisor,
        cancel: CancellationToken,
    ) -> TaskReport {
        let id = task.id;
        let mut outcome = match self.drive(&mut task, supervisor, &cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(task_id = %id, step = task.step(), error = %e, "task failed");
                TaskOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        if outcome != TaskOutcome::Aborted && !supervisor.finish(id, &outcome) {
            outcome = TaskOutcome::Aborted;
        }
        if !task.phase().is_terminal() {
            let _ = task.advance(outcome.phase());
        }
        tracing::info!(task_id = %id, steps = task.step(), outcome = %outcome.message(), "task finished");
        task.into_report(outcome)
    }

    async fn drive(
        &self,
        task: &mut Task,
        supervisor: &SessionSupervisor,
        cancel: &CancellationToken,
    ) -> Result<TaskOutcome, AgentError> {
        let id = task.id;
        task.push_message(Message::system(self.planner.system_prompt()));
        task.push_message(Message::user(task.goal.clone()));
        tracing::info!(task_id = %id, goal = %task.goal, context = %task.context, "task started");

        loop {
            live!(!cancel.is_cancelled());
            if !task.begin_step() {
                return Ok(TaskOutcome::StepLimitReached {
                    steps: task.step(),
                });
            }
            let step = task.step();

            // THINK
            task.advance(AgentPhase::Thinking)?;
            live!(supervisor.publish(
                id,
                Some(AgentPhase::Thinking),
                Some((
                    EventKind::Thinking,
                    format!("Step {}/{}: thinking", step, task.max_steps())
                )),
            ));
            let proposed = self.planner.decide(task.messages()).await?;
            live!(!cancel.is_cancelled());

            let verdict = self.guard.review(proposed, task.history());
            let rewrite_note = match &verdict {
                GuardVerdict::Rewritten { original, decision } => {
                    tracing::warn!(
                        task_id = %id,
                        step,
                        original = %original.describe(),
                        rewritten = %decision.describe(),
                        "repeated decision rewritten"
                    );
                    Some(format!(
                        "{} repeats a recent action; {} instead ({})",
                        original.describe(),
                        decision.describe(),
                        decision.rationale
                    ))
                }
                GuardVerdict::Pass(_) => None,
            };
            let decision = verdict.into_decision();
            tracing::debug!(task_id = %id, step, action = %decision.action, target = ?decision.target, "decision");
            task.push_message(Message::assistant(serde_json::to_string(&decision)?));

            if decision.action == ActionKind::Finish {
                let summary = decision.summary.clone().unwrap_or_default();
                task.record(decision);
                return Ok(TaskOutcome::Completed { summary });
            }

            // ACT
            let request = decision
                .to_request()
                .ok_or_else(|| AgentError::InvalidDecision(decision.describe()))?;
            task.advance(AgentPhase::Acting)?;
            let action_message = match rewrite_note {
                Some(note) => note,
                None => format!("{}: {}", decision.describe(), decision.rationale),
            };
            live!(supervisor.publish(
                id,
                Some(AgentPhase::Acting),
                Some((EventKind::Action, action_message)),
            ));
            let result = self.transport.send(&task.context, &request).await?;
            live!(!cancel.is_cancelled());

            // OBSERVE
            task.advance(AgentPhase::Observing)?;
            live!(supervisor.publish(id, Some(AgentPhase::Observing), None));
            let escalation = self.observe(task, &decision, &result);
            tracing::debug!(
                task_id = %id,
                step,
                action = %decision.action,
                success = result.success,
                failures = task.consecutive_failures(),
                escalation = escalation.label(),
                "observed"
            );
            task.record(decision);
            live!(supervisor.emit(id, EventKind::Observation, observation_preview(&result)));

            tokio::select! {
                _ = cancel.cancelled() => return Ok(TaskOutcome::Aborted),
                _ = tokio::time::sleep(self.step_delay) => {}
            }
        }
    }

    /// 写回结果与纠正提示；内部错误只变成一条 system 提示
    fn observe(&self, task: &mut Task, decision: &Decision, result: &ActionResult) -> Escalation {
        let escalation = self
            .recovery
            .assess(task.failures_mut(), decision, result);

        match observation_message(decision, result) {
            Ok(msg) => task.push_message(Message::user(msg)),
            Err(e) => {
                tracing::warn!(task_id = %task.id, error = %e, "observation could not be recorded");
                task.push_message(Message::system(format!(
                    "The result of {} could not be recorded ({}). Re-examine the page with read_text before continuing.",
                    decision.describe(),
                    e
                )));
            }
        }
        if let Some(note) = escalation.note() {
            task.push_message(Message::system(note));
        }
        escalation
    }
}

fn observation_message(decision: &Decision, result: &ActionResult) -> Result<String, AgentError> {
    Ok(format!(
        "Result of {}:\n{}",
        decision.describe(),
        serde_json::to_string(result)?
    ))
}

fn observation_preview(result: &ActionResult) -> String {
    let text = if result.success {
        result.message.clone()
    } else {
        format!("Failed: {}", result.error_text())
    };
    if text.chars().count() > OBSERVATION_PREVIEW_CHARS {
        format!("{}...", text.chars().take(OBSERVATION_PREVIEW_CHARS).collect::<String>())
    } else {
        text
    }
}
