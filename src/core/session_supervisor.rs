//! 会话监管：单任务槽位、中止与事件闸门
//!
//! 槽位（Mutex<Option<ActiveSession>>）同一时刻只容纳一个任务，claim 是显式的 check-and-set，
//! 已有任务运行时拒绝新的启动。
//! 主循环发出的事件与阶段变化都要先在持锁状态下确认「自己仍占有槽位」，因此 abort 之后
//! 旧任务再也发不出任何事件：中止后唯一可见的事件就是 task_aborted。

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::{AgentError, AgentPhase, TaskOutcome};
use crate::react::{EventKind, EventSink, ProgressEvent};

#[derive(Debug)]
struct ActiveSession {
    id: Uuid,
    cancel: CancellationToken,
}

/// stop 的应答
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopAck {
    Stopped(Uuid),
    NoTaskRunning,
}

pub struct SessionSupervisor {
    slot: Mutex<Option<ActiveSession>>,
    sink: Arc<dyn EventSink>,
    phase_tx: watch::Sender<AgentPhase>,
}

impl SessionSupervisor {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        let (phase_tx, _) = watch::channel(AgentPhase::Idle);
        Self {
            slot: Mutex::new(None),
            sink,
            phase_tx,
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 占用槽位；返回新任务 id 与其取消令牌
    pub fn claim(&self) -> Result<(Uuid, CancellationToken), AgentError> {
        let mut slot = self.slot();
        if let Some(active) = slot.as_ref() {
            return Err(AgentError::TaskAlreadyRunning(active.id));
        }
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        *slot = Some(ActiveSession {
            id,
            cancel: cancel.clone(),
        });
        Ok((id, cancel))
    }

    pub fn current(&self) -> Option<Uuid> {
        self.slot().as_ref().map(|s| s.id)
    }

    pub fn phase(&self) -> AgentPhase {
        *self.phase_tx.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<AgentPhase> {
        self.phase_tx.subscribe()
    }

    /// 仅当 id 仍占有槽位时发布阶段与事件；返回 false 表示任务已被中止
    pub fn publish(&self, id: Uuid, phase: Option<AgentPhase>, event: Option<(EventKind, String)>) -> bool {
        let slot = self.slot();
        if !matches!(slot.as_ref(), Some(s) if s.id == id && !s.cancel.is_cancelled()) {
            return false;
        }
        if let Some(phase) = phase {
            self.phase_tx.send_replace(phase);
        }
        if let Some((kind, message)) = event {
            self.sink.emit(ProgressEvent::new(kind, message));
        }
        true
    }

    pub fn emit(&self, id: Uuid, kind: EventKind, message: impl Into<String>) -> bool {
        self.publish(id, None, Some((kind, message.into())))
    }

    /// 任务正常结束（完成 / 失败 / 步数耗尽）：发终态事件、释放槽位、回到 idle。
    /// 已被中止时什么也不做并返回 false。
    pub fn finish(&self, id: Uuid, outcome: &TaskOutcome) -> bool {
        let mut slot = self.slot();
        if !matches!(slot.as_ref(), Some(s) if s.id == id && !s.cancel.is_cancelled()) {
            return false;
        }
        let kind = match outcome {
            TaskOutcome::Completed { .. } => EventKind::TaskCompleted,
            TaskOutcome::Aborted => EventKind::TaskAborted,
            TaskOutcome::StepLimitReached { .. } | TaskOutcome::Failed { .. } => EventKind::TaskFailed,
        };
        self.phase_tx.send_replace(outcome.phase());
        self.sink.emit(ProgressEvent::new(kind, outcome.message()));
        *slot = None;
        self.phase_tx.send_replace(AgentPhase::Idle);
        true
    }

    /// 中止当前任务；幂等
    pub fn abort(&self) -> StopAck {
        let mut slot = self.slot();
        let Some(active) = slot.take() else {
            return StopAck::NoTaskRunning;
        };
        active.cancel.cancel();
        self.phase_tx.send_replace(AgentPhase::Aborted);
        self.sink
            .emit(ProgressEvent::new(EventKind::TaskAborted, TaskOutcome::Aborted.message()));
        self.phase_tx.send_replace(AgentPhase::Idle);
        tracing::info!(task_id = %active.id, "task aborted");
        StopAck::Stopped(active.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::react::EventLog;

    fn supervisor() -> (SessionSupervisor, Arc<EventLog>) {
        let log = Arc::new(EventLog::new());
        (SessionSupervisor::new(log.clone()), log)
    }

    #[test]
    fn test_claim_rejects_second_task() {
        let (sup, _) = supervisor();
        let (id, _) = sup.claim().unwrap();
        match sup.claim() {
            Err(AgentError::TaskAlreadyRunning(running)) => assert_eq!(running, id),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_abort_silences_the_old_task() {
        let (sup, log) = supervisor();
        let (id, cancel) = sup.claim().unwrap();
        assert!(sup.emit(id, EventKind::TaskStarted, "go"));

        assert_eq!(sup.abort(), StopAck::Stopped(id));
        assert!(cancel.is_cancelled());
        assert!(!sup.emit(id, EventKind::Thinking, "late"));
        assert!(!sup.finish(id, &TaskOutcome::Completed { summary: "x".into() }));

        assert_eq!(log.kinds(), vec![EventKind::TaskStarted, EventKind::TaskAborted]);
        assert_eq!(sup.phase(), AgentPhase::Idle);
        assert!(sup.current().is_none());
    }

    #[test]
    fn test_stop_without_task_is_noop() {
        let (sup, log) = supervisor();
        assert_eq!(sup.abort(), StopAck::NoTaskRunning);
        assert_eq!(sup.abort(), StopAck::NoTaskRunning);
        assert!(log.events().is_empty());
    }

    #[test]
    fn test_finish_releases_slot() {
        let (sup, log) = supervisor();
        let (id, _) = sup.claim().unwrap();
        assert!(sup.finish(id, &TaskOutcome::StepLimitReached { steps: 10 }));
        assert_eq!(log.kinds(), vec![EventKind::TaskFailed]);
        assert!(sup.claim().is_ok());
    }
}
