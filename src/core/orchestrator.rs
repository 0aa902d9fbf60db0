//! Agent 控制器：对外的 startTask / stopTask
//!
//! start_task 在单任务槽位上 check-and-set，成功后在后台任务中驱动 AgentLoop，返回 TaskHandle；
//! stop_task 立即中止（幂等）。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::core::{AgentError, AgentPhase, SessionSupervisor, StopAck, Task, TaskReport};
use crate::react::{AgentLoop, EventKind, EventSink};
use crate::transport::ContextId;

/// 主循环参数
#[derive(Clone, Debug)]
pub struct AgentSettings {
    pub max_steps: usize,
    pub history_window: usize,
    pub step_delay: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: 10,
            history_window: 10,
            step_delay: Duration::from_millis(1000),
        }
    }
}

struct Inner {
    agent_loop: AgentLoop,
    supervisor: SessionSupervisor,
    settings: AgentSettings,
}

/// 控制器（可 clone，共享同一个槽位）
#[derive(Clone)]
pub struct AgentController {
    inner: Arc<Inner>,
}

/// 已接受的任务
pub struct TaskHandle {
    pub id: Uuid,
    join: JoinHandle<TaskReport>,
}

impl TaskHandle {
    /// 等待任务结束
    pub async fn wait(self) -> Result<TaskReport, AgentError> {
        self.join
            .await
            .map_err(|e| AgentError::TaskJoin(self.id, e.to_string()))
    }
}

impl AgentController {
    pub fn new(agent_loop: AgentLoop, sink: Arc<dyn EventSink>, settings: AgentSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                agent_loop,
                supervisor: SessionSupervisor::new(sink),
                settings,
            }),
        }
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.inner.settings
    }

    /// 启动任务；已有任务运行或目标为空时拒绝
    pub fn start_task(&self, goal: &str, context: ContextId) -> Result<TaskHandle, AgentError> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(AgentError::EmptyGoal);
        }
        let (id, cancel) = self.inner.supervisor.claim()?;
        // task_started 必须先于 spawn 发出
        self.inner
            .supervisor
            .emit(id, EventKind::TaskStarted, format!("Task started: {}", goal));
        let task = Task::new(
            id,
            goal,
            context,
            self.inner.settings.max_steps,
            self.inner.settings.history_window,
        );

        let inner = self.inner.clone();
        let join = tokio::spawn(async move {
            inner
                .agent_loop
                .run(task, &inner.supervisor, cancel)
                .await
        });
        Ok(TaskHandle { id, join })
    }

    /// 中止当前任务；没有任务时返回 NoTaskRunning
    pub fn stop_task(&self) -> StopAck {
        self.inner.supervisor.abort()
    }

    pub fn current_task(&self) -> Option<Uuid> {
        self.inner.supervisor.current()
    }

    pub fn phase(&self) -> AgentPhase {
        self.inner.supervisor.phase()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<AgentPhase> {
        self.inner.supervisor.subscribe_phase()
    }

    /// 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.agent_loop.planner().token_usage()
    }
}
