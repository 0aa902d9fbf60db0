//! Agent 错误类型
//!
//! THINK / ACT 阶段冒泡的 AgentError 会让任务以 failed 结束；OBSERVE 阶段的错误被折叠为纠正提示写回对话。

use thiserror::Error;
use uuid::Uuid;

use crate::llm::LlmError;
use crate::memory::StoreError;
use crate::transport::TransportError;

/// 控制器与主循环可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("{0}")]
    Llm(#[from] LlmError),

    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("A task is already running ({0})")]
    TaskAlreadyRunning(Uuid),

    #[error("No agent running")]
    NoTaskRunning,

    #[error("Goal must not be empty")]
    EmptyGoal,

    /// 通过了 Planner 但无法转为页面请求的决策
    #[error("Invalid decision: {0}")]
    InvalidDecision(String),

    #[error("Invalid phase transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: crate::core::AgentPhase,
        to: crate::core::AgentPhase,
    },

    #[error("Task {0} did not finish cleanly: {1}")]
    TaskJoin(Uuid, String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
