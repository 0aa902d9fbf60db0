//! 核心编排层：错误、阶段状态机、Task、失败升级、会话监管、控制器与构建器

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod session_supervisor;
pub mod state;
pub mod task;

pub use builder::{create_llm_from_config, AgentBuilder};
pub use error::AgentError;
pub use orchestrator::{AgentController, AgentSettings, TaskHandle};
pub use recovery::{Escalation, RecoveryEngine, FORCE_FINISH_AFTER};
pub use session_supervisor::{SessionSupervisor, StopAck};
pub use state::AgentPhase;
pub use task::{Task, TaskOutcome, TaskReport};
