//! 认知层：Planner、Loop Guard、进度事件、THINK→ACT→OBSERVE 主循环

pub mod events;
pub mod guard;
pub mod loop_;
pub mod planner;

pub use events::{EventKind, EventLog, EventSink, NullSink, ProgressEvent};
pub use guard::{GuardVerdict, LoopGuard, GUARD_WINDOW};
pub use loop_::AgentLoop;
pub use planner::{parse_completion, Planner, FALLBACK_RATIONALE, SYSTEM_PROMPT};
