//! Cartpilot - Rust 购物浏览智能体
//!
//! 把自然语言目标转为有界的 THINK→ACT→OBSERVE 页面动作序列。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 控制器、Task、阶段状态机、失败升级、会话监管
//! - **intent**: 购物意图抽取（关键词 / 正则）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Scripted）
//! - **memory**: 任务对话记录与键值持久化
//! - **react**: Planner、Loop Guard、进度事件、主循环
//! - **tools**: 动作模型、定位器、页面抽象、动作执行器
//! - **transport**: 执行上下文投递（重试、退避、重新注入）

pub mod config;
pub mod core;
pub mod intent;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;
pub mod transport;

pub use crate::core::{AgentBuilder, AgentController, AgentError, AgentPhase, StopAck, TaskOutcome, TaskReport};
