//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Scripted）

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod traits;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT};
pub use mock::{decision_completion, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{Completion, FunctionCall, FunctionSpec, LlmClient, LlmError};
