//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Scripted）实现 LlmClient：一次请求携带完整对话与唯一一个函数 schema，
//! 返回文本内容与（可能缺失的）结构化函数调用。是否合规由 Planner 判断，客户端不做解释。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::Message;

/// 传给 LLM 的函数定义（OpenAI function calling 格式）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema（object）
    pub parameters: serde_json::Value,
}

/// LLM 返回的函数调用；arguments 为原始 JSON 字符串
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// 一次补全的结果
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Completion {
    pub content: Option<String>,
    pub function_call: Option<FunctionCall>,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            function_call: None,
        }
    }

    pub fn call(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            content: None,
            function_call: Some(FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            }),
        }
    }
}

/// LLM 调用错误（网络、API 返回错误、响应体解码、请求构造）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Http(String),

    #[error("LLM API error: {0}")]
    Api(String),

    #[error("LLM request could not be built: {0}")]
    InvalidRequest(String),

    #[error("LLM response could not be decoded: {0}")]
    Decode(String),

    #[error("LLM request timed out")]
    Timeout,
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 携带单个函数 schema 的补全（要求模型调用该函数）
    async fn complete(
        &self,
        messages: &[Message],
        function: &FunctionSpec,
    ) -> Result<Completion, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
