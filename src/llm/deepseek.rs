//! DeepSeek 规划模型（OpenAI 兼容接口，支持 function calling）

use crate::llm::{LlmError, OpenAiClient};

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// 读取 `DEEPSEEK_API_KEY`（兼容 `OPENAI_API_KEY`）；都没有时报错而不是发出必然 401 的请求
pub fn create_deepseek_client(model: Option<&str>, timeout_secs: u64) -> Result<OpenAiClient, LlmError> {
    let api_key = ["DEEPSEEK_API_KEY", "OPENAI_API_KEY"]
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|k| !k.trim().is_empty()))
        .ok_or_else(|| LlmError::Http("DEEPSEEK_API_KEY is not set".to_string()))?;

    let model = model
        .filter(|m| !m.trim().is_empty())
        .map(String::from)
        .or_else(|| std::env::var("DEEPSEEK_MODEL").ok())
        .unwrap_or_else(|| DEEPSEEK_CHAT.to_string());

    OpenAiClient::new(Some(DEEPSEEK_BASE_URL), &model, Some(&api_key), timeout_secs)
}
