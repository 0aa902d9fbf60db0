//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 DeepSeek、OpenAI、自建代理等。
//! 请求携带单个 function tool，并用 tool_choice 强制调用；响应兼容新版 `tool_calls` 与旧版 `function_call`。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionMessageToolCalls, ChatCompletionNamedToolChoice,
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionResponseMessage, ChatCompletionTool, ChatCompletionToolChoiceOption,
    ChatCompletionTools, CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    FunctionName, FunctionObjectArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{Completion, FunctionCall, FunctionSpec, LlmClient, LlmError};
use crate::memory::{Message, Role};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：持有 Client 与 model 名
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl From<OpenAIError> for LlmError {
    fn from(e: OpenAIError) -> Self {
        match e {
            OpenAIError::Reqwest(e) if e.is_timeout() => LlmError::Timeout,
            OpenAIError::Reqwest(e) => LlmError::Http(e.to_string()),
            OpenAIError::ApiError(e) => LlmError::Api(e.message),
            OpenAIError::JSONDeserialize(e, _) => LlmError::Decode(e.to_string()),
            other => LlmError::InvalidRequest(other.to_string()),
        }
    }
}

impl OpenAiClient {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self, LlmError> {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = OpenAIConfig::new()
            .with_api_base(base_url.unwrap_or(OPENAI_BASE_URL).trim_end_matches('/'))
            .with_api_key(api_key);

        // 单次请求超时交给 reqwest，超时映射为 LlmError::Timeout
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;

        Ok(Self {
            client: Client::with_config(config).with_http_client(http),
            model: model.to_string(),
            usage: TokenUsage::new(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn to_openai_messages(
        &self,
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
        messages
            .iter()
            .map(|m| {
                Ok(match m.role {
                    Role::System => ChatCompletionRequestMessage::System(
                        ChatCompletionRequestSystemMessageArgs::default()
                            .content(m.content.clone())
                            .build()?,
                    ),
                    Role::User => ChatCompletionRequestMessage::User(
                        ChatCompletionRequestUserMessageArgs::default()
                            .content(m.content.clone())
                            .build()?,
                    ),
                    Role::Assistant => ChatCompletionRequestMessage::Assistant(
                        ChatCompletionRequestAssistantMessageArgs::default()
                            .content(m.content.clone())
                            .build()?,
                    ),
                })
            })
            .collect()
    }

    /// 对话消息 + 单个 function tool，tool_choice 指名该函数
    fn build_request(
        &self,
        messages: &[Message],
        function: &FunctionSpec,
    ) -> Result<CreateChatCompletionRequest, LlmError> {
        let tool = ChatCompletionTool {
            function: FunctionObjectArgs::default()
                .name(function.name.clone())
                .description(function.description.clone())
                .parameters(function.parameters.clone())
                .build()?,
        };
        let choice = ChatCompletionToolChoiceOption::Function(ChatCompletionNamedToolChoice {
            function: FunctionName {
                name: function.name.clone(),
            },
        });

        Ok(CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.to_openai_messages(messages)?)
            .tools(vec![ChatCompletionTools::Function(tool)])
            .tool_choice(choice)
            .build()?)
    }
}

/// 首个函数调用：优先 tool_calls，其次旧版 function_call
#[allow(deprecated)]
fn extract_completion(message: ChatCompletionResponseMessage) -> Completion {
    let from_tools = message.tool_calls.unwrap_or_default().into_iter().find_map(|call| match call {
        ChatCompletionMessageToolCalls::Function(call) => Some(FunctionCall {
            name: call.function.name,
            arguments: call.function.arguments,
        }),
        _ => None,
    });
    let function_call = from_tools.or_else(|| {
        message.function_call.map(|f| FunctionCall {
            name: f.name,
            arguments: f.arguments,
        })
    });
    Completion {
        content: message.content.filter(|c| !c.trim().is_empty()),
        function_call,
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(
        &self,
        messages: &[Message],
        function: &FunctionSpec,
    ) -> Result<Completion, LlmError> {
        let request = self.build_request(messages, function)?;
        let response = self.client.chat().create(request).await?;

        // 提取 token 使用统计
        if let Some(usage) = &response.usage {
            self.usage.add(
                usage.prompt_tokens as u64,
                usage.completion_tokens as u64,
            );
        }

        Ok(response
            .choices
            .into_iter()
            .next()
            .map(|c| extract_completion(c.message))
            .unwrap_or_else(|| Completion {
                content: None,
                function_call: None,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::types::chat::CreateChatCompletionResponse;
    use serde_json::json;

    fn spec() -> FunctionSpec {
        FunctionSpec {
            name: "decide".to_string(),
            description: "d".to_string(),
            parameters: json!({"type": "object"}),
        }
    }

    #[test]
    fn test_request_forces_named_function() {
        let client = OpenAiClient::new(Some("http://localhost:1/v1/"), "gpt-4o-mini", Some("k"), 5).unwrap();
        let request = client
            .build_request(&[Message::system("s"), Message::user("u")], &spec())
            .unwrap();
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "decide");
        assert_eq!(body["tools"][0]["function"]["parameters"]["type"], "object");
        assert_eq!(body["tool_choice"]["type"], "function");
        assert_eq!(body["tool_choice"]["function"]["name"], "decide");
    }

    #[test]
    fn test_response_prefers_tool_calls() {
        let raw = json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "c1",
                        "type": "function",
                        "function": {"name": "decide", "arguments": "{\"action\":\"finish\"}"}
                    }]
                }
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
        });
        let response: CreateChatCompletionResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(response.usage.as_ref().unwrap().prompt_tokens, 10);
        let message = response.choices.into_iter().next().unwrap().message;
        let completion = extract_completion(message);
        let call = completion.function_call.unwrap();
        assert_eq!(call.name, "decide");
        assert_eq!(call.arguments, "{\"action\":\"finish\"}");
        assert!(completion.content.is_none());
    }
}
