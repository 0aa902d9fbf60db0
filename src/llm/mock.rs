//! 脚本化 LLM 客户端（用于测试与离线运行，无需 API）
//!
//! 按顺序回放预设回复（函数调用 / 纯文本 / 错误），并记录每次收到的完整对话，便于断言注入的提示。
//! 脚本耗尽后：repeat_last 时重复最后一条，否则返回纯文本（不合规，触发 Planner 回退）。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::llm::{Completion, FunctionSpec, LlmClient, LlmError};
use crate::memory::Message;
use crate::tools::schema::DECISION_FUNCTION;
use crate::tools::Decision;

/// 脚本化客户端
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<Completion, LlmError>>>,
    last: Mutex<Option<Result<Completion, LlmError>>>,
    requests: Mutex<Vec<Vec<Message>>>,
    repeat_last: bool,
    delay: Option<Duration>,
}

/// 把 Decision 编码为与决策函数 schema 一致的函数调用
pub fn decision_completion(decision: &Decision) -> Completion {
    let args = json!({
        "action": decision.action,
        "target": decision.target,
        "text": decision.text,
        "reasoning": decision.rationale,
        "summary": decision.summary,
    });
    Completion::call(DECISION_FUNCTION, args.to_string())
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 依次回放一组决策
    pub fn from_decisions(decisions: impl IntoIterator<Item = Decision>) -> Self {
        decisions.into_iter().fold(Self::new(), |c, d| c.decision(d))
    }

    pub fn decision(self, decision: Decision) -> Self {
        self.reply(decision_completion(&decision))
    }

    pub fn reply(self, completion: Completion) -> Self {
        self.push(Ok(completion))
    }

    pub fn error(self, error: LlmError) -> Self {
        self.push(Err(error))
    }

    fn push(self, item: Result<Completion, LlmError>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(item);
        self
    }

    /// 脚本耗尽后重复最后一条
    pub fn repeat_last(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    /// 每次调用前等待（模拟慢速推理）
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 已收到的全部请求（每次为完整对话）
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        _function: &FunctionSpec,
    ) -> Result<Completion, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.to_vec());

        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }

        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        match next {
            Some(item) => {
                *last = Some(item.clone());
                item
            }
            None => match (&*last, self.repeat_last) {
                (Some(item), true) => item.clone(),
                _ => Ok(Completion::text("I have nothing further to add.")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::schema::decision_function;

    #[tokio::test]
    async fn test_replays_in_order_then_falls_back_to_text() {
        let client = ScriptedLlmClient::from_decisions(vec![
            Decision::navigate("https://example.com", "open"),
            Decision::finish("done", "complete"),
        ]);
        let spec = decision_function();
        let first = client.complete(&[Message::user("go")], &spec).await.unwrap();
        assert!(first.function_call.unwrap().arguments.contains("navigate"));
        let second = client.complete(&[], &spec).await.unwrap();
        assert!(second.function_call.unwrap().arguments.contains("done"));
        let third = client.complete(&[], &spec).await.unwrap();
        assert!(third.function_call.is_none());
        assert_eq!(client.call_count(), 3);
        assert_eq!(client.requests()[0][0].content, "go");
    }

    #[tokio::test]
    async fn test_repeat_last() {
        let client = ScriptedLlmClient::new()
            .decision(Decision::click(".next", "page"))
            .repeat_last();
        let spec = decision_function();
        for _ in 0..3 {
            let c = client.complete(&[], &spec).await.unwrap();
            assert!(c.function_call.unwrap().arguments.contains(".next"));
        }
    }
}
