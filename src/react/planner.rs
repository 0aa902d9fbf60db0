//! Planner：调用 LLM 得到一次结构化决策
//!
//! 请求携带完整对话与唯一的决策函数 schema。模型没有给出合法决策（纯文本、参数不可解析、缺字段）时，
//! 回退为 read_text(body)，不把格式错误当作任务失败；只有 LLM 调用本身出错才向上返回 Err。

use std::sync::Arc;

use crate::core::AgentError;
use crate::llm::{Completion, FunctionSpec, LlmClient};
use crate::memory::Message;
use crate::tools::schema::{decision_function, DecisionArgs, DECISION_FUNCTION};
use crate::tools::Decision;

/// 回退决策的理由
pub const FALLBACK_RATIONALE: &str = "no structured decision received";

/// 种子 system 指令：五种动作与行为规则
pub const SYSTEM_PROMPT: &str = r#"You are a shopping assistant that operates a web browser one action at a time.
Every reply must call the function decide_next_action with exactly one of these actions:

1. navigate  - open a URL. target = absolute URL.
2. click     - click an element. target = CSS selector; you may add :contains("visible text").
3. type      - enter text into an input. target = CSS selector, text = the text to enter.
4. read_text - read the text of matching elements plus a page summary. target = CSS selector, "body" for the whole page.
5. finish    - stop. summary = what was accomplished, or what could not be done.

Rules:
- Read the page (read_text) after navigating or submitting before choosing the next click.
- Prefer selectors and labels that appear in the latest page summary.
- Never repeat an action that already failed with the same target; choose a different approach.
- Do not enter payment details or complete a checkout.
- When the goal is reached, or cannot be reached, call finish with a clear summary."#;

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    function: FunctionSpec,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            function: decision_function(),
        }
    }

    pub fn system_prompt(&self) -> &'static str {
        SYSTEM_PROMPT
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 回退决策：读取整页
    pub fn fallback() -> Decision {
        Decision::read_page(FALLBACK_RATIONALE)
    }

    pub async fn decide(&self, messages: &[Message]) -> Result<Decision, AgentError> {
        let completion = self.llm.complete(messages, &self.function).await?;
        match parse_completion(&completion) {
            Ok(decision) => Ok(decision),
            Err(reason) => {
                tracing::warn!(reason = %reason, "planner returned no usable decision, falling back to read_text");
                Ok(Self::fallback())
            }
        }
    }
}

/// 从补全中取出决策：优先函数调用，其次 content 中的 JSON 对象
pub fn parse_completion(completion: &Completion) -> Result<Decision, String> {
    let raw = match (&completion.function_call, &completion.content) {
        (Some(call), _) if call.name == DECISION_FUNCTION => call.arguments.clone(),
        (Some(call), _) => return Err(format!("unexpected function {}", call.name)),
        (None, Some(content)) => extract_json(content)
            .ok_or_else(|| "free-text reply without a decision".to_string())?
            .to_string(),
        (None, None) => return Err("empty reply".to_string()),
    };

    let args: DecisionArgs =
        serde_json::from_str(&raw).map_err(|e| format!("malformed arguments: {}", e))?;
    let decision = Decision {
        action: args.action,
        target: args.target.filter(|t| !t.trim().is_empty()),
        text: args.text,
        rationale: args.reasoning,
        summary: args.summary.filter(|s| !s.trim().is_empty()),
    };
    decision.validate()?;
    Ok(decision)
}

/// ```json ... ``` 代码块或首尾花括号之间的内容
fn extract_json(content: &str) -> Option<&str> {
    let trimmed = content.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}
