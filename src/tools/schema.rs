//! 决策函数 JSON Schema 生成（schemars 自动生成）
//!
//! 以 function calling 的形式交给 LLM：唯一的函数 `decide_next_action`，参数即一次 Decision。

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::llm::FunctionSpec;
use crate::tools::ActionKind;

pub const DECISION_FUNCTION: &str = "decide_next_action";

/// 决策函数参数（LLM 输出的结构化形态）
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DecisionArgs {
    /// Next action: navigate, click, type, read_text or finish
    pub action: ActionKind,
    /// URL for navigate; CSS selector for click/type/read_text. Selectors may use :contains("visible text")
    #[serde(default)]
    pub target: Option<String>,
    /// Text to enter (type only)
    #[serde(default)]
    pub text: Option<String>,
    /// One sentence on why this action moves the task forward
    #[serde(default)]
    pub reasoning: String,
    /// What was accomplished (finish only)
    #[serde(default)]
    pub summary: Option<String>,
}

/// 参数 schema：内联子 schema（不产生 definitions / $ref），去掉 $schema 与 title
pub fn decision_parameters_schema() -> serde_json::Value {
    let generator = SchemaSettings::draft07()
        .with(|s| {
            s.inline_subschemas = true;
        })
        .into_generator();
    let schema = generator.into_root_schema_for::<DecisionArgs>();
    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({"type": "object"}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}

/// 传给 LLM 的函数定义
pub fn decision_function() -> FunctionSpec {
    FunctionSpec {
        name: DECISION_FUNCTION.to_string(),
        description: "Choose exactly one browser action to take next, or finish the task.".to_string(),
        parameters: decision_parameters_schema(),
    }
}
