//! 动作模型：ActionKind（封闭枚举）、Decision（规划结果）、ActionRequest（下发到页面的请求）、ActionResult（执行结果）

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 整个文档（read_text 的默认目标）
pub const WHOLE_DOCUMENT: &str = "body";

/// 五种允许的动作
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Navigate,
    Click,
    Type,
    ReadText,
    Finish,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Navigate => "navigate",
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::ReadText => "read_text",
            ActionKind::Finish => "finish",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Planner 给出的一步决策
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Decision {
    fn new(action: ActionKind, target: Option<String>, rationale: impl Into<String>) -> Self {
        Self {
            action,
            target,
            text: None,
            rationale: rationale.into(),
            summary: None,
        }
    }

    pub fn navigate(url: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self::new(ActionKind::Navigate, Some(url.into()), rationale)
    }

    pub fn click(target: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self::new(ActionKind::Click, Some(target.into()), rationale)
    }

    pub fn type_text(
        target: impl Into<String>,
        text: impl Into<String>,
        rationale: impl Into<String>,
    ) -> Self {
        let mut d = Self::new(ActionKind::Type, Some(target.into()), rationale);
        d.text = Some(text.into());
        d
    }

    pub fn read_text(target: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self::new(ActionKind::ReadText, Some(target.into()), rationale)
    }

    /// 读取整页文本
    pub fn read_page(rationale: impl Into<String>) -> Self {
        Self::read_text(WHOLE_DOCUMENT, rationale)
    }

    pub fn finish(summary: impl Into<String>, rationale: impl Into<String>) -> Self {
        let mut d = Self::new(ActionKind::Finish, None, rationale);
        d.summary = Some(summary.into());
        d
    }

    /// navigate/click/type/read_text 必须有 target；finish 必须有 summary；type 必须有 text
    pub fn validate(&self) -> Result<(), String> {
        let has = |v: &Option<String>| v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false);
        match self.action {
            ActionKind::Finish => {
                if !has(&self.summary) {
                    return Err("finish requires a summary".to_string());
                }
            }
            ActionKind::Type => {
                if !has(&self.target) {
                    return Err("type requires a target".to_string());
                }
                if self.text.is_none() {
                    return Err("type requires text".to_string());
                }
            }
            ActionKind::Navigate | ActionKind::Click | ActionKind::ReadText => {
                if !has(&self.target) {
                    return Err(format!("{} requires a target", self.action));
                }
            }
        }
        Ok(())
    }

    /// 动作相同且目标相同（Loop Guard 的重复判定）
    pub fn same_step(&self, other: &Decision) -> bool {
        self.action == other.action && self.target == other.target
    }

    /// 目标字符串包含提交/搜索类关键词的 click（字符串启发式，关键词可配置）
    pub fn is_submit_like(&self, keywords: &[String]) -> bool {
        if self.action != ActionKind::Click {
            return false;
        }
        let target = match &self.target {
            Some(t) => t.to_lowercase(),
            None => return false,
        };
        keywords
            .iter()
            .any(|k| !k.is_empty() && target.contains(&k.to_lowercase()))
    }

    /// 转为页面请求；finish 或缺少 target 时返回 None
    pub fn to_request(&self) -> Option<ActionRequest> {
        let target = self.target.clone();
        match self.action {
            ActionKind::Navigate => target.map(|url| ActionRequest::Navigate { url }),
            ActionKind::Click => target.map(|target| ActionRequest::Click { target }),
            ActionKind::Type => target.map(|target| ActionRequest::Type {
                target,
                text: self.text.clone().unwrap_or_default(),
            }),
            ActionKind::ReadText => Some(ActionRequest::ReadText { target }),
            ActionKind::Finish => None,
        }
    }

    /// 形如 `click(".buy")` 的简短描述
    pub fn describe(&self) -> String {
        match (self.action, &self.target, &self.text) {
            (ActionKind::Finish, _, _) => format!(
                "finish({:?})",
                self.summary.as_deref().unwrap_or_default()
            ),
            (ActionKind::Type, Some(t), Some(text)) => format!("type({:?}, {:?})", t, text),
            (kind, Some(t), _) => format!("{}({:?})", kind, t),
            (kind, None, _) => format!("{}()", kind),
        }
    }
}

/// 下发到执行上下文的请求（只含可执行动作，finish 不会下发）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionRequest {
    Navigate { url: String },
    Click { target: String },
    Type { target: String, text: String },
    ReadText {
        #[serde(default)]
        target: Option<String>,
    },
}

impl ActionRequest {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionRequest::Navigate { .. } => ActionKind::Navigate,
            ActionRequest::Click { .. } => ActionKind::Click,
            ActionRequest::Type { .. } => ActionKind::Type,
            ActionRequest::ReadText { .. } => ActionKind::ReadText,
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            ActionRequest::Navigate { url } => Some(url),
            ActionRequest::Click { target } | ActionRequest::Type { target, .. } => Some(target),
            ActionRequest::ReadText { target } => target.as_deref(),
        }
    }
}

/// 页面结构摘要：为 Planner 提供廉价的结构上下文
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    pub title: String,
    pub url: String,
    pub headings: Vec<String>,
    pub buttons: Vec<String>,
    pub links: Vec<LinkSummary>,
    pub inputs: Vec<InputSummary>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSummary {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSummary {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

/// read_text 的提取结果
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageExtraction {
    pub text: String,
    pub page: PageSummary,
}

/// 单次执行结果
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PageExtraction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// 等待响应超时（动作可能已生效，结果未知）
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub timed_out: bool,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
            data: None,
            url: None,
            timed_out: false,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            message: error.clone(),
            error: Some(error),
            data: None,
            url: None,
            timed_out: false,
        }
    }

    /// 超时：动作可能已经生效（例如提交后页面跳转断开了响应通道），message 与 error 同时保留
    pub fn timeout(kind: ActionKind, secs: u64) -> Self {
        Self {
            success: false,
            message: format!("{} sent, but no response within {}s", kind, secs),
            error: Some(format!("Timed out after {}s waiting for the page", secs)),
            data: None,
            url: None,
            timed_out: true,
        }
    }

    pub fn with_data(mut self, data: PageExtraction) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// 失败原因：优先 error，其次 message
    pub fn error_text(&self) -> &str {
        self.error.as_deref().unwrap_or(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_target_and_summary() {
        assert!(Decision::click(".buy", "r").validate().is_ok());
        assert!(Decision::finish("done", "r").validate().is_ok());

        let mut missing = Decision::click(".buy", "r");
        missing.target = None;
        assert!(missing.validate().is_err());

        let mut no_summary = Decision::finish("done", "r");
        no_summary.summary = Some("  ".to_string());
        assert!(no_summary.validate().is_err());
    }

    #[test]
    fn test_same_step_ignores_rationale() {
        let a = Decision::navigate("https://example.com", "first");
        let b = Decision::navigate("https://example.com", "second");
        let c = Decision::navigate("https://example.org", "first");
        assert!(a.same_step(&b));
        assert!(!a.same_step(&c));
    }

    #[test]
    fn test_submit_like_only_for_clicks() {
        let kw = vec!["submit".to_string(), "search".to_string()];
        assert!(Decision::click("button[type=SUBMIT]", "r").is_submit_like(&kw));
        assert!(Decision::click("#nav-search-submit-button", "r").is_submit_like(&kw));
        assert!(!Decision::click(".add-to-cart", "r").is_submit_like(&kw));
        assert!(!Decision::read_text("#search", "r").is_submit_like(&kw));
    }

    #[test]
    fn test_finish_has_no_request() {
        assert!(Decision::finish("done", "r").to_request().is_none());
        assert_eq!(
            Decision::type_text("#q", "shoes", "r").to_request(),
            Some(ActionRequest::Type {
                target: "#q".to_string(),
                text: "shoes".to_string()
            })
        );
    }

    #[test]
    fn test_request_wire_format() {
        let json = serde_json::to_value(ActionRequest::ReadText { target: None }).unwrap();
        assert_eq!(json["action"], "read_text");
    }

    #[test]
    fn test_timeout_keeps_message_and_error() {
        let r = ActionResult::timeout(ActionKind::Click, 10);
        assert!(!r.success);
        assert!(r.timed_out);
        assert!(r.error.is_some());
        assert!(r.message.contains("click"));
    }
}
