//! 页面驱动抽象
//!
//! ActionExecutor 只通过 Page trait 操作 DOM：结构选择器查询、导航、滚动、原生点击、聚焦、赋值与事件派发。
//! 实现：InMemoryPage（进程内 DOM，测试与本地宿主）、ChromePage（feature "browser"，Headless Chrome）。

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 页面层错误；NotInjected / ContextDestroyed 表示执行上下文丢失，由 Transport 负责恢复
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    #[error("Automation helper is not present in the page")]
    NotInjected,

    #[error("Execution context was destroyed")]
    ContextDestroyed,

    #[error("Stale element reference: {0}")]
    StaleElement(u64),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Page script error: {0}")]
    Script(String),
}

impl PageError {
    /// 执行上下文丢失（需要重新注入），而不是单个动作的失败
    pub fn is_context_loss(&self) -> bool {
        matches!(self, PageError::NotInjected | PageError::ContextDestroyed)
    }
}

/// 页面元素句柄：id 在页面内唯一，附带可见文本与常用属性
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRef {
    pub id: u64,
    pub tag: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ElementRef {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// 面向人的标签：可见文本 > aria-label > value > placeholder > 标签名
    pub fn label(&self) -> String {
        let text = normalize_text(&self.text);
        if !text.is_empty() {
            return text;
        }
        ["aria-label", "value", "placeholder", "title"]
            .iter()
            .find_map(|a| self.attr(a).filter(|v| !v.trim().is_empty()))
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| self.tag.clone())
    }
}

/// 派发到元素上的 DOM 事件
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DomEvent {
    Input,
    Change,
}

impl DomEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomEvent::Input => "input",
            DomEvent::Change => "change",
        }
    }
}

/// 折叠空白
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
pub trait Page: Send + Sync {
    async fn url(&self) -> Result<String, PageError>;

    async fn title(&self) -> Result<String, PageError>;

    /// 结构选择器查询（文档顺序）；scope 非空时只在其后代中查找
    async fn query_all(
        &self,
        selector: &str,
        scope: Option<&ElementRef>,
    ) -> Result<Vec<ElementRef>, PageError>;

    async fn navigate(&self, url: &str) -> Result<(), PageError>;

    async fn scroll_into_view(&self, element: &ElementRef) -> Result<(), PageError>;

    /// 原生激活（element.click()）
    async fn activate(&self, element: &ElementRef) -> Result<(), PageError>;

    async fn focus(&self, element: &ElementRef) -> Result<(), PageError>;

    async fn set_value(&self, element: &ElementRef, value: &str) -> Result<(), PageError>;

    async fn dispatch(&self, element: &ElementRef, event: DomEvent) -> Result<(), PageError>;
}
