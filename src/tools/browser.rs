//! Chrome 页面驱动：通过 Headless Chrome 在真实标签页上实现 Page
//!
//! 需启用 feature "browser" 且系统已安装 Chrome/Chromium。
//! 页面内注入一个自动化脚本 `window.__cartpilot`，它为查询到的元素分配 id 并保存引用；
//! 之后的滚动、点击、输入都按 id 调用脚本。所有调用在 spawn_blocking 中执行并以 JSON 字符串返回。
//!
//! 页面跳转后脚本消失，调用返回 NotInjected；JS 上下文被销毁时返回 ContextDestroyed，
//! 两者都交给 Transport 做重新注入。

use std::sync::Arc;

use async_trait::async_trait;
use headless_chrome::Tab;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::page::{DomEvent, ElementRef, Page, PageError};

/// 页面内自动化脚本
pub const HELPER_JS: &str = r#"
(() => {
  if (window.__cartpilot) return true;
  const refs = new Map();
  let next = 1;
  const ATTRS = ['id', 'class', 'name', 'type', 'href', 'role', 'placeholder', 'aria-label', 'value', 'title'];
  const describe = (el) => {
    let id = el.__cartpilotId;
    if (!id) { id = next++; el.__cartpilotId = id; }
    refs.set(id, el);
    const attributes = {};
    for (const a of ATTRS) {
      const v = a === 'value' ? el.value : el.getAttribute(a);
      if (v !== null && v !== undefined && v !== '') attributes[a] = String(v);
    }
    return { id, tag: el.tagName.toLowerCase(), text: (el.innerText || el.textContent || '').slice(0, 20000), attributes };
  };
  const get = (id) => {
    const el = refs.get(id);
    if (!el || !el.isConnected) throw new Error('stale:' + id);
    return el;
  };
  window.__cartpilot = {
    query(selector, scopeId) {
      const root = scopeId ? get(scopeId) : document;
      return Array.from(root.querySelectorAll(selector)).map(describe);
    },
    scroll(id) { get(id).scrollIntoView({ behavior: 'smooth', block: 'center' }); return true; },
    activate(id) { get(id).click(); return true; },
    focus(id) { get(id).focus(); return true; },
    setValue(id, value) { get(id).value = value; return true; },
    dispatch(id, type) { get(id).dispatchEvent(new Event(type, { bubbles: true })); return true; },
  };
  return true;
})()
"#;

/// 脚本调用的统一返回
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Reply {
    Missing { missing: bool },
    Error { error: String },
    Ok { ok: Value },
}

/// 真实标签页上的 Page 实现
pub struct ChromePage {
    tab: Arc<Tab>,
}

impl ChromePage {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab }
    }

    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }

    /// 注入（或确认已注入）自动化脚本
    pub async fn inject(&self) -> Result<(), PageError> {
        self.eval_raw(HELPER_JS.to_string()).await.map(|_| ())
    }

    async fn eval_raw(&self, js: String) -> Result<Option<Value>, PageError> {
        let tab = self.tab.clone();
        tokio::task::spawn_blocking(move || {
            tab.evaluate(&js, false)
                .map(|r| r.value)
                .map_err(|e| classify_eval_error(&e.to_string()))
        })
        .await
        .map_err(|e| PageError::Script(format!("task join: {}", e)))?
    }

    /// 调用 window.__cartpilot.<method>(args...)
    async fn call(&self, method: &str, args: &[Value]) -> Result<Value, PageError> {
        let args = args
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let js = format!(
            "(() => {{ if (!window.__cartpilot) return JSON.stringify({{ missing: true }}); \
             try {{ return JSON.stringify({{ ok: window.__cartpilot.{}({}) }}); }} \
             catch (e) {{ return JSON.stringify({{ error: String(e && e.message || e) }}); }} }})()",
            method, args
        );
        let raw = self
            .eval_raw(js)
            .await?
            .and_then(|v| v.as_str().map(String::from))
            .ok_or_else(|| PageError::Script(format!("{} returned no value", method)))?;
        let reply: Reply = serde_json::from_str(&raw)
            .map_err(|e| PageError::Script(format!("{} returned malformed JSON: {}", method, e)))?;
        match reply {
            Reply::Missing { .. } => Err(PageError::NotInjected),
            Reply::Error { error } => Err(classify_script_error(&error)),
            Reply::Ok { ok } => Ok(ok),
        }
    }

    async fn call_on(&self, method: &str, element: &ElementRef, extra: &[Value]) -> Result<(), PageError> {
        let mut args = vec![Value::from(element.id)];
        args.extend_from_slice(extra);
        self.call(method, &args).await.map(|_| ())
    }
}

fn classify_eval_error(message: &str) -> PageError {
    if message.contains("Execution context was destroyed") || message.contains("Cannot find context") {
        PageError::ContextDestroyed
    } else {
        PageError::Script(message.to_string())
    }
}

fn classify_script_error(message: &str) -> PageError {
    if let Some(id) = message
        .strip_prefix("stale:")
        .and_then(|s| s.trim().parse::<u64>().ok())
    {
        return PageError::StaleElement(id);
    }
    if message.contains("is not a valid selector") || message.contains("SyntaxError") {
        return PageError::InvalidSelector(message.to_string());
    }
    PageError::Script(message.to_string())
}

#[async_trait]
impl Page for ChromePage {
    async fn url(&self) -> Result<String, PageError> {
        Ok(self.tab.get_url())
    }

    async fn title(&self) -> Result<String, PageError> {
        Ok(self
            .eval_raw("document.title".to_string())
            .await?
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default())
    }

    async fn query_all(&self, selector: &str, scope: Option<&ElementRef>) -> Result<Vec<ElementRef>, PageError> {
        let scope = scope.map(|s| Value::from(s.id)).unwrap_or(Value::Null);
        let value = self.call("query", &[Value::from(selector), scope]).await?;
        serde_json::from_value(value).map_err(|e| PageError::Script(format!("query result: {}", e)))
    }

    /// 只发出导航，不等待加载完成
    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        let tab = self.tab.clone();
        let url = url.to_string();
        tokio::task::spawn_blocking(move || {
            tab.navigate_to(&url)
                .map(|_| ())
                .map_err(|e| PageError::Script(format!("navigate failed: {}", e)))
        })
        .await
        .map_err(|e| PageError::Script(format!("task join: {}", e)))?
    }

    async fn scroll_into_view(&self, element: &ElementRef) -> Result<(), PageError> {
        self.call_on("scroll", element, &[]).await
    }

    async fn activate(&self, element: &ElementRef) -> Result<(), PageError> {
        self.call_on("activate", element, &[]).await
    }

    async fn focus(&self, element: &ElementRef) -> Result<(), PageError> {
        self.call_on("focus", element, &[]).await
    }

    async fn set_value(&self, element: &ElementRef, value: &str) -> Result<(), PageError> {
        self.call_on("setValue", element, &[Value::from(value)]).await
    }

    async fn dispatch(&self, element: &ElementRef, event: DomEvent) -> Result<(), PageError> {
        self.call_on("dispatch", element, &[Value::from(event.as_str())]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_shapes() {
        assert!(matches!(
            serde_json::from_str::<Reply>(r#"{"missing":true}"#).unwrap(),
            Reply::Missing { .. }
        ));
        assert!(matches!(
            serde_json::from_str::<Reply>(r#"{"error":"stale:4"}"#).unwrap(),
            Reply::Error { .. }
        ));
        assert!(matches!(
            serde_json::from_str::<Reply>(r#"{"ok":[]}"#).unwrap(),
            Reply::Ok { .. }
        ));
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(classify_script_error("stale:12"), PageError::StaleElement(12));
        assert!(matches!(
            classify_script_error("Failed to execute 'querySelectorAll': 'a[' is not a valid selector."),
            PageError::InvalidSelector(_)
        ));
        assert_eq!(
            classify_eval_error("Execution context was destroyed, most likely because of a navigation"),
            PageError::ContextDestroyed
        );
    }
}
