//! 动作执行器
//!
//! 持有 Page 与执行参数，execute(request) 在当前页面上完成一个原语动作并返回结构化 ActionResult：
//! 元素找不到、选择器非法等属于动作失败（Ok(failure)）；执行上下文丢失则返回 Err 交给 Transport 恢复。
//! 每次调用输出结构化审计日志（JSON），并写入有界的动作日志（默认 50 条）。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::tools::locator::{resolve_all, resolve_one, Locator};
use crate::tools::page::{normalize_text, DomEvent, ElementRef, Page, PageError};
use crate::tools::{
    ActionRequest, ActionResult, InputSummary, LinkSummary, PageExtraction, PageSummary, WHOLE_DOCUMENT,
};

/// 点击成功时的文本预览长度
const CLICK_PREVIEW_CHARS: usize = 50;

/// 执行参数（延迟与上限）
#[derive(Clone, Debug)]
pub struct ExecutorSettings {
    /// navigate 后的固定等待
    pub navigate_settle: Duration,
    /// click 前（滚动后）的固定等待
    pub click_settle: Duration,
    /// 每个字符输入后的等待
    pub keystroke_delay: Duration,
    /// read_text 文本上限（字符）
    pub max_text_chars: usize,
    /// 摘要中每类元素的上限
    pub summary_limit: usize,
    /// 动作日志容量
    pub action_log_capacity: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            navigate_settle: Duration::from_millis(1500),
            click_settle: Duration::from_millis(300),
            keystroke_delay: Duration::from_millis(30),
            max_text_chars: 5000,
            summary_limit: 10,
            action_log_capacity: 50,
        }
    }
}

impl ExecutorSettings {
    /// 无延迟（测试用）
    pub fn immediate() -> Self {
        Self {
            navigate_settle: Duration::ZERO,
            click_settle: Duration::ZERO,
            keystroke_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// 动作日志条目（诊断用，与 Task 历史无关）
#[derive(Clone, Debug, Serialize)]
pub struct ActionLogEntry {
    pub at: DateTime<Utc>,
    pub action: String,
    pub target: Option<String>,
    pub success: bool,
    pub detail: String,
}

/// 动作执行器
pub struct ActionExecutor {
    page: Arc<dyn Page>,
    settings: ExecutorSettings,
    log: Mutex<VecDeque<ActionLogEntry>>,
}

impl ActionExecutor {
    pub fn new(page: Arc<dyn Page>, settings: ExecutorSettings) -> Self {
        Self {
            page,
            settings,
            log: Mutex::new(VecDeque::new()),
        }
    }

    pub fn page(&self) -> &Arc<dyn Page> {
        &self.page
    }

    /// 动作日志快照（旧 -> 新）
    pub fn action_log(&self) -> Vec<ActionLogEntry> {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// 执行一个动作；Err 仅表示执行上下文丢失
    pub async fn execute(&self, request: &ActionRequest) -> Result<ActionResult, PageError> {
        let start = Instant::now();
        let result = match self.run(request).await {
            Ok(r) => Ok(r),
            Err(e) if e.is_context_loss() => Err(e),
            Err(e) => Ok(ActionResult::failure(e.to_string())),
        };

        let (ok, outcome, detail) = match &result {
            Ok(r) if r.success => (true, "ok", r.message.clone()),
            Ok(r) => (false, "failed", r.error_text().to_string()),
            Err(e) => (false, "context_lost", e.to_string()),
        };
        let audit = serde_json::json!({
            "event": "action_audit",
            "action": request.kind().as_str(),
            "target": request.target().map(preview_target),
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
        });
        tracing::info!(audit = %audit, "action");

        self.record(ActionLogEntry {
            at: Utc::now(),
            action: request.kind().as_str().to_string(),
            target: request.target().map(String::from),
            success: ok,
            detail,
        });
        result
    }

    fn record(&self, entry: ActionLogEntry) {
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        log.push_back(entry);
        while log.len() > self.settings.action_log_capacity {
            log.pop_front();
        }
    }

    async fn run(&self, request: &ActionRequest) -> Result<ActionResult, PageError> {
        match request {
            ActionRequest::Navigate { url } => self.navigate(url).await,
            ActionRequest::Click { target } => self.click(target).await,
            ActionRequest::Type { target, text } => self.type_text(target, text).await,
            ActionRequest::ReadText { target } => {
                self.read_text(target.as_deref().unwrap_or(WHOLE_DOCUMENT)).await
            }
        }
    }

    /// 只发出导航并等待固定时间，不等待加载完成
    async fn navigate(&self, url: &str) -> Result<ActionResult, PageError> {
        self.page.navigate(url).await?;
        tokio::time::sleep(self.settings.navigate_settle).await;
        Ok(ActionResult::ok(format!("Navigated to {}", url)).with_url(url))
    }

    async fn click(&self, target: &str) -> Result<ActionResult, PageError> {
        let locator = Locator::parse(target);
        let Some(element) = resolve_one(self.page.as_ref(), &locator).await? else {
            return Ok(ActionResult::failure(format!("Element not found: {}", target)));
        };
        self.page.scroll_into_view(&element).await?;
        tokio::time::sleep(self.settings.click_settle).await;
        self.page.activate(&element).await?;

        let preview: String = element.label().chars().take(CLICK_PREVIEW_CHARS).collect();
        Ok(ActionResult::ok(format!("Clicked {}: {}", element.tag, preview)))
    }

    /// 逐字符输入：每个字符后派发 input，最后派发 change（满足框架绑定的监听器）
    async fn type_text(&self, target: &str, text: &str) -> Result<ActionResult, PageError> {
        let locator = Locator::parse(target);
        let Some(element) = resolve_one(self.page.as_ref(), &locator).await? else {
            return Ok(ActionResult::failure(format!("Element not found: {}", target)));
        };
        self.page.focus(&element).await?;
        self.page.set_value(&element, "").await?;

        let mut typed = String::with_capacity(text.len());
        for ch in text.chars() {
            typed.push(ch);
            self.page.set_value(&element, &typed).await?;
            self.page.dispatch(&element, DomEvent::Input).await?;
            if !self.settings.keystroke_delay.is_zero() {
                tokio::time::sleep(self.settings.keystroke_delay).await;
            }
        }
        self.page.dispatch(&element, DomEvent::Change).await?;

        Ok(ActionResult::ok(format!("Typed \"{}\" into {}", text, target)))
    }

    async fn read_text(&self, target: &str) -> Result<ActionResult, PageError> {
        let locator = Locator::parse(target);
        let elements = resolve_all(self.page.as_ref(), &locator).await?;
        if elements.is_empty() {
            return Ok(ActionResult::failure(format!("No elements found: {}", target)));
        }

        let joined = elements
            .iter()
            .map(|e| normalize_text(&e.text))
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        let total = joined.chars().count();
        let text: String = joined.chars().take(self.settings.max_text_chars).collect();
        let page = self.page_summary().await?;

        let message = if total > self.settings.max_text_chars {
            format!(
                "Read {} element(s), text truncated to {} of {} characters",
                elements.len(),
                self.settings.max_text_chars,
                total
            )
        } else {
            format!("Read {} element(s), {} characters", elements.len(), total)
        };
        Ok(ActionResult::ok(message).with_data(PageExtraction { text, page }))
    }

    /// 标题、URL 与各类元素（每类至多 summary_limit 个）
    pub async fn page_summary(&self) -> Result<PageSummary, PageError> {
        let limit = self.settings.summary_limit;
        let labels = |els: Vec<ElementRef>| -> Vec<String> {
            els.iter()
                .map(ElementRef::label)
                .filter(|l| !l.is_empty())
                .take(limit)
                .collect()
        };

        let headings = labels(self.page.query_all("h1, h2, h3", None).await?);
        let buttons = labels(
            self.page
                .query_all("button, [role=button], input[type=submit]", None)
                .await?,
        );
        let links = self
            .page
            .query_all("a", None)
            .await?
            .into_iter()
            .filter(|a| !normalize_text(&a.text).is_empty())
            .take(limit)
            .map(|a| LinkSummary {
                text: normalize_text(&a.text),
                href: a.attr("href").map(String::from),
            })
            .collect();
        let inputs = self
            .page
            .query_all("input, textarea, select", None)
            .await?
            .into_iter()
            .take(limit)
            .map(|i| InputSummary {
                input_type: i.attr("type").map(String::from),
                name: i.attr("name").map(String::from),
                id: i.attr("id").map(String::from),
                placeholder: i.attr("placeholder").map(String::from),
                tag: i.tag,
            })
            .collect();

        Ok(PageSummary {
            title: self.page.title().await?,
            url: self.page.url().await?,
            headings,
            buttons,
            links,
            inputs,
        })
    }
}

fn preview_target(target: &str) -> String {
    if target.chars().count() > 120 {
        format!("{}...", target.chars().take(120).collect::<String>())
    } else {
        target.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::memory_page::{El, InMemoryPage, Interaction};

    fn page() -> Arc<InMemoryPage> {
        Arc::new(InMemoryPage::new(
            "https://shop.example.com",
            "Shop",
            vec![
                El::new("h1").text("Summer   Sale"),
                El::new("a").attr("href", "/cart").text("Cart"),
                El::new("div")
                    .class("product")
                    .child(El::new("span").text("Red Shirt"))
                    .child(El::new("button").text("Add to Cart")),
                El::new("input")
                    .attr("type", "search")
                    .attr("name", "q")
                    .attr("placeholder", "Search"),
            ],
        ))
    }

    fn executor(page: Arc<InMemoryPage>) -> ActionExecutor {
        ActionExecutor::new(page, ExecutorSettings::immediate())
    }

    #[tokio::test]
    async fn test_click_by_text_content() {
        let page = page();
        let exec = executor(page.clone());
        let r = exec
            .execute(&ActionRequest::Click {
                target: r#"button:contains("add to cart")"#.to_string(),
            })
            .await
            .unwrap();
        assert!(r.success, "{:?}", r);
        assert!(r.message.contains("Add to Cart"));
        assert_eq!(page.clicked_texts(), vec!["Add to Cart"]);
        // 先滚动再点击
        let interactions = page.interactions();
        assert!(matches!(interactions[0], Interaction::Scroll(_)));
        assert!(matches!(interactions[1], Interaction::Click(_)));
    }

    #[tokio::test]
    async fn test_click_missing_element_fails() {
        let exec = executor(page());
        let r = exec
            .execute(&ActionRequest::Click {
                target: ".missing".to_string(),
            })
            .await
            .unwrap();
        assert!(!r.success);
        assert_eq!(r.error.as_deref(), Some("Element not found: .missing"));
    }

    #[tokio::test]
    async fn test_type_is_incremental() {
        let page = page();
        let exec = executor(page.clone());
        let r = exec
            .execute(&ActionRequest::Type {
                target: "input[name=q]".to_string(),
                text: "tee".to_string(),
            })
            .await
            .unwrap();
        assert!(r.success);
        assert_eq!(page.value_of("input[name=q]").as_deref(), Some("tee"));

        let steps: Vec<Interaction> = page.interactions();
        let values: Vec<String> = steps
            .iter()
            .filter_map(|i| match i {
                Interaction::SetValue(_, v) => Some(v.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec!["", "t", "te", "tee"]);
        let events: Vec<&str> = steps
            .iter()
            .filter_map(|i| match i {
                Interaction::Event(_, e) => Some(*e),
                _ => None,
            })
            .collect();
        assert_eq!(events, vec!["input", "input", "input", "change"]);
    }

    #[tokio::test]
    async fn test_read_text_defaults_to_body_with_summary() {
        let exec = executor(page());
        let r = exec
            .execute(&ActionRequest::ReadText { target: None })
            .await
            .unwrap();
        assert!(r.success);
        let data = r.data.unwrap();
        assert!(data.text.starts_with("Summer Sale Cart Red Shirt"));
        assert_eq!(data.page.title, "Shop");
        assert_eq!(data.page.headings, vec!["Summer Sale"]);
        assert_eq!(data.page.buttons, vec!["Add to Cart"]);
        assert_eq!(data.page.links[0].href.as_deref(), Some("/cart"));
        assert_eq!(data.page.inputs[0].placeholder.as_deref(), Some("Search"));
    }

    #[tokio::test]
    async fn test_read_text_truncates() {
        let long = "x".repeat(6000);
        let page = Arc::new(InMemoryPage::new("u", "t", vec![El::new("p").text(long)]));
        let exec = executor(page);
        let r = exec
            .execute(&ActionRequest::ReadText {
                target: Some("p".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(r.data.unwrap().text.chars().count(), 5000);
        assert!(r.message.contains("truncated"));
    }

    #[tokio::test]
    async fn test_read_text_no_elements() {
        let exec = executor(page());
        let r = exec
            .execute(&ActionRequest::ReadText {
                target: Some(".nope".to_string()),
            })
            .await
            .unwrap();
        assert!(!r.success);
        assert!(r.error_text().starts_with("No elements found"));
    }

    #[tokio::test]
    async fn test_invalid_selector_is_action_failure() {
        let exec = executor(page());
        let r = exec
            .execute(&ActionRequest::Click {
                target: "button:hover".to_string(),
            })
            .await
            .unwrap();
        assert!(!r.success);
        assert!(r.error_text().contains("Invalid selector"));
    }

    #[tokio::test]
    async fn test_navigate_reports_url() {
        let page = page();
        let exec = executor(page.clone());
        let r = exec
            .execute(&ActionRequest::Navigate {
                url: "https://example.com".to_string(),
            })
            .await
            .unwrap();
        assert!(r.success);
        assert_eq!(r.url.as_deref(), Some("https://example.com"));
        assert_eq!(page.current_url(), "https://example.com");
    }

    #[tokio::test]
    async fn test_action_log_is_bounded() {
        let page = page();
        let exec = ActionExecutor::new(
            page,
            ExecutorSettings {
                action_log_capacity: 3,
                ..ExecutorSettings::immediate()
            },
        );
        for i in 0..5 {
            exec.execute(&ActionRequest::Click {
                target: format!("#missing-{i}"),
            })
            .await
            .unwrap();
        }
        let log = exec.action_log();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].target.as_deref(), Some("#missing-2"));
        assert!(log.iter().all(|e| !e.success));
    }
}
