//! Chrome 宿主：每个执行上下文对应一个真实标签页
//!
//! 需启用 feature "browser"。open_tab 打开标签页、等待首屏并注入自动化脚本；
//! inject 在页面跳转 / 从缓存恢复后重新注入。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};

use crate::tools::{ActionExecutor, ActionRequest, ActionResult, ChromePage, ExecutorSettings};
use crate::transport::{ContextHost, ContextId, TransportError};

struct ChromeContext {
    page: Arc<ChromePage>,
    executor: Arc<ActionExecutor>,
}

pub struct ChromeHost {
    browser: Browser,
    contexts: Mutex<HashMap<ContextId, ChromeContext>>,
}

impl ChromeHost {
    /// 启动浏览器；headless=false 时显示窗口
    pub fn launch(headless: bool) -> Result<Self, TransportError> {
        let options = LaunchOptions {
            headless,
            args: vec![
                std::ffi::OsStr::new("--no-first-run"),
                std::ffi::OsStr::new("--no-default-browser-check"),
                std::ffi::OsStr::new("--disable-blink-features=AutomationControlled"),
            ],
            idle_browser_timeout: std::time::Duration::from_secs(300),
            ..Default::default()
        };
        let browser = Browser::new(options)
            .map_err(|e| TransportError::Delivery(format!("Chrome launch failed: {}", e)))?;
        Ok(Self {
            browser,
            contexts: Mutex::new(HashMap::new()),
        })
    }

    fn contexts(&self) -> MutexGuard<'_, HashMap<ContextId, ChromeContext>> {
        self.contexts.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 打开新标签页并注入脚本，返回其上下文 id
    pub async fn open_tab(&self, url: &str, settings: ExecutorSettings) -> Result<ContextId, TransportError> {
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| TransportError::Delivery(format!("Browser tab failed: {}", e)))?;
        let target = url.to_string();
        let loading = tab.clone();
        tokio::task::spawn_blocking(move || {
            loading
                .navigate_to(&target)
                .and_then(|t| t.wait_until_navigated())
                .map(|_| ())
                .map_err(|e| format!("Navigate failed: {}", e))
        })
        .await
        .map_err(|e| TransportError::Delivery(format!("task join: {}", e)))?
        .map_err(TransportError::Delivery)?;

        let context = ContextId::new(tab.get_target_id().to_string());
        let page = Arc::new(ChromePage::new(tab));
        page.inject()
            .await
            .map_err(|e| TransportError::InjectionFailed(context.clone(), e.to_string()))?;

        let executor = Arc::new(ActionExecutor::new(page.clone(), settings));
        self.contexts()
            .insert(context.clone(), ChromeContext { page, executor });
        tracing::info!(context = %context, url = %url, "tab opened");
        Ok(context)
    }

    pub fn executor(&self, context: &ContextId) -> Option<Arc<ActionExecutor>> {
        self.contexts().get(context).map(|c| c.executor.clone())
    }
}

#[async_trait]
impl ContextHost for ChromeHost {
    async fn deliver(
        &self,
        context: &ContextId,
        request: &ActionRequest,
    ) -> Result<ActionResult, TransportError> {
        let executor = self
            .executor(context)
            .ok_or_else(|| TransportError::UnknownContext(context.clone()))?;
        executor
            .execute(request)
            .await
            .map_err(|e| TransportError::from_page(context, e))
    }

    async fn inject(&self, context: &ContextId) -> Result<(), TransportError> {
        let page = self
            .contexts()
            .get(context)
            .map(|c| c.page.clone())
            .ok_or_else(|| TransportError::UnknownContext(context.clone()))?;
        page.inject()
            .await
            .map_err(|e| TransportError::InjectionFailed(context.clone(), e.to_string()))?;
        tracing::debug!(context = %context, "automation script re-injected");
        Ok(())
    }
}
